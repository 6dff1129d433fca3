//! Run configuration
//!
//! Every knob has a default matching the canonical pipeline; a TOML file may
//! override any subset of them.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::data::circuit::CircuitCatalog;
use crate::data::features::{self, default_feature_columns};
use crate::error::Result;
use crate::model::BoosterParams;

/// First season with reliable timing data
pub const FIRST_F1_YEAR: i32 = 2018;

/// Grand Prix catalog swept when rebuilding the corpus
pub const GRAND_PRIX_NAMES: [&str; 33] = [
    "Australian Grand Prix",
    "Bahrain Grand Prix",
    "Vietnamese Grand Prix",
    "Chinese Grand Prix",
    "Dutch Grand Prix",
    "Spanish Grand Prix",
    "Monaco Grand Prix",
    "Azerbaijan Grand Prix",
    "Canadian Grand Prix",
    "French Grand Prix",
    "Austrian Grand Prix",
    "British Grand Prix",
    "Hungarian Grand Prix",
    "Belgian Grand Prix",
    "Italian Grand Prix",
    "Singapore Grand Prix",
    "Russian Grand Prix",
    "Japanese Grand Prix",
    "United States Grand Prix",
    "Mexico City Grand Prix",
    "Brazilian Grand Prix",
    "Abu Dhabi Grand Prix",
    "Miami Grand Prix",
    "Emilia Romagna Grand Prix",
    "Portuguese Grand Prix",
    "Styrian Grand Prix",
    "70th Anniversary Grand Prix",
    "Tuscan Grand Prix",
    "Sakhir Grand Prix",
    "Saudi Arabian Grand Prix",
    "Qatar Grand Prix",
    "Las Vegas Grand Prix",
    "São Paulo Grand Prix",
];

/// Per-column fallback values used when a feature column is absent or empty
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultValues {
    pub air_temp: f64,
    pub track_temp: f64,
    pub humidity: f64,
    pub best_quali_time: f64,
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self {
            air_temp: 25.0,
            track_temp: 30.0,
            humidity: 50.0,
            best_quali_time: 90.0,
        }
    }
}

impl DefaultValues {
    /// Column name -> default value
    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            (features::AIR_TEMP.to_string(), self.air_temp),
            (features::TRACK_TEMP.to_string(), self.track_temp),
            (features::HUMIDITY.to_string(), self.humidity),
            (features::BEST_QUALI_TIME.to_string(), self.best_quali_time),
        ])
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Directory holding the persisted corpus files
    pub data_dir: PathBuf,
    pub race_corpus_file: String,
    pub quali_corpus_file: String,
    pub first_year: i32,
    /// Last season to sweep; the clock year when unset
    pub current_year: Option<i32>,
    pub grand_prix_names: Vec<String>,
    pub circuits: CircuitCatalog,
    pub feature_columns: Vec<String>,
    pub default_values: DefaultValues,
    pub booster: BoosterParams,
    /// Fraction of the combined table held out for evaluation
    pub test_fraction: f64,
    pub split_seed: u64,
    /// Log sweep progress every N (season, event) combinations
    pub progress_interval: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            race_corpus_file: "all_race_data.csv".to_string(),
            quali_corpus_file: "all_quali_data.csv".to_string(),
            first_year: FIRST_F1_YEAR,
            current_year: None,
            grand_prix_names: GRAND_PRIX_NAMES.iter().map(|s| s.to_string()).collect(),
            circuits: CircuitCatalog::default(),
            feature_columns: default_feature_columns()
                .into_iter()
                .map(String::from)
                .collect(),
            default_values: DefaultValues::default(),
            booster: BoosterParams::default(),
            test_fraction: 0.2,
            split_seed: 42,
            progress_interval: 5,
        }
    }
}

impl PredictorConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn race_corpus_path(&self) -> PathBuf {
        self.data_dir.join(&self.race_corpus_file)
    }

    pub fn quali_corpus_path(&self) -> PathBuf {
        self.data_dir.join(&self.quali_corpus_file)
    }

    pub fn last_year(&self) -> i32 {
        self.current_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    /// Seasons swept by the corpus builder
    pub fn seasons(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year()
    }

    pub fn feature_column_refs(&self) -> Vec<&str> {
        self.feature_columns.iter().map(String::as_str).collect()
    }
}
