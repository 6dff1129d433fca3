//! Historical corpus assembly
//!
//! Sweeps every (season, Grand Prix) pair through the session source,
//! normalizes what it gets and persists both tables. A cache on disk whose
//! tables both hold rows short-circuits the sweep entirely.

use tracing::{error, info, warn};

use crate::config::PredictorConfig;
use crate::data::circuit::{enhance_with_circuit_features, CircuitCatalog};
use crate::data::csv_loader;
use crate::data::normalize::SessionNormalizer;
use crate::data::session::{fetch_session, SessionSource};
use crate::error::Result;
use crate::models::{QualiFeatureRow, RaceFeatureRow, SessionKind};

/// Race and qualifying tables; a side is `None` when nothing was collected
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub race: Option<Vec<RaceFeatureRow>>,
    pub quali: Option<Vec<QualiFeatureRow>>,
}

impl Corpus {
    pub fn race_len(&self) -> usize {
        self.race.as_ref().map_or(0, Vec::len)
    }

    pub fn quali_len(&self) -> usize {
        self.quali.as_ref().map_or(0, Vec::len)
    }

    /// Keep only rows whose circuit name contains `identifier` (case-insensitive)
    pub fn circuit_specific(&self, identifier: &str) -> Corpus {
        let (race, quali) = circuit_specific(
            self.race.as_deref().unwrap_or_default(),
            self.quali.as_deref().unwrap_or_default(),
            identifier,
        );
        Corpus {
            race: self.race.as_ref().map(|_| race),
            quali: self.quali.as_ref().map(|_| quali),
        }
    }
}

/// Sweep position reported after every (season, Grand Prix) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    pub done: usize,
    pub total: usize,
    /// Combinations where at least one session produced rows
    pub successful: usize,
}

pub type ProgressHook<'a> = Box<dyn FnMut(&SweepProgress) + 'a>;

/// Builds (or reloads) the comprehensive corpus
pub struct CorpusBuilder<'a, S: SessionSource + ?Sized> {
    config: &'a PredictorConfig,
    source: &'a S,
    normalizer: SessionNormalizer,
    progress: Option<ProgressHook<'a>>,
}

impl<'a, S: SessionSource + ?Sized> CorpusBuilder<'a, S> {
    pub fn new(config: &'a PredictorConfig, source: &'a S) -> Self {
        Self {
            config,
            source,
            normalizer: SessionNormalizer::new(),
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&SweepProgress) + 'a,
    {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Load the cached corpus if both tables hold rows, otherwise sweep and persist
    pub fn build(&mut self) -> Result<Corpus> {
        let race_path = self.config.race_corpus_path();
        let quali_path = self.config.quali_corpus_path();

        if csv_loader::is_populated(&race_path) && csv_loader::is_populated(&quali_path) {
            info!("Loading existing data files...");
            let catalog = &self.config.circuits;
            let race = csv_loader::read_race_table(&race_path, catalog)?;
            let quali = csv_loader::read_quali_table(&quali_path, catalog)?;
            if !race.is_empty() && !quali.is_empty() {
                info!("Loaded {} race rows and {} qualifying rows", race.len(), quali.len());
                return Ok(Corpus {
                    race: Some(race),
                    quali: Some(quali),
                });
            }
            warn!(
                "Cached corpus has no usable rows (race: {}, qualifying: {}), rebuilding",
                race.len(),
                quali.len()
            );
        }

        self.rebuild()
    }

    /// Sweep every season and Grand Prix, ignoring any cached files
    pub fn rebuild(&mut self) -> Result<Corpus> {
        let config = self.config;
        let seasons: Vec<i32> = config.seasons().collect();
        let total = seasons.len() * config.grand_prix_names.len();
        let interval = config.progress_interval.max(1);
        let catalog = &config.circuits;

        info!(
            "Building comprehensive dataset from {} seasons ({} combinations)",
            seasons.len(),
            total
        );

        let mut race_rows: Vec<RaceFeatureRow> = Vec::new();
        let mut quali_rows: Vec<QualiFeatureRow> = Vec::new();
        let mut done = 0;
        let mut successful = 0;

        for &year in &seasons {
            for grand_prix in &config.grand_prix_names {
                let mut collected = false;
                if let Some(mut rows) = self.collect_race(year, grand_prix, catalog) {
                    collected |= !rows.is_empty();
                    race_rows.append(&mut rows);
                }
                if let Some(mut rows) = self.collect_quali(year, grand_prix, catalog) {
                    collected |= !rows.is_empty();
                    quali_rows.append(&mut rows);
                }

                done += 1;
                if collected {
                    successful += 1;
                }
                if done % interval == 0 {
                    info!(
                        "Progress: {}/{} combinations checked, {} successful",
                        done, total, successful
                    );
                }
                if let Some(hook) = self.progress.as_mut() {
                    hook(&SweepProgress {
                        done,
                        total,
                        successful,
                    });
                }
            }
        }

        let race = if race_rows.is_empty() {
            warn!("No race data collected");
            None
        } else {
            csv_loader::write_race_table(config.race_corpus_path(), &race_rows)?;
            info!("Saved {} race rows", race_rows.len());
            Some(race_rows)
        };

        let quali = if quali_rows.is_empty() {
            warn!("No qualifying data collected");
            None
        } else {
            csv_loader::write_quali_table(config.quali_corpus_path(), &quali_rows)?;
            info!("Saved {} qualifying rows", quali_rows.len());
            Some(quali_rows)
        };

        Ok(Corpus { race, quali })
    }

    fn collect_race(
        &self,
        year: i32,
        grand_prix: &str,
        catalog: &CircuitCatalog,
    ) -> Option<Vec<RaceFeatureRow>> {
        let session = fetch_session(self.source, year, grand_prix, SessionKind::Race)?;
        let mut rows = self.normalizer.normalize_race(&session)?;
        enhance_with_circuit_features(&mut rows, catalog);
        Some(rows)
    }

    fn collect_quali(
        &self,
        year: i32,
        grand_prix: &str,
        catalog: &CircuitCatalog,
    ) -> Option<Vec<QualiFeatureRow>> {
        let session = fetch_session(self.source, year, grand_prix, SessionKind::Qualifying)?;
        let mut rows = self.normalizer.normalize_qualifying(&session)?;
        enhance_with_circuit_features(&mut rows, catalog);
        Some(rows)
    }
}

/// Rows of both tables whose circuit name contains `identifier`, ignoring case
pub fn circuit_specific(
    race: &[RaceFeatureRow],
    quali: &[QualiFeatureRow],
    identifier: &str,
) -> (Vec<RaceFeatureRow>, Vec<QualiFeatureRow>) {
    let needle = identifier.to_lowercase();
    let race = race
        .iter()
        .filter(|r| r.key.circuit_name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    let quali = quali
        .iter()
        .filter(|r| r.key.circuit_name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    (race, quali)
}

/// Qualifying table for the event being predicted; `None` (logged) on any failure
pub fn current_qualifying<S: SessionSource + ?Sized>(
    source: &S,
    catalog: &CircuitCatalog,
    year: i32,
    grand_prix: &str,
) -> Option<Vec<QualiFeatureRow>> {
    let session = match source.load(year, grand_prix, SessionKind::Qualifying) {
        Ok(session) => session,
        Err(e) => {
            error!("Error getting qualifying data: {}", e);
            return None;
        }
    };

    let mut rows = SessionNormalizer::new().normalize_qualifying(&session)?;
    if rows.is_empty() {
        error!("Qualifying session for {} {} has no usable rows", year, grand_prix);
        return None;
    }
    enhance_with_circuit_features(&mut rows, catalog);
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::session::MemorySessionSource;
    use crate::models::{DriverResult, EventInfo, LapRecord, Session, WeatherSample};

    fn result(number: &str, name: &str, q1: Option<&str>) -> DriverResult {
        DriverResult {
            driver_number: number.to_string(),
            abbreviation: Some(name[..3].to_uppercase()),
            full_name: Some(name.to_string()),
            team_name: Some("Red Bull Racing".to_string()),
            position: Some(1.0),
            q1: q1.map(str::to_string),
            ..Default::default()
        }
    }

    fn race_session(year: i32, gp: &str) -> Session {
        Session {
            event: EventInfo {
                year,
                name: gp.to_string(),
                event_name: None,
            },
            laps: vec![
                LapRecord {
                    driver_number: "1".to_string(),
                    lap_time: Some("0 days 00:01:30.000000".to_string()),
                    ..Default::default()
                },
                LapRecord {
                    driver_number: "1".to_string(),
                    lap_time: Some("0 days 00:01:32.000000".to_string()),
                    ..Default::default()
                },
            ],
            results: vec![result("1", "Max Verstappen", None)],
            weather_data: vec![WeatherSample {
                air_temp: Some(25.0),
                track_temp: Some(40.0),
                humidity: Some(50.0),
            }],
        }
    }

    fn quali_session(year: i32, gp: &str) -> Session {
        Session {
            event: EventInfo {
                year,
                name: gp.to_string(),
                event_name: None,
            },
            laps: Vec::new(),
            results: vec![result("1", "Max Verstappen", Some("0 days 00:01:29.500000"))],
            weather_data: Vec::new(),
        }
    }

    fn config_in(dir: &std::path::Path) -> PredictorConfig {
        PredictorConfig {
            data_dir: dir.to_path_buf(),
            first_year: 2022,
            current_year: Some(2023),
            grand_prix_names: vec![
                "Monaco Grand Prix".to_string(),
                "Italian Grand Prix".to_string(),
            ],
            progress_interval: 1,
            ..Default::default()
        }
    }

    fn populated_source() -> MemorySessionSource {
        let mut source = MemorySessionSource::new();
        for year in [2022, 2023] {
            source.insert(year, "Monaco Grand Prix", SessionKind::Race, race_session(year, "Monaco Grand Prix"));
            source.insert(year, "Monaco Grand Prix", SessionKind::Qualifying, quali_session(year, "Monaco Grand Prix"));
        }
        // Italian GP only has qualifying
        source.insert(2023, "Italian Grand Prix", SessionKind::Qualifying, quali_session(2023, "Italian Grand Prix"));
        source
    }

    #[test]
    fn test_sweep_collects_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let source = populated_source();

        let mut ticks = Vec::new();
        let corpus = CorpusBuilder::new(&config, &source)
            .with_progress(|progress| ticks.push(*progress))
            .build()
            .unwrap();

        assert_eq!(corpus.race_len(), 2);
        assert_eq!(corpus.quali_len(), 3);
        assert!(corpus.race.as_ref().unwrap()[0].circuit.is_street_circuit);
        // 2 seasons x 2 events x 2 session types
        assert_eq!(source.calls(), 8);
        // Italian GP 2022 yields nothing
        assert_eq!(
            ticks.last(),
            Some(&SweepProgress {
                done: 4,
                total: 4,
                successful: 3
            })
        );
        assert!(csv_loader::is_populated(config.race_corpus_path()));
        assert!(csv_loader::is_populated(config.quali_corpus_path()));
    }

    #[test]
    fn test_cache_hit_skips_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        CorpusBuilder::new(&config, &populated_source()).build().unwrap();

        let fresh = MemorySessionSource::new();
        let corpus = CorpusBuilder::new(&config, &fresh).build().unwrap();

        assert_eq!(fresh.calls(), 0);
        assert_eq!(corpus.race_len(), 2);
        assert_eq!(corpus.quali_len(), 3);
    }

    #[test]
    fn test_header_only_cache_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let header = "FullName,TeamName,Year,CircuitName\n";
        std::fs::write(config.race_corpus_path(), header).unwrap();
        std::fs::write(config.quali_corpus_path(), header).unwrap();

        let source = populated_source();
        let corpus = CorpusBuilder::new(&config, &source).build().unwrap();

        assert_eq!(source.calls(), 8);
        assert_eq!(corpus.race_len(), 2);
        assert_eq!(corpus.quali_len(), 3);
    }

    #[test]
    fn test_keyless_cache_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let keyless = "FullName,TeamName,Year,CircuitName\n,,2023,Monaco Grand Prix\n";
        std::fs::write(config.race_corpus_path(), keyless).unwrap();
        std::fs::write(config.quali_corpus_path(), keyless).unwrap();

        let source = MemorySessionSource::new();
        let corpus = CorpusBuilder::new(&config, &source).build().unwrap();

        assert_eq!(source.calls(), 8);
        assert!(corpus.race.is_none());
        assert!(corpus.quali.is_none());
    }

    #[test]
    fn test_empty_sweep_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let source = MemorySessionSource::new();

        let corpus = CorpusBuilder::new(&config, &source).build().unwrap();

        assert!(corpus.race.is_none());
        assert!(corpus.quali.is_none());
        assert!(!config.race_corpus_path().exists());
    }

    #[test]
    fn test_circuit_specific_filter() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let corpus = CorpusBuilder::new(&config, &populated_source()).build().unwrap();

        let italy = corpus.circuit_specific("ITALIAN");
        assert_eq!(italy.race_len(), 0);
        assert_eq!(italy.quali_len(), 1);
        assert!(italy.race.is_some());
    }

    #[test]
    fn test_current_qualifying() {
        let source = populated_source();
        let catalog = CircuitCatalog::default();

        let rows = current_qualifying(&source, &catalog, 2023, "Italian Grand Prix").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].best_quali_time, Some(89.5));
        assert!(rows[0].circuit.is_high_speed);

        assert!(current_qualifying(&source, &catalog, 2021, "Italian Grand Prix").is_none());
    }
}
