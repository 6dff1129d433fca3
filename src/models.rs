use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::circuit::CircuitFlags;

/// Session type as understood by the telemetry source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    #[serde(rename = "R")]
    Race,
    #[serde(rename = "Q")]
    Qualifying,
}

impl SessionKind {
    pub fn code(&self) -> &'static str {
        match self {
            SessionKind::Race => "R",
            SessionKind::Qualifying => "Q",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Event metadata attached to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventInfo {
    pub year: i32,
    /// Full event name, used as the circuit name (e.g. "Monaco Grand Prix")
    pub name: String,
    #[serde(default)]
    pub event_name: Option<String>,
}

/// Single lap row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LapRecord {
    pub driver_number: String,
    /// Raw duration text as emitted by the telemetry source
    #[serde(default)]
    pub lap_time: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub stint: Option<f64>,
    #[serde(default)]
    pub compound: Option<String>,
}

/// Classified result row (race or qualifying)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverResult {
    pub driver_number: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default, rename = "Q1")]
    pub q1: Option<String>,
    #[serde(default, rename = "Q2")]
    pub q2: Option<String>,
    #[serde(default, rename = "Q3")]
    pub q3: Option<String>,
}

/// Weather sample taken during a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeatherSample {
    #[serde(default)]
    pub air_temp: Option<f64>,
    #[serde(default)]
    pub track_temp: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
}

/// Raw session as loaded from the telemetry source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub event: EventInfo,
    #[serde(default)]
    pub laps: Vec<LapRecord>,
    #[serde(default)]
    pub results: Vec<DriverResult>,
    #[serde(default)]
    pub weather_data: Vec<WeatherSample>,
}

/// Identity key shared by race and qualifying tables
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverKey {
    pub full_name: String,
    pub team_name: String,
    pub year: i32,
    pub circuit_name: String,
}

/// Session-averaged weather; a field is `None` when the session carried no samples for it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
}

/// One driver's aggregated race statistics at one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceFeatureRow {
    pub key: DriverKey,
    pub circuit_short_name: Option<String>,
    pub lap_time_mean: Option<f64>,
    pub lap_time_min: Option<f64>,
    pub lap_time_std: Option<f64>,
    pub weather: WeatherSummary,
    pub circuit: CircuitFlags,
}

/// One driver's qualifying result at one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualiFeatureRow {
    pub key: DriverKey,
    pub circuit_short_name: Option<String>,
    pub driver_number: String,
    pub abbreviation: Option<String>,
    pub position: Option<f64>,
    pub q1: Option<f64>,
    pub q2: Option<f64>,
    pub q3: Option<f64>,
    pub best_quali_time: Option<f64>,
    pub weather: WeatherSummary,
    pub circuit: CircuitFlags,
}

/// Qualifying row scored by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub driver: QualiFeatureRow,
    pub predicted_lap_time: f64,
}
