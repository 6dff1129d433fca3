//! Circuit characteristics
//!
//! Derives boolean circuit-class tags from a circuit name by substring match
//! against per-class fragment lists.

use serde::{Deserialize, Serialize};

use crate::models::{QualiFeatureRow, RaceFeatureRow};

pub const IS_STREET_CIRCUIT: &str = "is_street_circuit";
pub const IS_HIGH_SPEED: &str = "is_high_speed";
pub const IS_HIGH_DOWNFORCE: &str = "is_high_downforce";
pub const IS_HIGH_ALTITUDE: &str = "is_high_altitude";
pub const IS_HIGH_TEMP: &str = "is_high_temp";
pub const IS_WET_PRONE: &str = "is_wet_prone";

/// Flag column names in canonical order
pub const CIRCUIT_FLAG_COLUMNS: [&str; 6] = [
    IS_STREET_CIRCUIT,
    IS_HIGH_SPEED,
    IS_HIGH_DOWNFORCE,
    IS_HIGH_ALTITUDE,
    IS_HIGH_TEMP,
    IS_WET_PRONE,
];

/// Lower-case name fragments for each circuit class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitCatalog {
    pub street: Vec<String>,
    pub high_speed: Vec<String>,
    pub high_downforce: Vec<String>,
    pub high_altitude: Vec<String>,
    pub high_temp: Vec<String>,
    pub wet_prone: Vec<String>,
}

fn fragments(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for CircuitCatalog {
    fn default() -> Self {
        Self {
            street: fragments(&["monaco", "singapore", "baku", "jeddah", "las vegas"]),
            high_speed: fragments(&["monza", "spa", "silverstone", "saudi", "baku"]),
            high_downforce: fragments(&["hungary", "monaco", "singapore"]),
            high_altitude: fragments(&["mexico", "brazil", "austria"]),
            high_temp: fragments(&["bahrain", "singapore", "abu dhabi", "saudi"]),
            wet_prone: fragments(&["spa", "brazil", "japan"]),
        }
    }
}

impl CircuitCatalog {
    /// Tag a circuit name; unmatched names yield all-false
    pub fn classify(&self, circuit_name: &str) -> CircuitFlags {
        let name = circuit_name.to_lowercase();
        let matches = |list: &[String]| list.iter().any(|frag| name.contains(frag.as_str()));

        CircuitFlags {
            is_street_circuit: matches(&self.street),
            is_high_speed: matches(&self.high_speed),
            is_high_downforce: matches(&self.high_downforce),
            is_high_altitude: matches(&self.high_altitude),
            is_high_temp: matches(&self.high_temp),
            is_wet_prone: matches(&self.wet_prone),
        }
    }
}

/// Circuit-class tags for one circuit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitFlags {
    pub is_street_circuit: bool,
    pub is_high_speed: bool,
    pub is_high_downforce: bool,
    pub is_high_altitude: bool,
    pub is_high_temp: bool,
    pub is_wet_prone: bool,
}

impl CircuitFlags {
    /// Classify against the default catalog
    pub fn from_name(circuit_name: &str) -> Self {
        CircuitCatalog::default().classify(circuit_name)
    }

    /// (column name, value) pairs in canonical column order
    pub fn as_pairs(&self) -> [(&'static str, bool); 6] {
        [
            (IS_STREET_CIRCUIT, self.is_street_circuit),
            (IS_HIGH_SPEED, self.is_high_speed),
            (IS_HIGH_DOWNFORCE, self.is_high_downforce),
            (IS_HIGH_ALTITUDE, self.is_high_altitude),
            (IS_HIGH_TEMP, self.is_high_temp),
            (IS_WET_PRONE, self.is_wet_prone),
        ]
    }
}

/// Rows that carry a circuit name and its tags
pub trait CircuitTagged {
    fn circuit_name(&self) -> &str;
    fn set_circuit_flags(&mut self, flags: CircuitFlags);
}

impl CircuitTagged for RaceFeatureRow {
    fn circuit_name(&self) -> &str {
        &self.key.circuit_name
    }

    fn set_circuit_flags(&mut self, flags: CircuitFlags) {
        self.circuit = flags;
    }
}

impl CircuitTagged for QualiFeatureRow {
    fn circuit_name(&self) -> &str {
        &self.key.circuit_name
    }

    fn set_circuit_flags(&mut self, flags: CircuitFlags) {
        self.circuit = flags;
    }
}

/// Recompute circuit tags for every row in place. Order is untouched.
pub fn enhance_with_circuit_features<T: CircuitTagged>(rows: &mut [T], catalog: &CircuitCatalog) {
    for row in rows.iter_mut() {
        let flags = catalog.classify(row.circuit_name());
        row.set_circuit_flags(flags);
    }
}
