use polars::prelude::PolarsError;
use thiserror::Error;

use crate::models::SessionKind;

/// Errors produced by the prediction pipeline
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The session source could not provide the requested session
    #[error("{kind} session unavailable for {year} {grand_prix}: {reason}")]
    SessionUnavailable {
        year: i32,
        grand_prix: String,
        kind: SessionKind,
        reason: String,
    },

    /// A field inside an otherwise available session could not be interpreted
    #[error("Malformed {field} value: {value:?}")]
    MalformedField { field: &'static str, value: String },

    /// The corpus sweep produced no rows for a table
    #[error("No {0} data collected")]
    EmptyCorpus(&'static str),

    /// Race and qualifying tables share no (FullName, TeamName, Year, CircuitName) key
    #[error("No matching data after merging race and qualifying information")]
    EmptyJoin,

    /// Not enough rows to fit and evaluate a model
    #[error("Insufficient data to train model: {0}")]
    InsufficientData(String),

    /// A required pipeline input was absent
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    /// Feature matrix and model disagree on shape
    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Table error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PredictorError>;
