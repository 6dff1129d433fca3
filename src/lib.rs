//! F1 race outcome predictor
//!
//! This library provides:
//! - Session normalization into per-driver race and qualifying rows
//! - A persisted historical corpus swept from a pluggable session source
//! - Circuit-class tagging and model feature preparation
//! - Gradient-boosted lap-time regression and finishing-order prediction
//! - Prediction reports and accuracy against the classified result
//!
//! # Example
//!
//! ```no_run
//! use f1predict::{ForecastRequest, JsonSessionSource, PredictorConfig, RunContext};
//!
//! let source = JsonSessionSource::new("sessions");
//! let ctx = RunContext::new(PredictorConfig::default(), &source);
//! let corpus = ctx.corpus_builder().build()?;
//!
//! let request = ForecastRequest {
//!     year: 2024,
//!     grand_prix: "Monaco Grand Prix".to_string(),
//!     race_happened: false,
//!     output_dir: ".".into(),
//! };
//! let forecast = ctx.forecast(&request, &corpus)?;
//! println!("Predicted winner: {}", forecast.predictions[0].driver.key.full_name);
//! # Ok::<(), f1predict::PredictorError>(())
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod model;
pub mod models;
pub mod predictor;
pub mod report;

// Re-export commonly used types
pub use config::PredictorConfig;
pub use context::{Forecast, ForecastRequest, RunContext};
pub use data::{Corpus, CorpusBuilder, JsonSessionSource, MemorySessionSource, SessionSource};
pub use error::{PredictorError, Result};
pub use models::{
    DriverKey, PredictionRow, QualiFeatureRow, RaceFeatureRow, Session, SessionKind,
};
pub use predictor::{predict_race, train_model, TrainOptions, TrainedModel};
