//! Run context
//!
//! Holds what one invocation needs (configuration and the session source)
//! and drives the build → train → predict → report flow.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::PredictorConfig;
use crate::data::corpus::{current_qualifying, Corpus, CorpusBuilder};
use crate::data::session::SessionSource;
use crate::error::{PredictorError, Result};
use crate::models::{PredictionRow, SessionKind};
use crate::predictor::{predict_race, train_model, TrainOptions, TrainedModel};
use crate::report;

/// Circuit filter derived from a Grand Prix name: its first word
pub fn circuit_identifier(grand_prix: &str) -> &str {
    grand_prix.split_whitespace().next().unwrap_or("")
}

/// Past seasons have always happened; for the current season the caller decides
pub fn race_already_happened(year: i32, current_year: i32, confirmed: bool) -> bool {
    year < current_year || (year == current_year && confirmed)
}

/// One forecast invocation
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub year: i32,
    pub grand_prix: String,
    /// Hold the target season out of training and score against the actual result
    pub race_happened: bool,
    /// Directory receiving the prediction CSV
    pub output_dir: PathBuf,
}

/// Forecast outcome
#[derive(Debug, Clone)]
pub struct Forecast {
    pub predictions: Vec<PredictionRow>,
    /// Top-10 accuracy percent, when the race has happened and results were available
    pub accuracy: Option<f64>,
    pub output_path: PathBuf,
}

pub struct RunContext<'a> {
    config: PredictorConfig,
    source: &'a dyn SessionSource,
}

impl<'a> RunContext<'a> {
    pub fn new(config: PredictorConfig, source: &'a dyn SessionSource) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn corpus_builder(&self) -> CorpusBuilder<'_, dyn SessionSource + 'a> {
        CorpusBuilder::new(&self.config, self.source)
    }

    /// Train on the corpus, preferring rows from the target circuit when there are any
    pub fn train_for(&self, corpus: &Corpus, grand_prix: &str, exclude_year: Option<i32>) -> Result<TrainedModel> {
        let identifier = circuit_identifier(grand_prix);
        let circuit = if identifier.is_empty() {
            None
        } else {
            let filtered = corpus.circuit_specific(identifier);
            if filtered.race_len() > 0 {
                info!("Using circuit-specific model for {}", identifier);
                Some(identifier.to_string())
            } else {
                info!("Using general model with all historical data");
                None
            }
        };

        let options = TrainOptions {
            circuit,
            exclude_year,
        };
        train_model(corpus.race.as_deref(), corpus.quali.as_deref(), &options, &self.config)
    }

    /// Train on `corpus` and forecast
    pub fn forecast(&self, request: &ForecastRequest, corpus: &Corpus) -> Result<Forecast> {
        if corpus.race.is_none() || corpus.quali.is_none() {
            return Err(PredictorError::EmptyCorpus(if corpus.race.is_none() {
                "race"
            } else {
                "qualifying"
            }));
        }

        info!("Training prediction model...");
        let exclude_year = request.race_happened.then_some(request.year);
        let model = self.train_for(corpus, &request.grand_prix, exclude_year)?;

        self.forecast_with_model(request, &model)
    }

    /// Forecast with an already trained model
    pub fn forecast_with_model(&self, request: &ForecastRequest, model: &TrainedModel) -> Result<Forecast> {
        info!("Getting qualifying data for {} {}...", request.grand_prix, request.year);
        let quali = current_qualifying(self.source, &self.config.circuits, request.year, &request.grand_prix);

        info!("Making race prediction...");
        let predictions = predict_race(Some(model), quali.as_deref(), &self.config)?;
        report::display_predictions(&predictions);

        let accuracy = if request.race_happened {
            self.score(request, &predictions)
        } else {
            None
        };

        let output_path = request
            .output_dir
            .join(report::prediction_file_name(request.year, &request.grand_prix));
        report::write_predictions(&output_path, &predictions)?;

        Ok(Forecast {
            predictions,
            accuracy,
            output_path,
        })
    }

    fn score(&self, request: &ForecastRequest, predictions: &[PredictionRow]) -> Option<f64> {
        match self
            .source
            .load(request.year, &request.grand_prix, SessionKind::Race)
        {
            Ok(session) => report::compare_with_actual(predictions, &session.results),
            Err(e) => {
                warn!("Could not load actual race results for comparison: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_identifier() {
        assert_eq!(circuit_identifier("Monaco Grand Prix"), "Monaco");
        assert_eq!(circuit_identifier("  Abu Dhabi Grand Prix"), "Abu");
        assert_eq!(circuit_identifier(""), "");
    }

    #[test]
    fn test_race_already_happened() {
        assert!(race_already_happened(2022, 2024, false));
        assert!(!race_already_happened(2024, 2024, false));
        assert!(race_already_happened(2024, 2024, true));
        assert!(!race_already_happened(2025, 2024, true));
    }
}
