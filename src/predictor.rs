//! Model training and race prediction
//!
//! Training joins the race and qualifying tables on the driver key, learns
//! mean race lap time from qualifying pace, weather and circuit class, and
//! reports hold-out error. Prediction scores a qualifying table and orders it
//! by predicted lap time.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::PredictorConfig;
use crate::data::circuit::enhance_with_circuit_features;
use crate::data::corpus::circuit_specific;
use crate::data::csv_loader::quali_rows_to_frame;
use crate::data::features::{
    fill_with_median, prepare_features, to_matrix, LAP_TIME_MEAN, LAP_TIME_MIN, LAP_TIME_STD,
};
use crate::error::{PredictorError, Result};
use crate::model::{
    mean_absolute_error, Estimator, GradientBoostedModel, GradientBoostedRegressor, Regressor,
};
use crate::models::{DriverKey, PredictionRow, QualiFeatureRow, RaceFeatureRow};
use crate::report;

/// Training-set restrictions
#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
    /// Keep only circuits whose name contains this text (case-insensitive)
    pub circuit: Option<String>,
    /// Drop this season from the race side before joining
    pub exclude_year: Option<i32>,
}

/// Model plus the schema it was fitted on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub model: GradientBoostedModel,
    /// Mean absolute error on the held-out rows, in seconds
    pub mae: Option<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl TrainedModel {
    pub fn feature_refs(&self) -> Vec<&str> {
        self.feature_names.iter().map(String::as_str).collect()
    }

    /// (feature, importance) pairs, most important first
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.model.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved model to {:?}", path);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Race/qualifying pairs sharing a driver key; every qualifying match of a
/// race row is kept.
pub fn join_tables<'a>(
    race: &'a [RaceFeatureRow],
    quali: &'a [QualiFeatureRow],
) -> Vec<(&'a RaceFeatureRow, &'a QualiFeatureRow)> {
    let mut by_key: HashMap<&DriverKey, Vec<&QualiFeatureRow>> = HashMap::new();
    for row in quali {
        by_key.entry(&row.key).or_default().push(row);
    }

    race.iter()
        .flat_map(|r| {
            by_key
                .get(&r.key)
                .into_iter()
                .flatten()
                .map(move |q| (r, *q))
        })
        .collect()
}

/// Joined training table: qualifying columns (weather from the qualifying
/// session) plus the race lap-time aggregates, gaps filled with medians.
pub fn combined_frame(pairs: &[(&RaceFeatureRow, &QualiFeatureRow)], config: &PredictorConfig) -> Result<DataFrame> {
    let mut quali: Vec<QualiFeatureRow> = pairs.iter().map(|(_, q)| (*q).clone()).collect();
    enhance_with_circuit_features(&mut quali, &config.circuits);

    let mut air: Vec<Option<f64>> = quali.iter().map(|q| q.weather.air_temp).collect();
    let mut track: Vec<Option<f64>> = quali.iter().map(|q| q.weather.track_temp).collect();
    let mut humidity: Vec<Option<f64>> = quali.iter().map(|q| q.weather.humidity).collect();
    let mut best: Vec<Option<f64>> = quali.iter().map(|q| q.best_quali_time).collect();
    for values in [&mut air, &mut track, &mut humidity, &mut best] {
        fill_with_median(values);
    }
    for (i, row) in quali.iter_mut().enumerate() {
        row.weather.air_temp = air[i];
        row.weather.track_temp = track[i];
        row.weather.humidity = humidity[i];
        row.best_quali_time = best[i];
    }

    let mut lap_mean: Vec<Option<f64>> = pairs.iter().map(|(r, _)| r.lap_time_mean).collect();
    let mut lap_min: Vec<Option<f64>> = pairs.iter().map(|(r, _)| r.lap_time_min).collect();
    let mut lap_std: Vec<Option<f64>> = pairs.iter().map(|(r, _)| r.lap_time_std).collect();
    for values in [&mut lap_mean, &mut lap_min, &mut lap_std] {
        fill_with_median(values);
    }

    let mut df = quali_rows_to_frame(&quali)?;
    df.with_column(Series::new(LAP_TIME_MEAN, lap_mean))?;
    df.with_column(Series::new(LAP_TIME_MIN, lap_min))?;
    df.with_column(Series::new(LAP_TIME_STD, lap_std))?;
    Ok(df)
}

/// Seeded shuffle into (train, test) index sets; test holds ceil(fraction * n) rows
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(PredictorError::InsufficientData(format!(
            "{} combined rows, need at least 2",
            n
        )));
    }
    let test_size = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_size);
    Ok((train, indices))
}

/// Apply the circuit filter to both tables and the season exclusion to the
/// race side only.
pub fn select_training_rows(
    race: &[RaceFeatureRow],
    quali: &[QualiFeatureRow],
    options: &TrainOptions,
) -> (Vec<RaceFeatureRow>, Vec<QualiFeatureRow>) {
    let (race, quali) = match options.circuit.as_deref() {
        Some(circuit) => {
            let (race, quali) = circuit_specific(race, quali, circuit);
            info!(
                "Filtered to {} race records and {} qualifying records for {}",
                race.len(),
                quali.len(),
                circuit
            );
            (race, quali)
        }
        None => (race.to_vec(), quali.to_vec()),
    };

    let race = match options.exclude_year {
        Some(year) => {
            let kept: Vec<RaceFeatureRow> =
                race.into_iter().filter(|r| r.key.year != year).collect();
            info!(
                "Excluding {} from training data. Training on {} race records.",
                year,
                kept.len()
            );
            kept
        }
        None => race,
    };

    (race, quali)
}

/// Fit a lap-time model on the historical corpus.
pub fn train_model(
    race: Option<&[RaceFeatureRow]>,
    quali: Option<&[QualiFeatureRow]>,
    options: &TrainOptions,
    config: &PredictorConfig,
) -> Result<TrainedModel> {
    let (Some(race), Some(quali)) = (race, quali) else {
        error!("Insufficient data to train model!");
        return Err(PredictorError::InsufficientData(
            "race or qualifying table missing".to_string(),
        ));
    };

    let (race, quali) = select_training_rows(race, quali, options);

    let pairs = join_tables(&race, &quali);
    if pairs.is_empty() {
        error!("No matching data after merging race and qualifying information!");
        return Err(PredictorError::EmptyJoin);
    }

    let combined = combined_frame(&pairs, config)?;
    let feature_names: Vec<String> = config
        .feature_column_refs()
        .into_iter()
        .filter(|c| combined.column(c).is_ok())
        .map(String::from)
        .collect();
    let feature_refs: Vec<&str> = feature_names.iter().map(String::as_str).collect();

    let prepared = prepare_features(&combined, &feature_refs, &config.default_values.as_map())?;
    let x = to_matrix(&prepared, &feature_refs)?;
    let y: Vec<f64> = combined
        .column(LAP_TIME_MEAN)?
        .f64()?
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| PredictorError::InsufficientData("no race lap times to learn from".to_string()))?;

    let (train_idx, test_idx) = split_indices(x.len(), config.test_fraction, config.split_seed)?;
    let pick_x = |idx: &[usize]| idx.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
    let pick_y = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();

    let estimator = GradientBoostedRegressor::new(config.booster.clone());
    let model = estimator.fit(&pick_x(&train_idx), &pick_y(&train_idx))?;

    let predicted = model.predict(&pick_x(&test_idx))?;
    let mae = mean_absolute_error(&pick_y(&test_idx), &predicted);
    if let Some(mae) = mae {
        info!("Model trained with Mean Absolute Error: {:.2} seconds", mae);
    }

    let trained = TrainedModel {
        feature_names,
        model,
        mae,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
    };
    report::log_feature_importance(&trained.ranked_importances());

    Ok(trained)
}

/// Score a qualifying table and order it fastest first.
pub fn predict_race(
    model: Option<&TrainedModel>,
    quali: Option<&[QualiFeatureRow]>,
    config: &PredictorConfig,
) -> Result<Vec<PredictionRow>> {
    let (Some(model), Some(quali)) = (model, quali) else {
        error!("Cannot make prediction without model or qualifying data!");
        return Err(PredictorError::MissingInput(if model.is_none() {
            "model"
        } else {
            "qualifying data"
        }));
    };

    let frame = quali_rows_to_frame(quali)?;
    let features = model.feature_refs();
    let missing: Vec<&str> = features
        .iter()
        .copied()
        .filter(|c| frame.column(c).is_err())
        .collect();
    if !missing.is_empty() {
        warn!("Qualifying data lacks model features {:?}; using defaults", missing);
    }

    let prepared = prepare_features(&frame, &features, &config.default_values.as_map())?;
    let x = to_matrix(&prepared, &features)?;
    let scores = model.model.predict(&x)?;

    let mut predictions: Vec<PredictionRow> = quali
        .iter()
        .cloned()
        .zip(scores)
        .map(|(driver, predicted_lap_time)| PredictionRow {
            driver,
            predicted_lap_time,
        })
        .collect();
    predictions.sort_by(|a, b| a.predicted_lap_time.total_cmp(&b.predicted_lap_time));

    Ok(predictions)
}
