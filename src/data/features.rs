//! Feature preparation
//!
//! Aligns a table to the model's feature schema: every required column
//! exists, is numeric, has no missing values, and appears in the requested
//! order.

use polars::prelude::*;
use std::collections::HashMap;

use crate::data::circuit::CIRCUIT_FLAG_COLUMNS;

pub const FULL_NAME: &str = "FullName";
pub const TEAM_NAME: &str = "TeamName";
pub const YEAR: &str = "Year";
pub const CIRCUIT_NAME: &str = "CircuitName";
pub const CIRCUIT_SHORT_NAME: &str = "CircuitShortName";
pub const DRIVER_NUMBER: &str = "DriverNumber";
pub const ABBREVIATION: &str = "Abbreviation";
pub const POSITION: &str = "Position";

// Grouped aggregates are flattened as "<source>_<aggregate>"
pub const LAP_TIME_MEAN: &str = "LapTime (s)_mean";
pub const LAP_TIME_MIN: &str = "LapTime (s)_min";
pub const LAP_TIME_STD: &str = "LapTime (s)_std";
pub const AIR_TEMP_MEAN: &str = "AirTemp_mean";
pub const TRACK_TEMP_MEAN: &str = "TrackTemp_mean";
pub const HUMIDITY_MEAN: &str = "Humidity_mean";

pub const AIR_TEMP: &str = "AirTemp";
pub const TRACK_TEMP: &str = "TrackTemp";
pub const HUMIDITY: &str = "Humidity";
pub const Q1: &str = "Q1";
pub const Q2: &str = "Q2";
pub const Q3: &str = "Q3";
pub const BEST_QUALI_TIME: &str = "BestQualiTime";
pub const PREDICTED_LAP_TIME: &str = "Predicted Lap Time";

/// Model input columns, in model order
pub fn default_feature_columns() -> Vec<&'static str> {
    let mut columns = vec![BEST_QUALI_TIME, AIR_TEMP, TRACK_TEMP, HUMIDITY, YEAR];
    columns.extend(CIRCUIT_FLAG_COLUMNS);
    columns
}

/// Median of a slice; `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Fill gaps with the median of present values; left untouched when nothing is present
pub fn fill_with_median(values: &mut [Option<f64>]) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if let Some(m) = median(&present) {
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(m);
        }
    }
}

/// Fully populate a column: median of present values, else `default` everywhere
pub fn fill_missing(values: &[Option<f64>], default: f64) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    match median(&present) {
        Some(m) => values.iter().map(|v| v.unwrap_or(m)).collect(),
        None => vec![default; values.len()],
    }
}

/// Numeric view of a column; booleans become 0/1, NaN and unparseable entries are missing
fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let numeric = series.cast(&DataType::Float64)?;
    Ok(numeric
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Project `data` onto `feature_cols`.
///
/// An absent column is created from its default. A column with gaps is filled
/// with its median, or with its default when it has no values at all. The
/// default is taken from `defaults` and is zero for unlisted columns.
pub fn prepare_features(
    data: &DataFrame,
    feature_cols: &[&str],
    defaults: &HashMap<String, f64>,
) -> PolarsResult<DataFrame> {
    let height = data.height();
    let mut columns = Vec::with_capacity(feature_cols.len());

    for &name in feature_cols {
        let default = defaults.get(name).copied().unwrap_or(0.0);
        let values = match data.column(name) {
            Ok(series) => fill_missing(&numeric_values(series)?, default),
            Err(_) => vec![default; height],
        };
        columns.push(Series::new(name, values));
    }

    DataFrame::new(columns)
}

/// Row-major matrix of the given Float64 columns
pub fn to_matrix(data: &DataFrame, feature_cols: &[&str]) -> PolarsResult<Vec<Vec<f64>>> {
    let mut matrix = vec![Vec::with_capacity(feature_cols.len()); data.height()];

    for &name in feature_cols {
        let values = numeric_values(data.column(name)?)?;
        for (row, value) in matrix.iter_mut().zip(values) {
            row.push(value.unwrap_or(f64::NAN));
        }
    }

    Ok(matrix)
}
