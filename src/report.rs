//! Prediction output: console tables, accuracy against the classified
//! result, and the per-race prediction CSV.

use colored::Colorize;
use polars::prelude::*;
use std::path::Path;
use tracing::{error, info};

use crate::data::csv_loader::{quali_rows_to_frame, write_csv};
use crate::data::features::PREDICTED_LAP_TIME;
use crate::error::Result;
use crate::models::{DriverResult, PredictionRow, QualiFeatureRow};

/// Number of positions compared against the actual result
pub const ACCURACY_DEPTH: usize = 10;

/// `prediction_<year>_<Grand_Prix_with_underscores>.csv`
pub fn prediction_file_name(year: i32, grand_prix: &str) -> String {
    format!("prediction_{}_{}.csv", year, grand_prix.replace(' ', "_"))
}

/// Print the predicted order and the winner
pub fn display_predictions(predictions: &[PredictionRow]) {
    let Some(winner) = predictions.first() else {
        println!("{}", "No predictions to display.".red());
        return;
    };

    println!("{}", "Predicted Race Order:".yellow().bold());
    println!("{:>4} {:<24} {:<26} {:>10}", "Pos", "Driver", "Team", "Lap (s)");
    println!("{}", "-".repeat(68));
    for (i, row) in predictions.iter().enumerate() {
        let line = format!(
            "{:>4} {:<24} {:<26} {:>10.3}",
            i + 1,
            row.driver.key.full_name,
            row.driver.key.team_name,
            row.predicted_lap_time
        );
        if i == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    println!();
    println!(
        "{} {} ({})",
        "Predicted Winner:".green().bold(),
        winner.driver.key.full_name.bold(),
        winner.driver.key.team_name
    );
    info!(
        "Predicted winner: {} ({})",
        winner.driver.key.full_name, winner.driver.key.team_name
    );
}

/// Classified drivers ordered by finishing position; unclassified last
fn actual_order(actual: &[DriverResult]) -> Vec<&DriverResult> {
    let mut order: Vec<&DriverResult> = actual.iter().collect();
    order.sort_by(|a, b| match (a.position, b.position) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    order
}

/// Number of exact position matches over the top positions, and the percentage
/// relative to min(10, classified drivers).
pub fn top_accuracy(predictions: &[PredictionRow], actual: &[DriverResult]) -> Option<(usize, f64)> {
    if predictions.is_empty() || actual.is_empty() {
        return None;
    }
    let order = actual_order(actual);
    let depth = ACCURACY_DEPTH.min(order.len()).min(predictions.len());

    let matches = (0..depth)
        .filter(|&pos| {
            order[pos].full_name.as_deref() == Some(predictions[pos].driver.key.full_name.as_str())
        })
        .count();

    let denominator = ACCURACY_DEPTH.min(order.len());
    Some((matches, matches as f64 / denominator as f64 * 100.0))
}

/// Print predicted vs actual for the top positions; returns the top-10 accuracy percent
pub fn compare_with_actual(predictions: &[PredictionRow], actual: &[DriverResult]) -> Option<f64> {
    let Some((_, accuracy)) = top_accuracy(predictions, actual) else {
        error!("Cannot compare with actual results - missing data!");
        return None;
    };

    let order = actual_order(actual);
    let depth = ACCURACY_DEPTH.min(order.len()).min(predictions.len());

    println!("{}", "Prediction Accuracy:".yellow().bold());
    println!("{:>4} | {:<24} | {:<24}", "Pos", "Predicted", "Actual");
    println!("{}", "-".repeat(60));
    for pos in 0..depth {
        let predicted = predictions[pos].driver.key.full_name.as_str();
        let actual_name = order[pos].full_name.as_deref().unwrap_or("-");
        let mark = if predicted == actual_name {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("{:>4} | {:<24} | {:<24} {}", pos + 1, predicted, actual_name, mark);
    }
    println!();
    println!("Top 10 Accuracy: {:.1}%", accuracy);
    info!("Top 10 accuracy: {:.1}%", accuracy);

    Some(accuracy)
}

/// Qualifying columns plus `Predicted Lap Time`, one row per driver in predicted order
pub fn predictions_to_frame(predictions: &[PredictionRow]) -> Result<DataFrame> {
    let drivers: Vec<QualiFeatureRow> = predictions.iter().map(|p| p.driver.clone()).collect();
    let mut df = quali_rows_to_frame(&drivers)?;
    df.with_column(Series::new(
        PREDICTED_LAP_TIME,
        predictions
            .iter()
            .map(|p| p.predicted_lap_time)
            .collect::<Vec<f64>>(),
    ))?;
    Ok(df)
}

pub fn write_predictions<P: AsRef<Path>>(path: P, predictions: &[PredictionRow]) -> Result<()> {
    let mut df = predictions_to_frame(predictions)?;
    write_csv(path.as_ref(), &mut df)?;
    info!("Prediction saved to {:?}", path.as_ref());
    Ok(())
}

/// Log (feature, importance) pairs in the order given
pub fn log_feature_importance(ranked: &[(String, f64)]) {
    info!("Feature importance:");
    for (feature, importance) in ranked {
        info!("  - {}: {:.4}", feature, importance);
    }
}
