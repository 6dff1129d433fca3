//! CSV persistence for the race and qualifying corpora
//!
//! Rows travel through polars frames in both directions. Circuit tags are
//! written for inspection but always recomputed from the circuit name on load.

use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use crate::data::circuit::{CircuitCatalog, CircuitFlags, CIRCUIT_FLAG_COLUMNS};
use crate::data::features::{
    ABBREVIATION, AIR_TEMP, AIR_TEMP_MEAN, BEST_QUALI_TIME, CIRCUIT_NAME, CIRCUIT_SHORT_NAME,
    DRIVER_NUMBER, FULL_NAME, HUMIDITY, HUMIDITY_MEAN, LAP_TIME_MEAN, LAP_TIME_MIN, LAP_TIME_STD,
    POSITION, Q1, Q2, Q3, TEAM_NAME, TRACK_TEMP, TRACK_TEMP_MEAN, YEAR,
};
use crate::error::Result;
use crate::models::{DriverKey, QualiFeatureRow, RaceFeatureRow, WeatherSummary};

/// True when the file exists and holds at least one byte
pub fn is_populated<P: AsRef<Path>>(path: P) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Identifier columns that must never be inferred as numbers ("07" stays "07")
const TEXT_COLUMNS: [&str; 2] = [DRIVER_NUMBER, ABBREVIATION];

fn header_names(path: &Path) -> Result<Vec<String>> {
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    Ok(line
        .trim_end()
        .split(',')
        .map(|name| name.trim_matches('"').to_string())
        .collect())
}

/// Read a headered CSV file, inferring the schema from every row except the
/// identifier columns, which are read as text.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    let header = header_names(path)?;
    let text_schema: Schema = TEXT_COLUMNS
        .iter()
        .filter(|column| header.iter().any(|name| name == *column))
        .map(|column| Field::new(column, DataType::String))
        .collect();
    let overwrite = (!text_schema.is_empty()).then(|| Arc::new(text_schema));

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(overwrite)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Write a frame as headered CSV, creating the parent directory if needed
pub fn write_csv<P: AsRef<Path>>(path: P, df: &mut DataFrame) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

fn key_columns<'a, I>(keys: I, short_names: Vec<Option<String>>) -> Vec<Series>
where
    I: Iterator<Item = &'a DriverKey> + Clone,
{
    vec![
        Series::new(FULL_NAME, keys.clone().map(|k| k.full_name.clone()).collect::<Vec<_>>()),
        Series::new(TEAM_NAME, keys.clone().map(|k| k.team_name.clone()).collect::<Vec<_>>()),
        Series::new(YEAR, keys.clone().map(|k| k.year).collect::<Vec<_>>()),
        Series::new(CIRCUIT_NAME, keys.map(|k| k.circuit_name.clone()).collect::<Vec<_>>()),
        Series::new(CIRCUIT_SHORT_NAME, short_names),
    ]
}

fn flag_columns<'a, I>(flags: I) -> Vec<Series>
where
    I: Iterator<Item = &'a CircuitFlags>,
{
    let pairs: Vec<_> = flags.map(CircuitFlags::as_pairs).collect();
    CIRCUIT_FLAG_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| Series::new(name, pairs.iter().map(|p| p[i].1).collect::<Vec<_>>()))
        .collect()
}

/// Race rows as a frame with flattened aggregate column names
pub fn race_rows_to_frame(rows: &[RaceFeatureRow]) -> Result<DataFrame> {
    let mut columns = key_columns(
        rows.iter().map(|r| &r.key),
        rows.iter().map(|r| r.circuit_short_name.clone()).collect(),
    );
    columns.extend([
        Series::new(LAP_TIME_MEAN, rows.iter().map(|r| r.lap_time_mean).collect::<Vec<_>>()),
        Series::new(LAP_TIME_MIN, rows.iter().map(|r| r.lap_time_min).collect::<Vec<_>>()),
        Series::new(LAP_TIME_STD, rows.iter().map(|r| r.lap_time_std).collect::<Vec<_>>()),
        Series::new(AIR_TEMP_MEAN, rows.iter().map(|r| r.weather.air_temp).collect::<Vec<_>>()),
        Series::new(TRACK_TEMP_MEAN, rows.iter().map(|r| r.weather.track_temp).collect::<Vec<_>>()),
        Series::new(HUMIDITY_MEAN, rows.iter().map(|r| r.weather.humidity).collect::<Vec<_>>()),
    ]);
    columns.extend(flag_columns(rows.iter().map(|r| &r.circuit)));
    Ok(DataFrame::new(columns)?)
}

/// Qualifying rows as a frame
pub fn quali_rows_to_frame(rows: &[QualiFeatureRow]) -> Result<DataFrame> {
    let mut columns = key_columns(
        rows.iter().map(|r| &r.key),
        rows.iter().map(|r| r.circuit_short_name.clone()).collect(),
    );
    columns.extend([
        Series::new(DRIVER_NUMBER, rows.iter().map(|r| r.driver_number.clone()).collect::<Vec<_>>()),
        Series::new(ABBREVIATION, rows.iter().map(|r| r.abbreviation.clone()).collect::<Vec<_>>()),
        Series::new(POSITION, rows.iter().map(|r| r.position).collect::<Vec<_>>()),
        Series::new(Q1, rows.iter().map(|r| r.q1).collect::<Vec<_>>()),
        Series::new(Q2, rows.iter().map(|r| r.q2).collect::<Vec<_>>()),
        Series::new(Q3, rows.iter().map(|r| r.q3).collect::<Vec<_>>()),
        Series::new(BEST_QUALI_TIME, rows.iter().map(|r| r.best_quali_time).collect::<Vec<_>>()),
        Series::new(AIR_TEMP, rows.iter().map(|r| r.weather.air_temp).collect::<Vec<_>>()),
        Series::new(TRACK_TEMP, rows.iter().map(|r| r.weather.track_temp).collect::<Vec<_>>()),
        Series::new(HUMIDITY, rows.iter().map(|r| r.weather.humidity).collect::<Vec<_>>()),
    ]);
    columns.extend(flag_columns(rows.iter().map(|r| &r.circuit)));
    Ok(DataFrame::new(columns)?)
}

/// Required text column
fn str_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Text column that older files may lack
fn optional_str_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    if df.column(name).is_ok() {
        str_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Numeric column; absent columns read as all-missing
fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    match df.column(name) {
        Ok(series) => {
            let series = series.cast(&DataType::Float64)?;
            Ok(series
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect())
        }
        Err(_) => Ok(vec![None; df.height()]),
    }
}

fn i64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Key columns per row; rows with any missing key part are `None`
fn read_keys(df: &DataFrame) -> PolarsResult<Vec<Option<DriverKey>>> {
    let full_names = str_values(df, FULL_NAME)?;
    let team_names = str_values(df, TEAM_NAME)?;
    let years = i64_values(df, YEAR)?;
    let circuits = str_values(df, CIRCUIT_NAME)?;

    Ok(full_names
        .into_iter()
        .zip(team_names)
        .zip(years)
        .zip(circuits)
        .map(|(((full_name, team_name), year), circuit_name)| {
            Some(DriverKey {
                full_name: full_name?,
                team_name: team_name?,
                year: year? as i32,
                circuit_name: circuit_name?,
            })
        })
        .collect())
}

/// Frame back to race rows; keyless rows are skipped
pub fn frame_to_race_rows(df: &DataFrame, catalog: &CircuitCatalog) -> Result<Vec<RaceFeatureRow>> {
    let keys = read_keys(df)?;
    let short_names = optional_str_values(df, CIRCUIT_SHORT_NAME)?;
    let lap_mean = f64_values(df, LAP_TIME_MEAN)?;
    let lap_min = f64_values(df, LAP_TIME_MIN)?;
    let lap_std = f64_values(df, LAP_TIME_STD)?;
    let air = f64_values(df, AIR_TEMP_MEAN)?;
    let track = f64_values(df, TRACK_TEMP_MEAN)?;
    let humidity = f64_values(df, HUMIDITY_MEAN)?;

    let mut rows = Vec::with_capacity(df.height());
    for (i, key) in keys.into_iter().enumerate() {
        let Some(key) = key else { continue };
        let circuit = catalog.classify(&key.circuit_name);
        rows.push(RaceFeatureRow {
            key,
            circuit_short_name: short_names[i].clone(),
            lap_time_mean: lap_mean[i],
            lap_time_min: lap_min[i],
            lap_time_std: lap_std[i],
            weather: WeatherSummary {
                air_temp: air[i],
                track_temp: track[i],
                humidity: humidity[i],
            },
            circuit,
        });
    }

    Ok(rows)
}

/// Frame back to qualifying rows; keyless rows are skipped
pub fn frame_to_quali_rows(df: &DataFrame, catalog: &CircuitCatalog) -> Result<Vec<QualiFeatureRow>> {
    let keys = read_keys(df)?;
    let short_names = optional_str_values(df, CIRCUIT_SHORT_NAME)?;
    let driver_numbers = optional_str_values(df, DRIVER_NUMBER)?;
    let abbreviations = optional_str_values(df, ABBREVIATION)?;
    let positions = f64_values(df, POSITION)?;
    let q1 = f64_values(df, Q1)?;
    let q2 = f64_values(df, Q2)?;
    let q3 = f64_values(df, Q3)?;
    let best = f64_values(df, BEST_QUALI_TIME)?;
    let air = f64_values(df, AIR_TEMP)?;
    let track = f64_values(df, TRACK_TEMP)?;
    let humidity = f64_values(df, HUMIDITY)?;

    let mut rows = Vec::with_capacity(df.height());
    for (i, key) in keys.into_iter().enumerate() {
        let Some(key) = key else { continue };
        let circuit = catalog.classify(&key.circuit_name);
        rows.push(QualiFeatureRow {
            key,
            circuit_short_name: short_names[i].clone(),
            driver_number: driver_numbers[i].clone().unwrap_or_default(),
            abbreviation: abbreviations[i].clone(),
            position: positions[i],
            q1: q1[i],
            q2: q2[i],
            q3: q3[i],
            best_quali_time: best[i],
            weather: WeatherSummary {
                air_temp: air[i],
                track_temp: track[i],
                humidity: humidity[i],
            },
            circuit,
        });
    }

    Ok(rows)
}

pub fn write_race_table<P: AsRef<Path>>(path: P, rows: &[RaceFeatureRow]) -> Result<()> {
    let mut df = race_rows_to_frame(rows)?;
    write_csv(path, &mut df)
}

pub fn write_quali_table<P: AsRef<Path>>(path: P, rows: &[QualiFeatureRow]) -> Result<()> {
    let mut df = quali_rows_to_frame(rows)?;
    write_csv(path, &mut df)
}

pub fn read_race_table<P: AsRef<Path>>(path: P, catalog: &CircuitCatalog) -> Result<Vec<RaceFeatureRow>> {
    frame_to_race_rows(&read_csv(path)?, catalog)
}

pub fn read_quali_table<P: AsRef<Path>>(path: P, catalog: &CircuitCatalog) -> Result<Vec<QualiFeatureRow>> {
    frame_to_quali_rows(&read_csv(path)?, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, circuit: &str) -> DriverKey {
        DriverKey {
            full_name: name.to_string(),
            team_name: "Ferrari".to_string(),
            year: 2023,
            circuit_name: circuit.to_string(),
        }
    }

    fn race_row(name: &str) -> RaceFeatureRow {
        RaceFeatureRow {
            key: key(name, "Monaco Grand Prix"),
            circuit_short_name: Some("Monte Carlo".to_string()),
            lap_time_mean: Some(78.5),
            lap_time_min: Some(74.2),
            lap_time_std: None,
            weather: WeatherSummary {
                air_temp: Some(22.0),
                track_temp: None,
                humidity: Some(60.0),
            },
            circuit: CircuitFlags::from_name("Monaco Grand Prix"),
        }
    }

    fn quali_row(name: &str, number: &str) -> QualiFeatureRow {
        QualiFeatureRow {
            key: key(name, "Italian Grand Prix"),
            circuit_short_name: None,
            driver_number: number.to_string(),
            abbreviation: Some("LEC".to_string()),
            position: Some(1.0),
            q1: Some(81.5),
            q2: None,
            q3: Some(80.1),
            best_quali_time: Some(80.1),
            weather: WeatherSummary::default(),
            circuit: CircuitFlags::default(),
        }
    }

    #[test]
    fn test_race_frame_columns() {
        let df = race_rows_to_frame(&[race_row("Charles Leclerc")]).unwrap();
        let names = df.get_column_names();
        assert!(names.contains(&"LapTime (s)_mean"));
        assert!(names.contains(&"AirTemp_mean"));
        assert!(names.contains(&"is_street_circuit"));
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn test_race_table_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("all_race_data.csv");
        let rows = vec![race_row("Charles Leclerc"), race_row("Carlos Sainz")];

        write_race_table(&path, &rows).unwrap();
        assert!(is_populated(&path));

        let loaded = read_race_table(&path, &CircuitCatalog::default()).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_quali_driver_number_stays_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_quali_data.csv");
        write_quali_table(&path, &[quali_row("Charles Leclerc", "16")]).unwrap();

        let loaded = read_quali_table(&path, &CircuitCatalog::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].driver_number, "16");
        assert_eq!(loaded[0].q2, None);
        assert_eq!(loaded[0].best_quali_time, Some(80.1));
        // Italian GP sits on the high-speed list
        assert!(loaded[0].circuit.is_high_speed);
    }

    #[test]
    fn test_leading_zero_driver_number_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_quali_data.csv");
        let mut row = quali_row("Logan Sargeant", "02");
        row.abbreviation = Some("007".to_string());
        write_quali_table(&path, &[row, quali_row("Charles Leclerc", "16")]).unwrap();

        let df = read_csv(&path).unwrap();
        assert_eq!(df.column(DRIVER_NUMBER).unwrap().dtype(), &DataType::String);
        assert_eq!(df.column(ABBREVIATION).unwrap().dtype(), &DataType::String);

        let loaded = read_quali_table(&path, &CircuitCatalog::default()).unwrap();
        assert_eq!(loaded[0].driver_number, "02");
        assert_eq!(loaded[0].abbreviation.as_deref(), Some("007"));
        assert_eq!(loaded[1].driver_number, "16");
    }

    #[test]
    fn test_flags_recomputed_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.csv");
        let mut row = race_row("Charles Leclerc");
        row.circuit = CircuitFlags::default();
        write_race_table(&path, &[row]).unwrap();

        let loaded = read_race_table(&path, &CircuitCatalog::default()).unwrap();
        assert!(loaded[0].circuit.is_street_circuit);
    }

    #[test]
    fn test_keyless_rows_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.csv");
        std::fs::write(
            &path,
            "FullName,TeamName,Year,CircuitName,LapTime (s)_mean\n\
             Lando Norris,McLaren,2023,British Grand Prix,91.2\n\
             ,McLaren,2023,British Grand Prix,92.0\n",
        )
        .unwrap();

        let loaded = read_race_table(&path, &CircuitCatalog::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].lap_time_mean, Some(91.2));
        assert_eq!(loaded[0].circuit_short_name, None);
        assert_eq!(loaded[0].weather, WeatherSummary::default());
    }

    #[test]
    fn test_is_populated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        assert!(!is_populated(&path));
        std::fs::write(&path, "").unwrap();
        assert!(!is_populated(&path));
        std::fs::write(&path, "a\n1\n").unwrap();
        assert!(is_populated(&path));
    }
}
