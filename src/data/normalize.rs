//! Session normalization
//!
//! Flattens one raw race or qualifying session into one feature row per
//! driver, keyed by (FullName, TeamName, Year, CircuitName). An unusable
//! session yields `None`; errors are logged here and never propagate.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::{error, warn};

use crate::data::circuit::CircuitFlags;
use crate::error::{PredictorError, Result};
use crate::models::{
    DriverKey, DriverResult, QualiFeatureRow, RaceFeatureRow, Session, WeatherSample,
    WeatherSummary,
};

/// Parser for the duration texts emitted by the telemetry source
pub struct DurationParser {
    days_pattern: Regex,
    clock_pattern: Regex,
}

impl Default for DurationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationParser {
    pub fn new() -> Self {
        Self {
            // "0 days 00:01:32.500000"
            days_pattern: Regex::new(r"^(\d+) days? (\d+):(\d{1,2}):(\d{1,2}(?:\.\d+)?)$").unwrap(),
            // "00:01:32.5" or "1:32.500"
            clock_pattern: Regex::new(r"^(?:(\d+):)?(\d+):(\d{1,2}(?:\.\d+)?)$").unwrap(),
        }
    }

    /// Duration in seconds, or `None` when the text is not a duration
    pub fn parse_secs(&self, text: &str) -> Option<f64> {
        let text = text.trim();

        if let Some(caps) = self.days_pattern.captures(text) {
            let days: f64 = caps[1].parse().ok()?;
            let hours: f64 = caps[2].parse().ok()?;
            let minutes: f64 = caps[3].parse().ok()?;
            let seconds: f64 = caps[4].parse().ok()?;
            return Some(days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds);
        }

        if let Some(caps) = self.clock_pattern.captures(text) {
            let hours: f64 = match caps.get(1) {
                Some(h) => h.as_str().parse().ok()?,
                None => 0.0,
            };
            let minutes: f64 = caps[2].parse().ok()?;
            let seconds: f64 = caps[3].parse().ok()?;
            return Some(hours * 3_600.0 + minutes * 60.0 + seconds);
        }

        text.parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
    }

    /// Parse an optional field: blank or null markers are missing, anything
    /// else must be a valid duration
    pub fn parse_field(&self, field: &'static str, value: Option<&str>) -> Result<Option<f64>> {
        match value.map(str::trim) {
            None => Ok(None),
            Some(text) if is_missing_marker(text) => Ok(None),
            Some(text) => self
                .parse_secs(text)
                .map(Some)
                .ok_or_else(|| PredictorError::MalformedField {
                    field,
                    value: text.to_string(),
                }),
        }
    }
}

fn is_missing_marker(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nat") || text.eq_ignore_ascii_case("nan")
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1); undefined below two values
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Average each weather field over the samples that carry it
pub fn summarize_weather(samples: &[WeatherSample]) -> WeatherSummary {
    let field_mean = |get: fn(&WeatherSample) -> Option<f64>| {
        let values: Vec<f64> = samples.iter().filter_map(get).collect();
        mean(&values)
    };

    WeatherSummary {
        air_temp: field_mean(|w| w.air_temp),
        track_temp: field_mean(|w| w.track_temp),
        humidity: field_mean(|w| w.humidity),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Converts raw sessions into per-driver feature rows
#[derive(Default)]
pub struct SessionNormalizer {
    durations: DurationParser,
}

impl SessionNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-driver lap-time statistics for a race session
    pub fn normalize_race(&self, session: &Session) -> Option<Vec<RaceFeatureRow>> {
        match self.try_normalize_race(session) {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error processing race data: {}", e);
                None
            }
        }
    }

    /// Best qualifying time and stage times for a qualifying session
    pub fn normalize_qualifying(&self, session: &Session) -> Option<Vec<QualiFeatureRow>> {
        match self.try_normalize_qualifying(session) {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error processing qualifying data: {}", e);
                None
            }
        }
    }

    fn circuit_name(session: &Session) -> Result<&str> {
        let name = session.event.name.trim();
        if name.is_empty() {
            return Err(PredictorError::MalformedField {
                field: "CircuitName",
                value: session.event.name.clone(),
            });
        }
        Ok(name)
    }

    fn try_normalize_race(&self, session: &Session) -> Result<Option<Vec<RaceFeatureRow>>> {
        let year = session.event.year;
        let circuit_name = Self::circuit_name(session)?;

        if session.laps.is_empty() {
            warn!("No lap data available for {} {}", year, circuit_name);
            return Ok(None);
        }

        let weather = summarize_weather(&session.weather_data);

        let valid_laps: Vec<(&str, f64)> = session
            .laps
            .iter()
            .filter_map(|lap| {
                let secs = lap
                    .lap_time
                    .as_deref()
                    .and_then(|text| self.durations.parse_secs(text))?;
                Some((lap.driver_number.trim(), secs))
            })
            .collect();

        if valid_laps.is_empty() {
            warn!("No valid lap times for {} {}", year, circuit_name);
            return Ok(None);
        }

        if session.results.is_empty() {
            warn!("No driver results available for {} {}", year, circuit_name);
            return Ok(None);
        }

        let drivers: HashMap<&str, &DriverResult> = session
            .results
            .iter()
            .rev()
            .map(|r| (r.driver_number.trim(), r))
            .collect();

        // Laps without a complete driver identity cannot form a key
        let mut lap_times: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for (number, secs) in valid_laps {
            let Some(driver) = drivers.get(number) else {
                continue;
            };
            let (Some(full_name), Some(team_name)) =
                (non_blank(&driver.full_name), non_blank(&driver.team_name))
            else {
                continue;
            };
            lap_times
                .entry((full_name.to_string(), team_name.to_string()))
                .or_default()
                .push(secs);
        }

        let rows = lap_times
            .into_iter()
            .map(|((full_name, team_name), times)| RaceFeatureRow {
                key: DriverKey {
                    full_name,
                    team_name,
                    year,
                    circuit_name: circuit_name.to_string(),
                },
                circuit_short_name: session.event.event_name.clone(),
                lap_time_mean: mean(&times),
                lap_time_min: times.iter().copied().reduce(f64::min),
                lap_time_std: sample_std(&times),
                weather,
                circuit: CircuitFlags::default(),
            })
            .collect();

        Ok(Some(rows))
    }

    fn try_normalize_qualifying(&self, session: &Session) -> Result<Option<Vec<QualiFeatureRow>>> {
        let year = session.event.year;
        let circuit_name = Self::circuit_name(session)?;

        if session.results.is_empty() {
            warn!("No qualifying results for {} {}", year, circuit_name);
            return Ok(None);
        }

        let weather = summarize_weather(&session.weather_data);
        let mut rows = Vec::with_capacity(session.results.len());

        for result in &session.results {
            let q1 = self.durations.parse_field("Q1", result.q1.as_deref())?;
            let q2 = self.durations.parse_field("Q2", result.q2.as_deref())?;
            let q3 = self.durations.parse_field("Q3", result.q3.as_deref())?;

            let (Some(full_name), Some(team_name)) =
                (non_blank(&result.full_name), non_blank(&result.team_name))
            else {
                continue;
            };

            // A driver knocked out in Q1 is scored on Q1 alone
            let best_quali_time = [q1, q2, q3].into_iter().flatten().reduce(f64::min);

            rows.push(QualiFeatureRow {
                key: DriverKey {
                    full_name: full_name.to_string(),
                    team_name: team_name.to_string(),
                    year,
                    circuit_name: circuit_name.to_string(),
                },
                circuit_short_name: session.event.event_name.clone(),
                driver_number: result.driver_number.trim().to_string(),
                abbreviation: result.abbreviation.clone(),
                position: result.position,
                q1,
                q2,
                q3,
                best_quali_time,
                weather,
                circuit: CircuitFlags::default(),
            });
        }

        Ok(Some(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventInfo, LapRecord};

    fn event(year: i32, name: &str) -> EventInfo {
        EventInfo {
            year,
            name: name.to_string(),
            event_name: Some(name.replace(" Grand Prix", "")),
        }
    }

    fn driver(number: &str, name: &str, team: &str) -> DriverResult {
        DriverResult {
            driver_number: number.to_string(),
            abbreviation: Some(name[..3].to_uppercase()),
            full_name: Some(name.to_string()),
            team_name: Some(team.to_string()),
            ..Default::default()
        }
    }

    fn lap(number: &str, time: Option<&str>) -> LapRecord {
        LapRecord {
            driver_number: number.to_string(),
            lap_time: time.map(String::from),
            ..Default::default()
        }
    }

    fn quali_result(number: &str, name: &str, q: [Option<&str>; 3]) -> DriverResult {
        DriverResult {
            q1: q[0].map(String::from),
            q2: q[1].map(String::from),
            q3: q[2].map(String::from),
            ..driver(number, name, "Team")
        }
    }

    fn weather(air: f64, track: f64, humidity: f64) -> WeatherSample {
        WeatherSample {
            air_temp: Some(air),
            track_temp: Some(track),
            humidity: Some(humidity),
        }
    }

    #[test]
    fn test_duration_formats() {
        let parser = DurationParser::new();
        assert_eq!(parser.parse_secs("0 days 00:01:32.500000"), Some(92.5));
        assert_eq!(parser.parse_secs("00:01:32.5"), Some(92.5));
        assert_eq!(parser.parse_secs("1:32.500"), Some(92.5));
        assert_eq!(parser.parse_secs("92.5"), Some(92.5));
        assert_eq!(parser.parse_secs(" 1 day 00:00:01 "), Some(86_401.0));
        assert_eq!(parser.parse_secs("NaT"), None);
        assert_eq!(parser.parse_secs("fast"), None);
        assert_eq!(parser.parse_secs("-3.0"), None);
    }

    #[test]
    fn test_parse_field_missing_vs_malformed() {
        let parser = DurationParser::new();
        assert_eq!(parser.parse_field("Q1", None).unwrap(), None);
        assert_eq!(parser.parse_field("Q1", Some("  ")).unwrap(), None);
        assert_eq!(parser.parse_field("Q1", Some("NaT")).unwrap(), None);
        assert_eq!(parser.parse_field("Q1", Some("1:30.0")).unwrap(), Some(90.0));
        assert!(parser.parse_field("Q1", Some("DNF")).is_err());
    }

    #[test]
    fn test_race_aggregates() {
        let session = Session {
            event: event(2023, "Monaco Grand Prix"),
            laps: vec![
                lap("1", Some("0 days 00:01:20.000000")),
                lap("1", Some("0 days 00:01:22.000000")),
                lap("1", None),
                lap("1", Some("garbage")),
                lap("44", Some("0 days 00:01:21.000000")),
                lap("99", Some("0 days 00:01:19.000000")),
            ],
            results: vec![
                driver("1", "Max Verstappen", "Red Bull Racing"),
                driver("44", "Lewis Hamilton", "Mercedes"),
            ],
            weather_data: vec![weather(20.0, 40.0, 60.0), weather(22.0, 42.0, 50.0)],
        };

        let rows = SessionNormalizer::new().normalize_race(&session).unwrap();
        assert_eq!(rows.len(), 2);

        // Ordered by (FullName, TeamName)
        assert_eq!(rows[0].key.full_name, "Lewis Hamilton");
        assert_eq!(rows[0].lap_time_mean, Some(81.0));
        assert_eq!(rows[0].lap_time_std, None);

        let max = &rows[1];
        assert_eq!(max.key.full_name, "Max Verstappen");
        assert_eq!(max.key.year, 2023);
        assert_eq!(max.key.circuit_name, "Monaco Grand Prix");
        assert_eq!(max.circuit_short_name.as_deref(), Some("Monaco"));
        assert_eq!(max.lap_time_mean, Some(81.0));
        assert_eq!(max.lap_time_min, Some(80.0));
        assert!((max.lap_time_std.unwrap() - 2.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(max.weather.air_temp, Some(21.0));
        assert_eq!(max.weather.track_temp, Some(41.0));
        assert_eq!(max.weather.humidity, Some(55.0));
    }

    #[test]
    fn test_race_missing_weather_stays_missing() {
        let session = Session {
            event: event(2021, "Belgian Grand Prix"),
            laps: vec![lap("5", Some("1:50.0"))],
            results: vec![driver("5", "Sebastian Vettel", "Aston Martin")],
            weather_data: Vec::new(),
        };

        let rows = SessionNormalizer::new().normalize_race(&session).unwrap();
        assert_eq!(rows[0].weather, WeatherSummary::default());
    }

    #[test]
    fn test_race_unusable_sessions() {
        let normalizer = SessionNormalizer::new();

        let no_laps = Session {
            event: event(2020, "Tuscan Grand Prix"),
            laps: Vec::new(),
            results: vec![driver("1", "Max Verstappen", "Red Bull Racing")],
            weather_data: Vec::new(),
        };
        assert!(normalizer.normalize_race(&no_laps).is_none());

        let no_valid_laps = Session {
            laps: vec![lap("1", None), lap("1", Some("NaT"))],
            ..no_laps.clone()
        };
        assert!(normalizer.normalize_race(&no_valid_laps).is_none());

        let no_results = Session {
            laps: vec![lap("1", Some("1:20.0"))],
            results: Vec::new(),
            ..no_laps.clone()
        };
        assert!(normalizer.normalize_race(&no_results).is_none());

        let no_circuit = Session {
            event: event(2020, "  "),
            laps: vec![lap("1", Some("1:20.0"))],
            ..no_laps
        };
        assert!(normalizer.normalize_race(&no_circuit).is_none());
    }

    #[test]
    fn test_race_drops_rows_without_identity() {
        let mut anonymous = driver("7", "Kimi Raikkonen", "Alfa Romeo");
        anonymous.team_name = None;

        let session = Session {
            event: event(2019, "Japanese Grand Prix"),
            laps: vec![lap("7", Some("1:32.0")), lap("3", Some("1:31.0"))],
            results: vec![anonymous, driver("3", "Daniel Ricciardo", "Renault")],
            weather_data: Vec::new(),
        };

        let rows = SessionNormalizer::new().normalize_race(&session).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.full_name, "Daniel Ricciardo");
    }

    #[test]
    fn test_best_quali_time() {
        let session = Session {
            event: event(2023, "Monaco Grand Prix"),
            laps: Vec::new(),
            results: vec![
                quali_result("1", "Driver A", [Some("0 days 00:01:32.500000"), None, Some("0 days 00:01:31.000000")]),
                quali_result("2", "Driver B", [Some("1:33.2"), None, None]),
                quali_result("3", "Driver C", [None, None, None]),
            ],
            weather_data: vec![weather(19.0, 35.0, 70.0)],
        };

        let rows = SessionNormalizer::new().normalize_qualifying(&session).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].q1, Some(92.5));
        assert_eq!(rows[0].q2, None);
        assert_eq!(rows[0].best_quali_time, Some(91.0));

        // Eliminated in Q1
        assert_eq!(rows[1].best_quali_time, Some(93.2));

        // Never set a time: missing, not zero
        assert_eq!(rows[2].best_quali_time, None);

        assert_eq!(rows[0].weather.air_temp, Some(19.0));
        assert_eq!(rows[0].driver_number, "1");
    }

    #[test]
    fn test_quali_malformed_time_rejects_session() {
        let session = Session {
            event: event(2023, "Dutch Grand Prix"),
            laps: Vec::new(),
            results: vec![quali_result("1", "Driver A", [Some("fast"), None, None])],
            weather_data: Vec::new(),
        };
        assert!(SessionNormalizer::new().normalize_qualifying(&session).is_none());
    }

    #[test]
    fn test_quali_without_results() {
        let session = Session {
            event: event(2023, "Dutch Grand Prix"),
            laps: vec![lap("1", Some("1:10.0"))],
            results: Vec::new(),
            weather_data: Vec::new(),
        };
        assert!(SessionNormalizer::new().normalize_qualifying(&session).is_none());
    }

    #[test]
    fn test_sample_std() {
        assert_eq!(sample_std(&[1.0]), None);
        assert!((sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap() - 2.138_089_935).abs() < 1e-6);
    }
}
