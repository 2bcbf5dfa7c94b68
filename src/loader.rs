//! Input file loading
//!
//! Reads the `;`-separated activity catalog, per-activity stream files and
//! the optional historical threshold table. All downstream parsing works on
//! the column tables produced here.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, DataLoadError, Result};
use crate::models::{Activity, ActivityType};
use crate::processor::RawStream;
use crate::thresholds::ThresholdRecord;

/// Field separator used by every input and output table
pub const CSV_SEPARATOR: u8 = b';';

pub struct ActivityDataLoader<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> ActivityDataLoader<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        ActivityDataLoader { config }
    }

    /// Load the activity catalog
    ///
    /// Rows with unknown activity types are skipped with a warning; rows
    /// with unparsable ids or dates fail the load.
    pub fn load_activities(&self) -> Result<Vec<Activity>> {
        let path = &self.config.activities_file;
        if !path.exists() {
            return Err(DataLoadError::FileNotFound { path: path.clone() }.into());
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(CSV_SEPARATOR)
            .from_path(path)
            .map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let headers = reader
            .headers()
            .map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        for required in ["id", "type", "start_date", "start_date_local"] {
            if column(required).is_none() {
                return Err(DataLoadError::MissingColumn {
                    path: path.clone(),
                    column: required.to_string(),
                }
                .into());
            }
        }

        let id_col = column("id").unwrap();
        let type_col = column("type").unwrap();
        let start_col = column("start_date").unwrap();
        let local_col = column("start_date_local").unwrap();
        let name_col = column("name");
        let distance_col = column("distance");
        let moving_time_col = column("moving_time");
        let elapsed_time_col = column("elapsed_time");
        let elevation_col = column("total_elevation_gain");
        let avg_speed_col = column("average_speed");
        let max_speed_col = column("max_speed");

        let mut activities = Vec::new();
        for (row_index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: format!("row {}: {}", row_index + 2, e),
            })?;

            let field = |i: usize| record.get(i).unwrap_or("").trim();
            let opt_f64 = |i: Option<usize>| i.and_then(|i| field(i).parse::<f64>().ok());

            let type_str = field(type_col);
            let activity_type = match ActivityType::parse(type_str) {
                Some(t) => t,
                None => {
                    warn!(activity_type = type_str, "skipping unknown activity type");
                    continue;
                }
            };

            let id = field(id_col).parse::<i64>().map_err(|_| {
                AnalysisError::from(DataLoadError::ParseError {
                    path: path.clone(),
                    reason: format!("row {}: invalid id '{}'", row_index + 2, field(id_col)),
                })
            })?;

            let start_date = parse_utc_datetime(field(start_col)).ok_or_else(|| {
                AnalysisError::from(DataLoadError::ParseError {
                    path: path.clone(),
                    reason: format!("row {}: invalid start_date '{}'", row_index + 2, field(start_col)),
                })
            })?;
            let start_date_local = parse_naive_datetime(field(local_col)).ok_or_else(|| {
                AnalysisError::from(DataLoadError::ParseError {
                    path: path.clone(),
                    reason: format!(
                        "row {}: invalid start_date_local '{}'",
                        row_index + 2,
                        field(local_col)
                    ),
                })
            })?;

            activities.push(Activity {
                id,
                name: name_col.map(|i| field(i).to_string()).filter(|s| !s.is_empty()),
                activity_type,
                start_date,
                start_date_local,
                distance: opt_f64(distance_col),
                moving_time: opt_f64(moving_time_col),
                elapsed_time: opt_f64(elapsed_time_col),
                total_elevation_gain: opt_f64(elevation_col),
                average_speed: opt_f64(avg_speed_col),
                max_speed: opt_f64(max_speed_col),
            });
        }

        info!(count = activities.len(), path = %path.display(), "loaded activities");
        Ok(activities)
    }

    /// Load the stream file for one activity as raw column strings
    pub fn load_stream(&self, activity_id: i64) -> Result<RawStream> {
        let path = self.config.stream_path(activity_id);
        if !path.exists() {
            return Err(DataLoadError::FileNotFound { path }.into());
        }

        let raw = load_columns(&path)?;
        if raw.is_empty() {
            return Err(DataLoadError::EmptyStream { activity_id }.into());
        }
        Ok(raw)
    }

    pub fn stream_exists(&self, activity_id: i64) -> bool {
        self.config.stream_path(activity_id).exists()
    }

    /// Load the historical threshold table, if present
    pub fn load_thresholds(&self) -> Result<Option<Vec<ThresholdRecord>>> {
        let path = self.config.thresholds_path();
        if !path.exists() {
            info!("no historical thresholds file found");
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(CSV_SEPARATOR)
            .from_path(&path)
            .map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let headers = reader
            .headers()
            .map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let (date_col, ftp_col, fthr_col) = match (column("date"), column("ftp"), column("fthr")) {
            (Some(d), Some(f), Some(h)) => (d, f, h),
            _ => {
                warn!(path = %path.display(), "threshold table missing columns; ignoring");
                return Ok(None);
            }
        };

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DataLoadError::ParseError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();

            let date = match NaiveDate::parse_from_str(&field(date_col), "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => {
                    warn!(value = field(date_col), "skipping threshold row with bad date");
                    continue;
                }
            };
            let ftp = field(ftp_col).parse::<f64>().unwrap_or(f64::NAN);
            let fthr = field(fthr_col).parse::<f64>().unwrap_or(f64::NAN);
            if !ftp.is_finite() {
                continue;
            }
            records.push(ThresholdRecord { date, ftp, fthr });
        }

        Ok(Some(records))
    }
}

/// Read any `;`-separated file into a column-major string table
pub fn load_columns(path: &Path) -> Result<RawStream> {
    let mut reader = ReaderBuilder::new()
        .delimiter(CSV_SEPARATOR)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DataLoadError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DataLoadError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: BTreeMap<String, Vec<String>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();

    for record in reader.records() {
        let record = record.map_err(|e| DataLoadError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        for (i, header) in headers.iter().enumerate() {
            columns
                .get_mut(header)
                .unwrap()
                .push(record.get(i).unwrap_or("").to_string());
        }
    }

    Ok(RawStream { columns })
}

/// Parse an ISO-8601 timestamp with timezone into UTC
fn parse_utc_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    // tolerate a missing offset by assuming UTC
    parse_naive_datetime(s).map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Parse a local timestamp; a trailing offset is dropped rather than
/// converted, since the column already carries wall-clock time
fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    None
}
