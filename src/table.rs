//! Enriched activity tables
//!
//! One table per view (raw and moving): activity metadata, the view's
//! metric map, reference thresholds, fitness state, the CP model and zone
//! edges. Tables merge incrementally across runs, round-trip through
//! `;`-separated CSV, and are persisted atomically so a failed run never
//! clobbers existing output.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::{NaiveDateTime, SecondsFormat};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

use crate::error::{DataLoadError, Result};
use crate::loader::CSV_SEPARATOR;
use crate::models::{Activity, ActivityType, CpModel, FitnessState, MetricMap, MetricValue};

/// Metadata columns, in output order
const META_COLUMNS: [&str; 11] = [
    "id",
    "name",
    "type",
    "start_date",
    "start_date_local",
    "distance",
    "moving_time",
    "elapsed_time",
    "total_elevation_gain",
    "average_speed",
    "max_speed",
];

/// Auxiliary columns appended after the metric keys, in output order
const AUX_COLUMNS: [&str; 14] = [
    "ftp",
    "fthr",
    "lt1_power",
    "lt2_power",
    "lt1_hr",
    "lt2_hr",
    "ctl",
    "atl",
    "tsb",
    "acwr",
    "cp",
    "w_prime",
    "r_squared",
    "aei",
];

/// One activity's enriched row
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedActivity {
    pub activity: Activity,
    pub metrics: MetricMap,

    /// Reference thresholds in force on the activity date
    pub ftp: Option<f64>,
    pub fthr: Option<f64>,
    pub lt1_power: Option<f64>,
    pub lt2_power: Option<f64>,
    pub lt1_hr: Option<f64>,
    pub lt2_hr: Option<f64>,

    pub fitness: Option<FitnessState>,
    pub cp_model: Option<CpModel>,
    pub aei: Option<f64>,

    /// Zone right-edges stamped by backpropagation; None until stamped
    pub power_zone_edges: Option<Vec<f64>>,
    pub hr_zone_edges: Option<Vec<f64>>,
}

impl EnrichedActivity {
    pub fn new(activity: Activity, metrics: MetricMap) -> Self {
        EnrichedActivity {
            activity,
            metrics,
            ftp: None,
            fthr: None,
            lt1_power: None,
            lt2_power: None,
            lt1_hr: None,
            lt2_hr: None,
            fitness: None,
            cp_model: None,
            aei: None,
            power_zone_edges: None,
            hr_zone_edges: None,
        }
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(MetricValue::as_f64)
    }
}

/// An enriched table for one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTable {
    pub rows: Vec<EnrichedActivity>,
}

impl ActivityTable {
    pub fn new(rows: Vec<EnrichedActivity>) -> Self {
        ActivityTable { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> HashSet<i64> {
        self.rows.iter().map(|r| r.activity.id).collect()
    }

    /// Append rows whose activity is not in the table yet
    pub fn merge(&mut self, new_rows: Vec<EnrichedActivity>) {
        let existing = self.ids();
        for row in new_rows {
            if !existing.contains(&row.activity.id) {
                self.rows.push(row);
            }
        }
    }

    /// Sort by local start date descending, newest first; id breaks ties
    pub fn sort_descending(&mut self) {
        self.rows.sort_by(|a, b| {
            b.activity
                .start_date_local
                .cmp(&a.activity.start_date_local)
                .then(b.activity.id.cmp(&a.activity.id))
        });
    }

    /// Sorted union of metric keys across all rows
    ///
    /// Keys that share a name with a metadata or auxiliary column are
    /// folded into that column instead (the computed value wins there), so
    /// they are excluded here to keep every header unique.
    pub fn metric_columns(&self) -> Vec<String> {
        let claimed: HashSet<&str> = META_COLUMNS.iter().chain(AUX_COLUMNS.iter()).copied().collect();
        let keys: BTreeSet<String> = self
            .rows
            .iter()
            .flat_map(|r| r.metrics.keys())
            .filter(|k| {
                !claimed.contains(k.as_str())
                    && !k.starts_with("power_zone_")
                    && !k.starts_with("hr_zone_")
            })
            .cloned()
            .collect();
        keys.into_iter().collect()
    }

    /// Largest stamped edge vectors decide how many zone columns to emit
    fn zone_column_counts(&self) -> (usize, usize) {
        let power = self
            .rows
            .iter()
            .filter_map(|r| r.power_zone_edges.as_ref().map(Vec::len))
            .max()
            .unwrap_or(0);
        let hr = self
            .rows
            .iter()
            .filter_map(|r| r.hr_zone_edges.as_ref().map(Vec::len))
            .max()
            .unwrap_or(0);
        (power, hr)
    }

    /// Write the table atomically: serialise to `<path>.tmp`, then rename
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("csv.tmp");

        let metric_columns = self.metric_columns();
        let (power_zones, hr_zones) = self.zone_column_counts();

        let mut writer = WriterBuilder::new()
            .delimiter(CSV_SEPARATOR)
            .from_path(&tmp_path)?;

        let mut header: Vec<String> = META_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(metric_columns.iter().cloned());
        header.extend(AUX_COLUMNS.iter().map(|c| c.to_string()));
        for i in 0..power_zones {
            header.push(format!("power_zone_{}", i + 1));
        }
        for i in 0..hr_zones {
            header.push(format!("hr_zone_{}", i + 1));
        }
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            let a = &row.activity;

            // computed view values take the column over the catalog value,
            // matching the one-namespace layout of the enriched output
            let overlay = |key: &str, fallback: Option<f64>| {
                row.metric_f64(key).or(fallback).map(format_float).unwrap_or_default()
            };

            record.push(a.id.to_string());
            record.push(a.name.clone().unwrap_or_default());
            record.push(a.activity_type.as_str().to_string());
            record.push(a.start_date.to_rfc3339_opts(SecondsFormat::Secs, true));
            record.push(a.start_date_local.format("%Y-%m-%dT%H:%M:%S").to_string());
            record.push(overlay("distance", a.distance));
            record.push(overlay("moving_time", a.moving_time));
            record.push(fmt_opt(a.elapsed_time));
            record.push(fmt_opt(a.total_elevation_gain));
            record.push(overlay("average_speed", a.average_speed));
            record.push(overlay("max_speed", a.max_speed));

            for key in &metric_columns {
                record.push(match row.metrics.get(key) {
                    Some(value) => value.to_string(),
                    None => String::new(),
                });
            }

            record.push(fmt_opt(row.ftp));
            record.push(fmt_opt(row.fthr));
            record.push(fmt_opt(row.lt1_power));
            record.push(fmt_opt(row.lt2_power));
            record.push(fmt_opt(row.lt1_hr));
            record.push(fmt_opt(row.lt2_hr));
            record.push(fmt_opt(row.fitness.map(|f| f.ctl)));
            record.push(fmt_opt(row.fitness.map(|f| f.atl)));
            record.push(fmt_opt(row.fitness.map(|f| f.tsb)));
            record.push(fmt_opt(row.fitness.map(|f| f.acwr)));
            record.push(fmt_opt(row.cp_model.map(|m| m.cp)));
            record.push(fmt_opt(row.cp_model.map(|m| m.w_prime)));
            record.push(fmt_opt(row.cp_model.map(|m| m.r_squared)));
            record.push(fmt_opt(row.aei));

            for i in 0..power_zones {
                record.push(
                    row.power_zone_edges
                        .as_ref()
                        .and_then(|edges| edges.get(i))
                        .map(|e| format_float(*e))
                        .unwrap_or_default(),
                );
            }
            for i in 0..hr_zones {
                record.push(
                    row.hr_zone_edges
                        .as_ref()
                        .and_then(|edges| edges.get(i))
                        .map(|e| format_float(*e))
                        .unwrap_or_default(),
                );
            }

            writer.write_record(&record)?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp_path, path)?;
        info!(rows = self.len(), path = %path.display(), "wrote table");
        Ok(())
    }

    /// Read a previously written table back
    pub fn read_csv(path: &Path) -> Result<ActivityTable> {
        let mut reader = ReaderBuilder::new()
            .delimiter(CSV_SEPARATOR)
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
        let column = |name: &str| headers.iter().position(|h| h == name);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DataLoadError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let field = |name: &str| column(name).and_then(|i| record.get(i)).unwrap_or("");
            let opt_f64 = |name: &str| {
                let s = field(name);
                if s.is_empty() {
                    None
                } else {
                    s.parse::<f64>().ok()
                }
            };

            let activity_type = match ActivityType::parse(field("type")) {
                Some(t) => t,
                None => continue,
            };
            let id = match field("id").parse::<i64>() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let start_date = match chrono::DateTime::parse_from_rfc3339(field("start_date")) {
                Ok(dt) => dt.with_timezone(&chrono::Utc),
                Err(_) => continue,
            };
            let start_date_local = match NaiveDateTime::parse_from_str(
                field("start_date_local"),
                "%Y-%m-%dT%H:%M:%S",
            ) {
                Ok(dt) => dt,
                Err(_) => continue,
            };

            let activity = Activity {
                id,
                name: Some(field("name").to_string()).filter(|s| !s.is_empty()),
                activity_type,
                start_date,
                start_date_local,
                distance: opt_f64("distance"),
                moving_time: opt_f64("moving_time"),
                elapsed_time: opt_f64("elapsed_time"),
                total_elevation_gain: opt_f64("total_elevation_gain"),
                average_speed: opt_f64("average_speed"),
                max_speed: opt_f64("max_speed"),
            };

            let mut row = EnrichedActivity::new(activity, MetricMap::new());
            row.ftp = opt_f64("ftp");
            row.fthr = opt_f64("fthr");
            row.lt1_power = opt_f64("lt1_power");
            row.lt2_power = opt_f64("lt2_power");
            row.lt1_hr = opt_f64("lt1_hr");
            row.lt2_hr = opt_f64("lt2_hr");

            if let (Some(ctl), Some(atl), Some(tsb), Some(acwr)) = (
                opt_f64("ctl"),
                opt_f64("atl"),
                opt_f64("tsb"),
                opt_f64("acwr"),
            ) {
                row.fitness = Some(FitnessState {
                    ctl,
                    atl,
                    tsb,
                    acwr,
                });
            }
            if let (Some(cp), Some(w_prime), Some(r_squared)) =
                (opt_f64("cp"), opt_f64("w_prime"), opt_f64("r_squared"))
            {
                row.cp_model = Some(CpModel {
                    cp,
                    w_prime,
                    r_squared,
                });
            }
            row.aei = opt_f64("aei");

            row.power_zone_edges = read_edges(&headers, &record, "power_zone_");
            row.hr_zone_edges = read_edges(&headers, &record, "hr_zone_");

            // everything unclaimed is a metric column
            let claimed: HashSet<&str> = META_COLUMNS
                .iter()
                .chain(AUX_COLUMNS.iter())
                .copied()
                .collect();
            for (i, header) in headers.iter().enumerate() {
                if claimed.contains(header.as_str())
                    || header.starts_with("power_zone_")
                    || header.starts_with("hr_zone_")
                {
                    continue;
                }
                let cell = record.get(i).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                let value = match cell.parse::<f64>() {
                    Ok(v) => MetricValue::Float(v),
                    Err(_) => MetricValue::Text(cell.to_string()),
                };
                row.metrics.insert(header.clone(), value);
            }

            rows.push(row);
        }

        Ok(ActivityTable::new(rows))
    }
}

/// Serialise a float with the shortest representation that round-trips
fn format_float(value: f64) -> String {
    format!("{}", value)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Collect `prefix1`, `prefix2`, ... columns into an edge vector
fn read_edges(
    headers: &[String],
    record: &csv::StringRecord,
    prefix: &str,
) -> Option<Vec<f64>> {
    let mut edges = Vec::new();
    for index in 1.. {
        let name = format!("{}{}", prefix, index);
        match headers.iter().position(|h| *h == name) {
            Some(i) => match record.get(i).map(str::trim) {
                Some(cell) if !cell.is_empty() => match cell.parse::<f64>() {
                    Ok(v) => edges.push(v),
                    Err(_) => return None,
                },
                _ => return None,
            },
            None => break,
        }
    }
    if edges.is_empty() {
        None
    } else {
        Some(edges)
    }
}
