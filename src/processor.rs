//! Stream data processing and cleaning
//!
//! Turns a raw column table into a validated [`Stream`]: numeric coercion,
//! fill policies per column family, GPS pair parsing, and derivation of the
//! `moving` flag from inter-sample gaps.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::stream::{Stream, GAP_THRESHOLD_SECONDS};

/// Velocity below which a sample counts as stopped when `time` is absent
const MOVING_VELOCITY_FLOOR: f64 = 0.5;

/// Valid heart rate range in bpm; recorded values outside are treated as
/// sensor dropouts
const HR_RANGE: (f64, f64) = (30.0, 220.0);

/// Raw stream as loaded from disk: column name to cell strings
#[derive(Debug, Clone, Default)]
pub struct RawStream {
    pub columns: BTreeMap<String, Vec<String>>,
}

impl RawStream {
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Processes and cleans activity stream data
pub struct StreamProcessor;

impl StreamProcessor {
    pub fn new() -> Self {
        StreamProcessor
    }

    /// Run the complete cleaning pipeline
    ///
    /// Fails with a validation error when the `time` column is missing;
    /// missing optional columns only produce warnings.
    pub fn process(&self, raw: &RawStream) -> Result<Stream> {
        if !raw.columns.contains_key("time") {
            return Err(AnalysisError::Validation(
                "stream is missing essential column: time".to_string(),
            ));
        }
        self.check_optional_columns(raw);

        let n = raw.len();

        let mut time = coerce_numeric(&raw.columns["time"]);
        fill_forward_backward(&mut time);
        fill_value(&mut time, 0.0);
        validate_time_axis(&time)?;

        let heartrate = raw.columns.get("heartrate").map(|col| {
            let mut values = coerce_numeric(col);
            for v in values.iter_mut() {
                if v.is_finite() && (*v != 0.0) && (*v < HR_RANGE.0 || *v > HR_RANGE.1) {
                    *v = f64::NAN;
                }
            }
            fill_forward_backward(&mut values);
            fill_value(&mut values, 0.0);
            values
        });

        let watts = raw.columns.get("watts").map(|col| zero_filled(col));
        let cadence = raw.columns.get("cadence").map(|col| zero_filled(col));

        let velocity = raw
            .columns
            .get("velocity_smooth")
            .map(|col| motion_filled(col));
        let grade = raw.columns.get("grade_smooth").map(|col| motion_filled(col));
        let distance = raw.columns.get("distance").map(|col| motion_filled(col));
        let altitude = raw.columns.get("altitude").map(|col| motion_filled(col));

        let (lat, lng) = match raw.columns.get("latlng") {
            Some(col) => parse_latlng(col),
            None => (None, None),
        };

        let moving = self.derive_moving(raw, &time, velocity.as_deref(), n);

        let mut stream = Stream {
            time,
            moving,
            watts,
            heartrate,
            cadence,
            velocity,
            grade,
            altitude,
            distance,
            lat,
            lng,
            original_time: None,
        };
        clamp_non_negative(&mut stream);
        Ok(stream)
    }

    fn check_optional_columns(&self, raw: &RawStream) {
        let optional = [
            ("power", &["watts"][..]),
            ("heartrate", &["heartrate"][..]),
            ("location", &["latlng", "distance"][..]),
            ("gradient", &["grade_smooth", "altitude"][..]),
            ("cadence", &["cadence"][..]),
            ("speed", &["velocity_smooth"][..]),
        ];
        for (family, columns) in optional {
            let missing: Vec<&str> = columns
                .iter()
                .copied()
                .filter(|c| !raw.columns.contains_key(*c))
                .collect();
            if !missing.is_empty() {
                warn!(
                    family,
                    missing = ?missing,
                    "optional stream columns missing; related metrics will be skipped"
                );
            }
        }
    }

    /// Determine the moving state of every sample
    ///
    /// A provided `moving` column is kept as the base. Samples that follow a
    /// gap larger than the threshold are forced to stopped: they are the
    /// boundary where recording resumed after an auto-pause.
    fn derive_moving(
        &self,
        raw: &RawStream,
        time: &[f64],
        velocity: Option<&[f64]>,
        n: usize,
    ) -> Vec<bool> {
        let mut moving = match raw.columns.get("moving") {
            Some(col) => col.iter().map(|s| parse_bool(s)).collect(),
            None => vec![true; n],
        };

        if time.len() > 1 {
            let mut gaps = 0usize;
            let mut gap_time = 0.0;
            for i in 1..time.len() {
                let dt = time[i] - time[i - 1];
                if dt > GAP_THRESHOLD_SECONDS {
                    moving[i] = false;
                    gaps += 1;
                    gap_time += dt;
                }
            }
            if gaps > 0 {
                debug!(gaps, gap_time, "detected stopped periods from time gaps");
            }
        } else if let Some(velocity) = velocity {
            for (m, v) in moving.iter_mut().zip(velocity) {
                *m = *v > MOVING_VELOCITY_FLOOR;
            }
            debug!("inferred moving state from velocity data");
        } else {
            warn!("no time or velocity data; assuming all samples are moving");
        }

        moving
    }
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a cell to f64; unparsable or empty cells become NaN
fn coerce_numeric(col: &[String]) -> Vec<f64> {
    col.iter()
        .map(|s| {
            let s = s.trim();
            if s.is_empty() {
                f64::NAN
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        })
        .collect()
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "True" | "true" | "TRUE" | "1" | "1.0")
}

/// Forward-fill then backward-fill NaN runs in place
fn fill_forward_backward(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
    let mut next = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }
}

/// Replace remaining NaNs with a constant
fn fill_value(values: &mut [f64], fill: f64) {
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = fill;
        }
    }
}

/// Power/cadence policy: missing samples mean zero output
fn zero_filled(col: &[String]) -> Vec<f64> {
    let mut values = coerce_numeric(col);
    fill_value(&mut values, 0.0);
    values
}

/// Motion-column policy: forward, backward, then zero fill
fn motion_filled(col: &[String]) -> Vec<f64> {
    let mut values = coerce_numeric(col);
    fill_forward_backward(&mut values);
    fill_value(&mut values, 0.0);
    values
}

/// Split a `latlng` pair column (e.g. `[47.36, 8.54]`) into lat and lng
///
/// On parse failure the columns are emitted as NaN and processing continues.
fn parse_latlng(col: &[String]) -> (Option<Vec<f64>>, Option<Vec<f64>>) {
    let mut lat = Vec::with_capacity(col.len());
    let mut lng = Vec::with_capacity(col.len());
    let mut failures = 0usize;

    for cell in col {
        match parse_pair(cell) {
            Some((a, b)) => {
                lat.push(a);
                lng.push(b);
            }
            None => {
                lat.push(f64::NAN);
                lng.push(f64::NAN);
                if !cell.trim().is_empty() {
                    failures += 1;
                }
            }
        }
    }

    if failures > 0 {
        warn!(failures, "could not parse some latlng cells");
    }
    if lat.iter().all(|v| v.is_nan()) {
        warn!("no GPS data found in latlng column");
    }
    (Some(lat), Some(lng))
}

fn parse_pair(cell: &str) -> Option<(f64, f64)> {
    let trimmed = cell
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let mut parts = trimmed.split(',');
    let a = parts.next()?.trim().parse::<f64>().ok()?;
    let b = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}

/// The time axis must be non-decreasing after coercion
fn validate_time_axis(time: &[f64]) -> Result<()> {
    for i in 1..time.len() {
        if time[i] < time[i - 1] {
            return Err(AnalysisError::Validation(format!(
                "time axis is not sorted at sample {} ({} < {})",
                i,
                time[i],
                time[i - 1]
            )));
        }
    }
    Ok(())
}

/// Power, cadence and velocity cannot be negative
fn clamp_non_negative(stream: &mut Stream) {
    for col in [&mut stream.watts, &mut stream.cadence, &mut stream.velocity]
        .into_iter()
        .flatten()
    {
        for v in col.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }
}
