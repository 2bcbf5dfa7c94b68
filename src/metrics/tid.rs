//! Training Intensity Distribution
//!
//! Collapses power and heart rate into three intensity bands, reports the
//! time share of each, the polarization index, the training distribution
//! ratio, and a polarized / pyramidal / threshold classification.

use crate::config::AnalysisConfig;
use crate::metrics::base::{time_deltas, time_where};
use crate::models::{insert_metric, MetricMap, MetricValue};
use crate::stream::Stream;

/// Power band edges as fractions of FTP
const POWER_BAND_EDGES: (f64, f64) = (0.76, 0.90);

/// Heart rate band edges as fractions of FTHR
const HR_BAND_EDGES: (f64, f64) = (0.82, 0.94);

pub struct TidCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> TidCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        TidCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        if let Some(watts) = stream.watts() {
            if self.config.ftp > 0.0 && !watts.is_empty() {
                let (z1_edge, z2_edge) = POWER_BAND_EDGES;
                self.band_metrics(
                    watts,
                    &stream.time,
                    z1_edge * self.config.ftp,
                    z2_edge * self.config.ftp,
                    "power",
                    &mut metrics,
                );
            }
        }

        if let Some(heartrate) = stream.heartrate() {
            if self.config.fthr > 0.0 && !heartrate.is_empty() {
                let (z1_edge, z2_edge) = HR_BAND_EDGES;
                self.band_metrics(
                    heartrate,
                    &stream.time,
                    z1_edge * self.config.fthr,
                    z2_edge * self.config.fthr,
                    "hr",
                    &mut metrics,
                );
            }
        }

        metrics
    }

    fn band_metrics(
        &self,
        values: &[f64],
        times: &[f64],
        z1_threshold: f64,
        z2_threshold: f64,
        family: &str,
        metrics: &mut MetricMap,
    ) {
        let total_time: f64 = time_deltas(times).iter().sum();
        if total_time == 0.0 {
            return;
        }

        let z1_mask: Vec<bool> = values.iter().map(|v| *v < z1_threshold).collect();
        let z2_mask: Vec<bool> = values
            .iter()
            .map(|v| *v >= z1_threshold && *v < z2_threshold)
            .collect();
        let z3_mask: Vec<bool> = values.iter().map(|v| *v >= z2_threshold).collect();

        let z1_pct = time_where(times, &z1_mask) / total_time * 100.0;
        let z2_pct = time_where(times, &z2_mask) / total_time * 100.0;
        let z3_pct = time_where(times, &z3_mask) / total_time * 100.0;

        insert_metric(metrics, &format!("{}_tid_z1_percentage", family), z1_pct);
        insert_metric(metrics, &format!("{}_tid_z2_percentage", family), z2_pct);
        insert_metric(metrics, &format!("{}_tid_z3_percentage", family), z3_pct);

        let polarization_index = if z2_pct > 0.0 {
            (z1_pct + z3_pct) / z2_pct
        } else {
            0.0
        };
        insert_metric(
            metrics,
            &format!("{}_polarization_index", family),
            polarization_index,
        );

        let tdr = if z3_pct > 0.0 { z1_pct / z3_pct } else { 0.0 };
        insert_metric(metrics, &format!("{}_tdr", family), tdr);

        metrics.insert(
            format!("{}_tid_classification", family),
            MetricValue::Text(classify_tid(z1_pct, z2_pct, z3_pct).to_string()),
        );
    }
}

/// Classify a three-band distribution
///
/// Polarized: dominant Z1 with a hollowed-out middle. Pyramidal: strictly
/// descending shares. Everything else trains through the threshold.
pub fn classify_tid(z1_pct: f64, z2_pct: f64, z3_pct: f64) -> &'static str {
    if z1_pct > 75.0 && z2_pct < 10.0 {
        return "polarized";
    }
    if z1_pct > z2_pct && z2_pct > z3_pct {
        return "pyramidal";
    }
    "threshold"
}
