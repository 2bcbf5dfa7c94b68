//! Time-in-zone distributions
//!
//! Power (7-zone) and heart rate (5-zone) distributions over half-open
//! [lo, hi) intervals, time-weighted so irregular sampling cannot skew the
//! percentages. The zone layouts themselves are derived at config build
//! time (LT-based or percentage-of-threshold).

use crate::config::AnalysisConfig;
use crate::metrics::base::{time_deltas, time_where};
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

pub struct ZoneCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> ZoneCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        ZoneCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        if let Some(watts) = stream.watts() {
            if self.config.ftp > 0.0 {
                self.zone_percentages(
                    watts,
                    &stream.time,
                    &self.config.power_zones,
                    "power_z",
                    &mut metrics,
                );
            }
        }

        if let Some(heartrate) = stream.heartrate() {
            if self.config.fthr > 0.0 {
                self.zone_percentages(
                    heartrate,
                    &stream.time,
                    &self.config.hr_zones,
                    "hr_z",
                    &mut metrics,
                );
            }
        }

        metrics
    }

    fn zone_percentages(
        &self,
        values: &[f64],
        times: &[f64],
        zones: &[(f64, f64)],
        key_prefix: &str,
        metrics: &mut MetricMap,
    ) {
        if values.is_empty() {
            return;
        }
        let total_time: f64 = time_deltas(times).iter().sum();
        if total_time == 0.0 {
            return;
        }

        for (i, (lo, hi)) in zones.iter().enumerate() {
            let mask: Vec<bool> = values.iter().map(|v| *v >= *lo && *v < *hi).collect();
            let time_in_zone = time_where(times, &mask);
            insert_metric(
                metrics,
                &format!("{}{}_percentage", key_prefix, i + 1),
                time_in_zone / total_time * 100.0,
            );
        }
    }
}
