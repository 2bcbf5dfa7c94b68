//! Basic aggregated metrics
//!
//! Cadence and speed aggregates plus the temporal/distance/elevation totals
//! every view reports regardless of activity type.

use crate::config::AnalysisConfig;
use crate::metrics::base::time_weighted_mean;
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

pub struct BasicCalculator<'a> {
    #[allow(dead_code)]
    config: &'a AnalysisConfig,
}

impl<'a> BasicCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        BasicCalculator { config }
    }

    /// Compute basic aggregates for a view
    ///
    /// `include_speed` is false for running activities, where the pace
    /// calculator owns the speed keys.
    pub fn calculate(&self, stream: &Stream, include_speed: bool) -> MetricMap {
        let mut metrics = MetricMap::new();

        self.cadence_metrics(stream, &mut metrics);
        if include_speed {
            self.speed_metrics(stream, &mut metrics);
        }
        self.temporal_metrics(stream, &mut metrics);

        metrics
    }

    fn cadence_metrics(&self, stream: &Stream, metrics: &mut MetricMap) {
        match stream.cadence() {
            Some(cadence) if cadence.iter().any(|c| *c > 0.0) => {
                insert_metric(
                    metrics,
                    "average_cadence",
                    time_weighted_mean(cadence, &stream.time),
                );
                insert_metric(
                    metrics,
                    "max_cadence",
                    cadence.iter().copied().filter(|c| *c > 0.0).fold(0.0, f64::max),
                );
            }
            _ => {
                insert_metric(metrics, "average_cadence", 0.0);
                insert_metric(metrics, "max_cadence", 0.0);
            }
        }
    }

    fn speed_metrics(&self, stream: &Stream, metrics: &mut MetricMap) {
        match stream.velocity() {
            Some(velocity) if velocity.iter().any(|v| *v > 0.0) => {
                insert_metric(
                    metrics,
                    "average_speed",
                    time_weighted_mean(velocity, &stream.time),
                );
                insert_metric(
                    metrics,
                    "max_speed",
                    velocity.iter().copied().filter(|v| *v > 0.0).fold(0.0, f64::max),
                );
            }
            _ => {
                insert_metric(metrics, "average_speed", 0.0);
                insert_metric(metrics, "max_speed", 0.0);
            }
        }
    }

    fn temporal_metrics(&self, stream: &Stream, metrics: &mut MetricMap) {
        let total_time = if stream.is_empty() {
            0.0
        } else {
            stream.time.last().unwrap() - stream.time.first().unwrap()
        };
        insert_metric(metrics, "total_time", total_time);

        let moving_time = stream.moving.iter().filter(|m| **m).count() as f64;
        insert_metric(metrics, "moving_time", moving_time);

        // distance and elevation only when the stream actually carries
        // them; the catalog values stand in otherwise
        if let Some(distance) = stream.distance().and_then(|d| d.last().copied()) {
            insert_metric(metrics, "distance", distance);
        }
        if let Some(altitude) = stream.altitude() {
            let elevation_gain = altitude
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).max(0.0))
                .sum();
            insert_metric(metrics, "elevation_gain", elevation_gain);
        }
    }
}
