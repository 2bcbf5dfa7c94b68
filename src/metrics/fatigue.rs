//! Fatigue resistance and power decay analysis
//!
//! Compares activity halves, measures power variability, and tracks decay
//! across fixed-length intervals. Only computed for activities of at least
//! one hour, where fatigue effects are measurable.

use statrs::statistics::Statistics;

use crate::config::AnalysisConfig;
use crate::metrics::base::time_weighted_mean;
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

/// Minimum activity length for fatigue analysis, in samples
const MIN_FATIGUE_SAMPLES: usize = 3600;

/// Minimum active samples for the variability statistics
const MIN_POWER_SAMPLES: usize = 30;

/// Default interval length for decay analysis, in seconds
pub const DEFAULT_INTERVAL_SECONDS: usize = 300;

pub struct FatigueCalculator<'a> {
    #[allow(dead_code)]
    config: &'a AnalysisConfig,
}

impl<'a> FatigueCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        FatigueCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let watts = match stream.watts() {
            Some(watts) => watts,
            None => return metrics,
        };
        if stream.len() < MIN_FATIGUE_SAMPLES {
            return metrics;
        }

        self.half_comparison(stream, &mut metrics);
        self.sustainability(watts, &mut metrics);
        self.interval_decay(watts, DEFAULT_INTERVAL_SECONDS, &mut metrics);

        metrics
    }

    /// Fatigue index and drift from the time-weighted half powers
    fn half_comparison(&self, stream: &Stream, metrics: &mut MetricMap) {
        let (first, second) = stream.halves();
        let first_watts = first.watts().unwrap_or(&[]);
        let second_watts = second.watts().unwrap_or(&[]);

        let first_power = time_weighted_mean(first_watts, &first.time);
        let second_power = time_weighted_mean(second_watts, &second.time);
        if first_power == 0.0 || second_power == 0.0 {
            return;
        }

        insert_metric(
            metrics,
            "fatigue_index",
            (first_power - second_power) / first_power * 100.0,
        );
        insert_metric(
            metrics,
            "power_drift",
            (second_power - first_power) / first_power * 100.0,
        );
        insert_metric(metrics, "first_half_power", first_power);
        insert_metric(metrics, "second_half_power", second_power);
        insert_metric(metrics, "half_power_ratio", second_power / first_power);
    }

    /// Coefficient of variation over the active samples and the derived
    /// sustainability index (100 − CV, floored at 0)
    fn sustainability(&self, watts: &[f64], metrics: &mut MetricMap) {
        let active: Vec<f64> = watts.iter().copied().filter(|w| *w > 0.0).collect();
        if active.len() < MIN_POWER_SAMPLES {
            return;
        }

        let mean = (&active).mean();
        let std_dev = (&active).std_dev();
        if mean == 0.0 {
            return;
        }

        let cv = std_dev / mean * 100.0;
        insert_metric(metrics, "power_coefficient_variation", cv);
        insert_metric(metrics, "power_sustainability_index", (100.0 - cv).max(0.0));
    }

    /// Decay across non-overlapping intervals of `interval_s` seconds
    fn interval_decay(&self, watts: &[f64], interval_s: usize, metrics: &mut MetricMap) {
        let n_intervals = watts.len() / interval_s;
        if n_intervals < 2 {
            return;
        }

        let mut interval_powers = Vec::with_capacity(n_intervals);
        for i in 0..n_intervals {
            let window = &watts[i * interval_s..(i + 1) * interval_s];
            let active: Vec<f64> = window.iter().copied().filter(|w| *w > 0.0).collect();
            if !active.is_empty() {
                interval_powers.push(active.iter().sum::<f64>() / active.len() as f64);
            }
        }
        if interval_powers.len() < 2 {
            return;
        }

        let first = interval_powers[0];
        let last = *interval_powers.last().unwrap();
        let decay_rate = if first > 0.0 {
            (first - last) / first * 100.0
        } else {
            0.0
        };

        let trend = normalized_slope(&interval_powers);

        insert_metric(
            metrics,
            &format!("interval_{}s_decay_rate", interval_s),
            decay_rate,
        );
        insert_metric(
            metrics,
            &format!("interval_{}s_power_trend", interval_s),
            trend,
        );
        insert_metric(
            metrics,
            &format!("interval_{}s_first_power", interval_s),
            first,
        );
        insert_metric(metrics, &format!("interval_{}s_last_power", interval_s), last);
    }
}

/// Least-squares slope of the interval powers, normalized by their mean
/// and expressed in percent per interval
fn normalized_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (y - mean_y);
        var_x += dx * dx;
    }
    if var_x == 0.0 || mean_y == 0.0 {
        return 0.0;
    }
    (cov / var_x) / mean_y * 100.0
}
