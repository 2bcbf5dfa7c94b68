//! Power-based metric calculations
//!
//! Average/max power, per-kg power, Normalized Power, Intensity Factor and
//! Training Stress Score. A full hour ridden exactly at FTP scores 100 TSS.

use tracing::warn;

use crate::config::AnalysisConfig;
use crate::metrics::base::{rolling_mean_expanding, time_weighted_mean, total_duration};
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

/// Rolling window for Normalized Power, in samples of the split view
pub const NP_WINDOW: usize = 30;

/// Minimum number of active power samples for NP to be meaningful
pub const MIN_POWER_SAMPLES: usize = 30;

const SECONDS_PER_HOUR: f64 = 3600.0;

pub struct PowerCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> PowerCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        PowerCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let watts = match stream.watts() {
            Some(watts) if !watts.is_empty() => watts,
            _ => return self.empty_metrics(),
        };
        if watts.iter().all(|w| *w <= 0.0) {
            return self.empty_metrics();
        }

        // zeros stay in the average: a zero sample with a large delta is
        // exactly how stopped time is represented in the raw view
        let average_power = time_weighted_mean(watts, &stream.time);
        insert_metric(&mut metrics, "average_power", average_power);

        let max_power = watts.iter().copied().filter(|w| *w > 0.0).fold(0.0, f64::max);
        insert_metric(&mut metrics, "max_power", max_power);
        insert_metric(
            &mut metrics,
            "power_per_kg",
            average_power / self.config.rider_weight_kg,
        );

        let np = normalized_power(stream);
        insert_metric(&mut metrics, "normalized_power", np);

        if np > 0.0 && self.config.ftp > 0.0 {
            let intensity_factor = np / self.config.ftp;
            insert_metric(&mut metrics, "intensity_factor", intensity_factor);

            let duration_s = total_duration(&stream.time);
            let tss = np * intensity_factor * duration_s / (self.config.ftp * SECONDS_PER_HOUR)
                * 100.0;
            insert_metric(&mut metrics, "training_stress_score", tss);
        } else {
            insert_metric(&mut metrics, "intensity_factor", 0.0);
            insert_metric(&mut metrics, "training_stress_score", 0.0);
        }

        metrics
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in [
            "average_power",
            "max_power",
            "power_per_kg",
            "normalized_power",
            "intensity_factor",
            "training_stress_score",
        ] {
            insert_metric(&mut metrics, key, 0.0);
        }
        metrics
    }
}

/// Normalized Power over a view
///
/// 30-sample rolling mean over the view's watts (zeros included, so
/// stopped samples in the raw view suppress NP as recorded), raised to the
/// fourth power, averaged time-weighted over the view's deltas, fourth
/// root. Requires at least [`MIN_POWER_SAMPLES`] samples with watts > 0.
pub fn normalized_power(stream: &Stream) -> f64 {
    let watts = match stream.watts() {
        Some(watts) => watts,
        None => return 0.0,
    };

    let active_samples = watts.iter().filter(|w| **w > 0.0).count();
    if active_samples < MIN_POWER_SAMPLES {
        return 0.0;
    }

    let rolled = rolling_mean_expanding(watts, NP_WINDOW);
    let fourth: Vec<f64> = rolled.iter().map(|v| v.powi(4)).collect();
    let weighted_fourth = time_weighted_mean(&fourth, &stream.time);

    let np = weighted_fourth.powf(0.25);
    if np.is_finite() {
        np
    } else {
        warn!("normalized power was non-finite; returning 0");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;

    fn config_with_ftp(ftp: f64) -> AnalysisConfig {
        ConfigDocument {
            ftp: Some(ftp),
            ..ConfigDocument::default()
        }
        .build(None)
        .unwrap()
    }

    fn constant_power_stream(watts: f64, seconds: usize) -> Stream {
        Stream {
            time: (0..seconds).map(|i| i as f64).collect(),
            moving: vec![true; seconds],
            watts: Some(vec![watts; seconds]),
            ..Stream::default()
        }
    }

    #[test]
    fn test_hour_at_ftp_scores_100_tss() {
        let config = config_with_ftp(285.0);
        let stream = constant_power_stream(285.0, 3600);
        let metrics = PowerCalculator::new(&config).calculate(&stream);

        let tss = metrics["training_stress_score"].as_f64().unwrap();
        let intensity = metrics["intensity_factor"].as_f64().unwrap();
        assert!((tss - 100.0).abs() < 5.0, "tss = {}", tss);
        assert!((intensity - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_np_equals_average_for_constant_power() {
        let config = config_with_ftp(285.0);
        let stream = constant_power_stream(250.0, 600);
        let metrics = PowerCalculator::new(&config).calculate(&stream);

        let avg = metrics["average_power"].as_f64().unwrap();
        let np = metrics["normalized_power"].as_f64().unwrap();
        assert!((np - avg).abs() / avg < 0.001);
    }

    #[test]
    fn test_np_at_least_average_for_variable_power() {
        let config = config_with_ftp(285.0);
        let n = 1200;
        let watts: Vec<f64> = (0..n)
            .map(|i| if (i / 60) % 2 == 0 { 320.0 } else { 160.0 })
            .collect();
        let stream = Stream {
            time: (0..n).map(|i| i as f64).collect(),
            moving: vec![true; n],
            watts: Some(watts),
            ..Stream::default()
        };
        let metrics = PowerCalculator::new(&config).calculate(&stream);

        let avg = metrics["average_power"].as_f64().unwrap();
        let np = metrics["normalized_power"].as_f64().unwrap();
        assert!(np >= avg);
    }

    #[test]
    fn test_too_few_active_samples_yields_zero_np() {
        let stream = constant_power_stream(300.0, 20);
        assert_eq!(normalized_power(&stream), 0.0);
    }

    #[test]
    fn test_no_power_column_yields_defaults() {
        let config = config_with_ftp(285.0);
        let stream = Stream {
            time: vec![0.0, 1.0, 2.0],
            moving: vec![true; 3],
            ..Stream::default()
        };
        let metrics = PowerCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["average_power"].as_f64(), Some(0.0));
        assert_eq!(metrics["training_stress_score"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_time_weighted_average_over_gap() {
        let config = config_with_ftp(285.0);
        // 10 min at 300 W then 50 min at 150 W, contiguous 1 Hz
        let mut watts = vec![300.0; 600];
        watts.extend(vec![150.0; 3000]);
        let stream = Stream {
            time: (0..3600).map(|i| i as f64).collect(),
            moving: vec![true; 3600],
            watts: Some(watts),
            ..Stream::default()
        };
        let metrics = PowerCalculator::new(&config).calculate(&stream);
        let avg = metrics["average_power"].as_f64().unwrap();
        assert!((avg - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_power_ignores_zeros() {
        let config = config_with_ftp(285.0);
        let mut stream = constant_power_stream(200.0, 120);
        stream.watts.as_mut().unwrap()[60] = 0.0;
        stream.watts.as_mut().unwrap()[61] = 850.0;
        let metrics = PowerCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["max_power"].as_f64(), Some(850.0));
    }
}
