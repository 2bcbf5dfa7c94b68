//! Heart rate metric calculations
//!
//! Average/max heart rate and the heart-rate-based training stress score
//! (hrTSS), which quadratically weights intensity relative to FTHR.

use crate::config::AnalysisConfig;
use crate::metrics::base::{time_weighted_mean, total_duration};
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

const SECONDS_PER_HOUR: f64 = 3600.0;

pub struct HeartRateCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> HeartRateCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        HeartRateCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let heartrate = match stream.heartrate() {
            Some(hr) if !hr.is_empty() => hr,
            _ => return self.empty_metrics(),
        };
        if heartrate.iter().all(|hr| *hr <= 0.0) {
            return self.empty_metrics();
        }

        let average_hr = time_weighted_mean(heartrate, &stream.time);
        insert_metric(&mut metrics, "average_hr", average_hr);

        let max_hr = heartrate
            .iter()
            .copied()
            .filter(|hr| *hr > 0.0)
            .fold(0.0, f64::max);
        insert_metric(&mut metrics, "max_hr", max_hr);

        if self.config.fthr > 0.0 {
            let hr_intensity = average_hr / self.config.fthr;
            let duration_s = total_duration(&stream.time);
            let hr_tss = hr_intensity * hr_intensity * duration_s / SECONDS_PER_HOUR * 100.0;
            insert_metric(&mut metrics, "hr_training_stress", hr_tss);
        } else {
            insert_metric(&mut metrics, "hr_training_stress", 0.0);
        }

        metrics
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in ["average_hr", "max_hr", "hr_training_stress"] {
            insert_metric(&mut metrics, key, 0.0);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;

    fn config_with_fthr(fthr: f64) -> AnalysisConfig {
        ConfigDocument {
            fthr: Some(fthr),
            ..ConfigDocument::default()
        }
        .build(None)
        .unwrap()
    }

    #[test]
    fn test_hour_at_fthr_scores_100() {
        let config = config_with_fthr(170.0);
        let stream = Stream {
            time: (0..3600).map(|i| i as f64).collect(),
            moving: vec![true; 3600],
            heartrate: Some(vec![170.0; 3600]),
            ..Stream::default()
        };
        let metrics = HeartRateCalculator::new(&config).calculate(&stream);
        let hr_tss = metrics["hr_training_stress"].as_f64().unwrap();
        assert!((hr_tss - 100.0).abs() < 1.0, "hr_tss = {}", hr_tss);
    }

    #[test]
    fn test_average_and_max() {
        let config = config_with_fthr(170.0);
        let stream = Stream {
            time: vec![0.0, 1.0, 2.0, 3.0],
            moving: vec![true; 4],
            heartrate: Some(vec![120.0, 140.0, 160.0, 180.0]),
            ..Stream::default()
        };
        let metrics = HeartRateCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["average_hr"].as_f64(), Some(150.0));
        assert_eq!(metrics["max_hr"].as_f64(), Some(180.0));
    }

    #[test]
    fn test_no_heartrate_column() {
        let config = config_with_fthr(170.0);
        let stream = Stream {
            time: vec![0.0, 1.0],
            moving: vec![true; 2],
            ..Stream::default()
        };
        let metrics = HeartRateCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["average_hr"].as_f64(), Some(0.0));
        assert_eq!(metrics["hr_training_stress"].as_f64(), Some(0.0));
    }
}
