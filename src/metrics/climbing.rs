//! Climbing metrics for cycling activities
//!
//! VAM (vertical ascent rate), time spent climbing, and average power on
//! meaningful gradients.

use crate::config::AnalysisConfig;
use crate::metrics::base::{time_deltas, time_weighted_mean};
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

/// Gradient above which power on climbs is sampled, in percent
const POWER_GRADIENT_THRESHOLD: f64 = 4.0;

pub struct ClimbingCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> ClimbingCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        ClimbingCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let altitude = match stream.altitude() {
            Some(altitude) if !stream.time.is_empty() => altitude,
            _ => return self.empty_metrics(),
        };

        let (vam, climbing_time) = self.vam(altitude, &stream.time);
        insert_metric(&mut metrics, "vam", vam);
        insert_metric(&mut metrics, "climbing_time", climbing_time);

        match (stream.grade(), stream.watts()) {
            (Some(grade), Some(watts)) => {
                let (climbing_power, per_kg) = self.climbing_power(grade, watts, &stream.time);
                insert_metric(&mut metrics, "climbing_power", climbing_power);
                insert_metric(&mut metrics, "climbing_power_per_kg", per_kg);
            }
            _ => {
                insert_metric(&mut metrics, "climbing_power", 0.0);
                insert_metric(&mut metrics, "climbing_power_per_kg", 0.0);
            }
        }

        metrics
    }

    /// VAM = Σ positive altitude gain / climbing time · 3600, in m/h
    fn vam(&self, altitude: &[f64], times: &[f64]) -> (f64, f64) {
        let deltas = time_deltas(times);
        let mut elevation_gain = 0.0;
        let mut climbing_time = 0.0;

        for i in 1..altitude.len() {
            let diff = altitude[i] - altitude[i - 1];
            if diff > 0.0 {
                elevation_gain += diff;
                climbing_time += deltas[i];
            }
        }

        if climbing_time == 0.0 {
            return (0.0, 0.0);
        }
        (elevation_gain / climbing_time * 3600.0, climbing_time)
    }

    /// Time-weighted average power where the gradient exceeds the threshold
    /// and the rider is actually pedalling
    fn climbing_power(&self, grade: &[f64], watts: &[f64], times: &[f64]) -> (f64, f64) {
        let mut climb_watts = Vec::new();
        let mut climb_times = Vec::new();
        for i in 0..watts.len() {
            if grade[i] > POWER_GRADIENT_THRESHOLD && watts[i] > 0.0 {
                climb_watts.push(watts[i]);
                climb_times.push(times[i]);
            }
        }
        if climb_watts.is_empty() {
            return (0.0, 0.0);
        }

        let avg = time_weighted_mean(&climb_watts, &climb_times);
        (avg, avg / self.config.rider_weight_kg)
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in [
            "vam",
            "climbing_time",
            "climbing_power",
            "climbing_power_per_kg",
        ] {
            insert_metric(&mut metrics, key, 0.0);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vam_steady_climb() {
        let config = AnalysisConfig::default();
        // 1 m gained per second over 600 s -> 3600 m/h
        let n = 600;
        let stream = Stream {
            time: (0..n).map(|i| i as f64).collect(),
            moving: vec![true; n],
            altitude: Some((0..n).map(|i| i as f64).collect()),
            ..Stream::default()
        };
        let metrics = ClimbingCalculator::new(&config).calculate(&stream);

        let vam = metrics["vam"].as_f64().unwrap();
        assert!((vam - 3600.0).abs() < 1e-6, "vam = {}", vam);
        assert_eq!(metrics["climbing_time"].as_f64(), Some(599.0));
    }

    #[test]
    fn test_flat_ride_has_no_climbing() {
        let config = AnalysisConfig::default();
        let stream = Stream {
            time: vec![0.0, 1.0, 2.0, 3.0],
            moving: vec![true; 4],
            altitude: Some(vec![400.0; 4]),
            ..Stream::default()
        };
        let metrics = ClimbingCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["vam"].as_f64(), Some(0.0));
        assert_eq!(metrics["climbing_time"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_climbing_power_on_steep_sections() {
        let config = AnalysisConfig::default();
        let n = 100;
        let grade: Vec<f64> = (0..n).map(|i| if i < 50 { 6.0 } else { 1.0 }).collect();
        let watts: Vec<f64> = (0..n).map(|i| if i < 50 { 300.0 } else { 150.0 }).collect();
        let stream = Stream {
            time: (0..n).map(|i| i as f64).collect(),
            moving: vec![true; n],
            altitude: Some((0..n).map(|i| i as f64 * 0.1).collect()),
            grade: Some(grade),
            watts: Some(watts),
            ..Stream::default()
        };
        let metrics = ClimbingCalculator::new(&config).calculate(&stream);

        assert_eq!(metrics["climbing_power"].as_f64(), Some(300.0));
        let per_kg = metrics["climbing_power_per_kg"].as_f64().unwrap();
        assert!((per_kg - 300.0 / 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_altitude_column() {
        let config = AnalysisConfig::default();
        let stream = Stream {
            time: vec![0.0, 1.0],
            moving: vec![true; 2],
            ..Stream::default()
        };
        let metrics = ClimbingCalculator::new(&config).calculate(&stream);
        assert_eq!(metrics["vam"].as_f64(), Some(0.0));
    }
}
