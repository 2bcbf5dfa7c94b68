//! Pace metrics for running activities
//!
//! Average/max speed over the positive velocity samples and Normalized
//! Graded Pace, which scales velocity by a grade-dependent factor.

use crate::config::AnalysisConfig;
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

pub struct PaceCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> PaceCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        PaceCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let velocity = match stream.velocity() {
            Some(v) => v,
            None => return self.empty_metrics(),
        };

        let valid: Vec<f64> = velocity.iter().copied().filter(|v| *v > 0.0).collect();
        if valid.is_empty() {
            return self.empty_metrics();
        }

        let average_speed = valid.iter().sum::<f64>() / valid.len() as f64;
        insert_metric(&mut metrics, "average_speed", average_speed);
        insert_metric(
            &mut metrics,
            "max_speed",
            valid.iter().copied().fold(0.0, f64::max),
        );

        match stream.grade() {
            Some(grade) => {
                insert_metric(
                    &mut metrics,
                    "normalized_graded_pace",
                    self.normalized_graded_pace(velocity, grade),
                );
            }
            None => {
                insert_metric(&mut metrics, "normalized_graded_pace", 0.0);
            }
        }

        metrics
    }

    /// NGP: mean of velocity scaled by (1 + grade · uphill_factor)
    fn normalized_graded_pace(&self, velocity: &[f64], grade: &[f64]) -> f64 {
        if velocity.is_empty() {
            return 0.0;
        }
        let uphill = self.config.grade_adjustment.uphill_factor;
        let sum: f64 = velocity
            .iter()
            .zip(grade)
            .map(|(v, g)| v * (1.0 + g * uphill))
            .sum();
        sum / velocity.len() as f64
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in ["average_speed", "max_speed", "normalized_graded_pace"] {
            insert_metric(&mut metrics, key, 0.0);
        }
        metrics
    }
}
