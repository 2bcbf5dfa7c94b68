//! Efficiency and decoupling metrics
//!
//! Efficiency Factor (NP / average HR), power:HR decoupling between
//! activity halves, and the Variability Index (NP / average power).

use crate::config::AnalysisConfig;
use crate::metrics::base::time_weighted_mean;
use crate::metrics::power::normalized_power;
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

/// Minimum total samples for a meaningful half-split
const MIN_DECOUPLING_SAMPLES: usize = 60;

pub struct EfficiencyCalculator<'a> {
    #[allow(dead_code)]
    config: &'a AnalysisConfig,
}

impl<'a> EfficiencyCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        EfficiencyCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        if stream.watts().is_none() || stream.heartrate().is_none() {
            return self.empty_metrics();
        }

        let mut metrics = MetricMap::new();

        insert_metric(&mut metrics, "efficiency_factor", efficiency_factor(stream));

        let (decoupling, first_half_ef, second_half_ef) = self.decoupling(stream);
        insert_metric(&mut metrics, "power_hr_decoupling", decoupling);
        insert_metric(&mut metrics, "first_half_ef", first_half_ef);
        insert_metric(&mut metrics, "second_half_ef", second_half_ef);

        insert_metric(&mut metrics, "variability_index", self.variability_index(stream));

        metrics
    }

    /// Decoupling between halves: (EF₂ − EF₁) / EF₁ · 100
    fn decoupling(&self, stream: &Stream) -> (f64, f64, f64) {
        if stream.len() < MIN_DECOUPLING_SAMPLES {
            return (0.0, 0.0, 0.0);
        }

        let (first, second) = stream.halves();
        if first.is_empty() || second.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let first_ef = efficiency_factor(&first);
        let second_ef = efficiency_factor(&second);

        let decoupling = if first_ef > 0.0 {
            (second_ef - first_ef) / first_ef * 100.0
        } else {
            0.0
        };
        (decoupling, first_ef, second_ef)
    }

    /// Variability Index: NP / time-weighted average power
    fn variability_index(&self, stream: &Stream) -> f64 {
        let watts = match stream.watts() {
            Some(watts) if watts.iter().any(|w| *w > 0.0) => watts,
            _ => return 0.0,
        };

        let np = normalized_power(stream);
        let average_power = time_weighted_mean(watts, &stream.time);
        if np > 0.0 && average_power > 0.0 {
            let vi = np / average_power;
            if vi.is_finite() {
                return vi;
            }
        }
        0.0
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in [
            "efficiency_factor",
            "power_hr_decoupling",
            "first_half_ef",
            "second_half_ef",
            "variability_index",
        ] {
            insert_metric(&mut metrics, key, 0.0);
        }
        metrics
    }
}

/// Efficiency Factor for a view: NP / time-weighted average HR
fn efficiency_factor(stream: &Stream) -> f64 {
    let heartrate = match stream.heartrate() {
        Some(hr) => hr,
        None => return 0.0,
    };

    let np = normalized_power(stream);
    let average_hr = time_weighted_mean(heartrate, &stream.time);

    if np > 0.0 && average_hr > 0.0 {
        let ef = np / average_hr;
        if ef.is_finite() {
            return ef;
        }
    }
    0.0
}
