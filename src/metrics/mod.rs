//! Metric calculators
//!
//! Each calculator is a pure function of (view, config) returning a metric
//! map; failures inside a calculator degrade to sentinel values, never into
//! the orchestrator. The set of calculators that runs is a fixed decision
//! table over the activity type.

pub mod advanced_power;
pub mod base;
pub mod basic;
pub mod climbing;
pub mod efficiency;
pub mod fatigue;
pub mod heartrate;
pub mod pace;
pub mod power;
pub mod power_curve;
pub mod tid;
pub mod zones;

use crate::config::AnalysisConfig;
use crate::models::{ActivityType, MetricMap};
use crate::stream::Stream;

use advanced_power::AdvancedPowerCalculator;
use basic::BasicCalculator;
use climbing::ClimbingCalculator;
use efficiency::EfficiencyCalculator;
use fatigue::FatigueCalculator;
use heartrate::HeartRateCalculator;
use pace::PaceCalculator;
use power::PowerCalculator;
use tid::TidCalculator;
use zones::ZoneCalculator;

/// The calculator families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorKind {
    Power,
    HeartRate,
    Efficiency,
    Pace,
    Climbing,
    AdvancedPower,
    Zones,
    Tid,
    Fatigue,
    Basic,
    PowerCurve,
}

/// Decision table: which calculators run for an activity type
pub fn calculators_for(activity_type: ActivityType) -> &'static [CalculatorKind] {
    use CalculatorKind::*;
    match activity_type {
        ActivityType::Ride | ActivityType::VirtualRide => &[
            Power,
            HeartRate,
            Efficiency,
            Climbing,
            AdvancedPower,
            Zones,
            Tid,
            Fatigue,
            Basic,
            PowerCurve,
        ],
        ActivityType::Run => &[HeartRate, Efficiency, Pace, Zones, Tid, Basic],
        ActivityType::Walk => &[],
    }
}

/// Runs the calculator set selected for an activity type over one view
pub struct MetricsCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> MetricsCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        MetricsCalculator { config }
    }

    /// Compute all metrics for one view of a stream
    ///
    /// `include_power_curve` gates the MMP keys; both views compute them,
    /// the raw view on the original timeline and the moving view on the
    /// contiguous grid.
    pub fn compute_view_metrics(
        &self,
        stream: &Stream,
        activity_type: ActivityType,
        include_power_curve: bool,
    ) -> MetricMap {
        let mut all_metrics = MetricMap::new();
        let is_running = activity_type.is_running();

        for kind in calculators_for(activity_type) {
            let metrics = match kind {
                CalculatorKind::Power => PowerCalculator::new(self.config).calculate(stream),
                CalculatorKind::HeartRate => {
                    HeartRateCalculator::new(self.config).calculate(stream)
                }
                CalculatorKind::Efficiency => {
                    EfficiencyCalculator::new(self.config).calculate(stream)
                }
                CalculatorKind::Pace => PaceCalculator::new(self.config).calculate(stream),
                CalculatorKind::Climbing => ClimbingCalculator::new(self.config).calculate(stream),
                CalculatorKind::AdvancedPower => {
                    AdvancedPowerCalculator::new(self.config).calculate(stream)
                }
                CalculatorKind::Zones => ZoneCalculator::new(self.config).calculate(stream),
                CalculatorKind::Tid => TidCalculator::new(self.config).calculate(stream),
                CalculatorKind::Fatigue => FatigueCalculator::new(self.config).calculate(stream),
                CalculatorKind::Basic => {
                    BasicCalculator::new(self.config).calculate(stream, !is_running)
                }
                CalculatorKind::PowerCurve => {
                    if include_power_curve {
                        power_curve::mmp_metrics(stream, &self.config.power_curve_intervals)
                    } else {
                        MetricMap::new()
                    }
                }
            };
            all_metrics.extend(metrics);
        }

        all_metrics
    }
}
