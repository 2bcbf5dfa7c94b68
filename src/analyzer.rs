//! Per-activity analysis orchestration
//!
//! Splits a processed stream into its raw and moving views and runs the
//! calculator set for the activity type over each, yielding one metric map
//! per view.

use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::metrics::MetricsCalculator;
use crate::models::{Activity, AnalysisResult};
use crate::splitter::StreamSplitter;
use crate::stream::Stream;

pub struct ActivityAnalyzer<'a> {
    config: &'a AnalysisConfig,
    splitter: StreamSplitter,
}

impl<'a> ActivityAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        ActivityAnalyzer {
            config,
            splitter: StreamSplitter::new(),
        }
    }

    /// Analyze one activity
    ///
    /// Unsupported types are rejected before any computation. Both views
    /// compute the MMP keys: the raw view needs the original timeline for
    /// peak finding, the moving view runs on the contiguous grid.
    pub fn analyze(&self, activity: &Activity, stream: &Stream) -> Result<AnalysisResult> {
        if !activity.activity_type.is_supported() {
            return Err(AnalysisError::ActivityType(
                activity.activity_type.to_string(),
            ));
        }

        let split = self.splitter.split(stream);
        let calculator = MetricsCalculator::new(self.config);

        let raw_metrics =
            calculator.compute_view_metrics(&split.raw, activity.activity_type, true);
        let moving_metrics =
            calculator.compute_view_metrics(&split.moving, activity.activity_type, true);

        debug!(
            activity_id = activity.id,
            activity_type = %activity.activity_type,
            raw_metrics = raw_metrics.len(),
            moving_metrics = moving_metrics.len(),
            "analyzed activity"
        );

        Ok(AnalysisResult {
            activity_id: activity.id,
            activity_type: activity.activity_type,
            raw_metrics,
            moving_metrics,
        })
    }
}
