// Library interface for the paceline analytics engine
// Exposes the analysis kernel to the CLI and to integration tests

pub mod analyzer;
pub mod config;
pub mod error;
pub mod fitness;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod repository;
pub mod splitter;
pub mod stream;
pub mod summarizer;
pub mod table;
pub mod thresholds;
pub mod zone_edges;

// Re-export commonly used types for convenience
pub use analyzer::ActivityAnalyzer;
pub use config::{load_config, AnalysisConfig, ConfigDocument, GradeAdjustment};
pub use error::{AnalysisError, CalculationError, DataLoadError, Result};
pub use fitness::{FitnessInput, FitnessModel};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use models::{
    Activity, ActivityType, AnalysisResult, CpModel, FitnessState, LongitudinalSummary,
    MetricMap, MetricValue, TrainingLoadSummary, ZoneEdges,
};
pub use pipeline::{AnalysisPipeline, PipelineOutcome};
pub use processor::{RawStream, StreamProcessor};
pub use repository::ActivityRepository;
pub use splitter::{SplitResult, StreamSplitter};
pub use stream::Stream;
pub use summarizer::Summarizer;
pub use table::{ActivityTable, EnrichedActivity};
pub use thresholds::{ThresholdRecord, ThresholdResolver};
pub use zone_edges::ZoneEdgeStamper;
