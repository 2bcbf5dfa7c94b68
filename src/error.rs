//! Unified error hierarchy for paceline
//!
//! Mirrors the failure taxonomy of the pipeline: per-activity failures are
//! recoverable and must never escape the orchestrator; pipeline-level
//! failures (I/O, configuration) are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all analysis operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Stream or input data violates declared ranges or misses essentials
    #[error("Validation error: {0}")]
    Validation(String),

    /// A source file is absent or unreadable
    #[error("Data load error: {0}")]
    DataLoad(#[from] DataLoadError),

    /// An operator could not produce a result
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Activity type is not analysed
    #[error("Unsupported activity type: {0}")]
    ActivityType(String),

    /// Unclassified failure inside the analyzer wrapper
    #[error("Processing error: {0}")]
    Processing(String),

    /// Configuration file or values are invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialisation errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Data loading specific errors
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// File not found at the expected path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// File exists but could not be parsed
    #[error("Parse error in {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    /// A required column is missing from an input table
    #[error("Missing column {column} in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// Stream file carries no rows
    #[error("Empty stream for activity {activity_id}")]
    EmptyStream { activity_id: i64 },
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Not enough samples for the requested operator
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Curve fit did not converge
    #[error("Fit did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    /// Parameter outside its physiological bounds
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Whether the failure is scoped to one activity; the pipeline skips the
    /// activity and continues
    pub fn is_per_activity(&self) -> bool {
        matches!(
            self,
            AnalysisError::Validation(_)
                | AnalysisError::ActivityType(_)
                | AnalysisError::Processing(_)
                | AnalysisError::Calculation(_)
                | AnalysisError::DataLoad(DataLoadError::EmptyStream { .. })
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AnalysisError::ActivityType(_) => ErrorSeverity::Info,
            AnalysisError::Validation(_) => ErrorSeverity::Warning,
            AnalysisError::Calculation(_) => ErrorSeverity::Warning,
            AnalysisError::DataLoad(DataLoadError::EmptyStream { .. }) => ErrorSeverity::Warning,
            AnalysisError::Configuration(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal for the whole run
    Critical,
    /// Fatal for the current stage
    Error,
    /// Recoverable, logged and skipped
    Warning,
    /// Expected control flow (e.g. unsupported type)
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
