use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Activity types as they appear in the catalog
///
/// Only rides, virtual rides and runs are analysed; walks are carried in the
/// catalog but skipped by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Ride,
    VirtualRide,
    Run,
    Walk,
}

impl ActivityType {
    /// Parse the catalog string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Ride" => Some(ActivityType::Ride),
            "VirtualRide" => Some(ActivityType::VirtualRide),
            "Run" => Some(ActivityType::Run),
            "Walk" => Some(ActivityType::Walk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Ride => "Ride",
            ActivityType::VirtualRide => "VirtualRide",
            ActivityType::Run => "Run",
            ActivityType::Walk => "Walk",
        }
    }

    /// Whether this type is analysed at all
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            ActivityType::Ride | ActivityType::VirtualRide | ActivityType::Run
        )
    }

    pub fn is_cycling(&self) -> bool {
        matches!(self, ActivityType::Ride | ActivityType::VirtualRide)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ActivityType::Run)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity metadata record, immutable after ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Catalog identifier
    pub id: i64,

    /// Activity name, if the catalog carries one
    pub name: Option<String>,

    /// Activity type
    pub activity_type: ActivityType,

    /// Start timestamp in UTC
    pub start_date: DateTime<Utc>,

    /// Start timestamp in the athlete's local time
    pub start_date_local: NaiveDateTime,

    /// Distance in meters
    pub distance: Option<f64>,

    /// Moving time in seconds
    pub moving_time: Option<f64>,

    /// Elapsed time in seconds
    pub elapsed_time: Option<f64>,

    /// Elevation gain in meters
    pub total_elevation_gain: Option<f64>,

    /// Average speed in m/s
    pub average_speed: Option<f64>,

    /// Max speed in m/s
    pub max_speed: Option<f64>,
}

/// A single calculated metric: numeric, or a small number of string tags
/// (e.g. the TID classification)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

/// Metric name to value map; BTreeMap keeps iteration order stable so
/// serialised outputs are reproducible
pub type MetricMap = BTreeMap<String, MetricValue>;

/// Insert a float metric, keeping call sites short
pub fn insert_metric(map: &mut MetricMap, key: &str, value: f64) {
    map.insert(key.to_string(), MetricValue::Float(value));
}

/// Result of analysing one activity: one metric map per view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub activity_id: i64,
    pub activity_type: ActivityType,
    /// Metrics computed over all samples with original timestamps
    pub raw_metrics: MetricMap,
    /// Metrics computed over moving samples on the re-pitched 1 Hz grid
    pub moving_metrics: MetricMap,
}

/// Per-activity training load state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessState {
    /// Chronic Training Load (42-day time constant)
    pub ctl: f64,

    /// Acute Training Load (7-day time constant)
    pub atl: f64,

    /// Training Stress Balance (CTL - ATL)
    pub tsb: f64,

    /// Acute:Chronic Workload Ratio (ATL / CTL)
    pub acwr: f64,
}

/// Hyperbolic power-duration model parameters
///
/// Fields are NaN when the fit failed or had too few points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpModel {
    /// Critical Power in watts
    pub cp: f64,

    /// W' (finite work capacity above CP) in joules
    pub w_prime: f64,

    /// Coefficient of determination of the fit
    pub r_squared: f64,
}

impl CpModel {
    /// Sentinel model for failed fits
    pub fn nan() -> Self {
        CpModel {
            cp: f64::NAN,
            w_prime: f64::NAN,
            r_squared: f64::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.cp.is_finite() && self.w_prime.is_finite()
    }
}

/// Right-edges of the athlete's current physiological zones
///
/// The unbounded top zone carries no edge, so a 7-zone power layout yields
/// 6 edges and a 5-zone HR layout yields 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEdges {
    pub power: Vec<f64>,
    pub hr: Vec<f64>,
}

/// Training load snapshot at the end of a summary period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoadSummary {
    /// CTL (fitness)
    pub chronic_training_load: f64,

    /// ATL (fatigue)
    pub acute_training_load: f64,

    /// TSB (form)
    pub training_stress_balance: f64,

    /// Acute:Chronic Workload Ratio
    pub acwr: f64,
}

impl TrainingLoadSummary {
    pub fn zero() -> Self {
        TrainingLoadSummary {
            chronic_training_load: 0.0,
            acute_training_load: 0.0,
            training_stress_balance: 0.0,
            acwr: 0.0,
        }
    }

    /// Current training status from TSB and ACWR
    pub fn status(&self) -> &'static str {
        if self.acwr > 1.5 {
            return "High Risk - Reduce Load";
        }
        if self.acwr > 0.0 && self.acwr < 0.8 {
            return "Undertraining";
        }
        if self.training_stress_balance > 10.0 {
            return "Fresh - Ready for Performance";
        }
        if self.training_stress_balance < -30.0 {
            return "High Fatigue - Recovery Needed";
        }
        if self.training_stress_balance <= -5.0 {
            return "Productive Training";
        }
        "Maintenance"
    }
}

/// Longitudinal performance summary over the enriched table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalSummary {
    /// Start of the analysed period
    pub period_start: NaiveDateTime,

    /// End of the analysed period
    pub period_end: NaiveDateTime,

    /// Number of activities in the period
    pub total_activities: usize,

    /// Total distance in meters
    pub total_distance: f64,

    /// Total elevation gain in meters
    pub total_elevation: f64,

    /// Total moving time in seconds
    pub total_time: f64,

    /// Training load snapshot at period end
    pub training_load: TrainingLoadSummary,

    /// Percent changes of 28-day rolling means plus rolling EF averages
    pub performance_trends: BTreeMap<String, f64>,

    /// Mean zone percentages, keyed by zone family then column
    pub zone_distributions: BTreeMap<String, BTreeMap<String, f64>>,
}
