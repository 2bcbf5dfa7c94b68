//! Application configuration
//!
//! Configuration is loaded from a YAML document with environment-variable
//! overrides under the `PACELINE_` prefix. Precedence, highest first:
//! YAML document, environment, built-in defaults. The built value is
//! immutable and threaded through constructors; derived zone layouts are
//! computed once at build time.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};

/// Default MMP durations in seconds (1 s to 1 h)
pub const DEFAULT_POWER_CURVE_INTERVALS: [u32; 15] = [
    1, 2, 5, 10, 15, 20, 30, 60, 120, 300, 600, 900, 1200, 1800, 3600,
];

/// Grade-based pace adjustment parameters for NGP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeAdjustment {
    /// Adjustment factor applied per unit of positive grade
    pub uphill_factor: f64,

    /// Adjustment factor applied per unit of negative grade
    pub downhill_factor: f64,

    /// Window in seconds for grade smoothing
    pub smoothing_window: u32,
}

impl Default for GradeAdjustment {
    fn default() -> Self {
        GradeAdjustment {
            uphill_factor: 0.5,
            downhill_factor: 0.3,
            smoothing_window: 30,
        }
    }
}

/// Immutable analysis configuration, built once per run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Functional Threshold Power in watts
    pub ftp: f64,

    /// Functional Threshold Heart Rate in bpm
    pub fthr: f64,

    /// First/second lactate turn point power; both present enables the
    /// LT-based 7-zone power layout
    pub lt1_power: Option<f64>,
    pub lt2_power: Option<f64>,

    /// First/second lactate turn point heart rate; both present enables the
    /// LT-based 5-zone HR layout
    pub lt1_hr: Option<f64>,
    pub lt2_hr: Option<f64>,

    /// Critical Power in watts; enables W' balance metrics together with
    /// `w_prime`
    pub cp: Option<f64>,

    /// W' in joules
    pub w_prime: Option<f64>,

    /// Rider weight in kilograms
    pub rider_weight_kg: f64,

    /// Durations (seconds) at which MMP is extracted
    pub power_curve_intervals: Vec<u32>,

    /// Rolling window in days for the per-activity CP/W' fit
    pub cp_window_days: i64,

    /// ATL time constant in days
    pub atl_days: f64,

    /// CTL time constant in days
    pub ctl_days: f64,

    /// Lookback window in days for the historical threshold table
    pub ftp_rolling_window_days: i64,

    /// NGP parameters
    pub grade_adjustment: GradeAdjustment,

    /// Base data directory
    pub data_dir: PathBuf,

    /// Activities catalog CSV
    pub activities_file: PathBuf,

    /// Directory holding `stream_<id>.csv` files
    pub streams_dir: PathBuf,

    /// Output directory for enriched tables and the summary
    pub processed_data_dir: PathBuf,

    /// Timestamp the current thresholds were configured at; anchors
    /// zone-edge backpropagation
    pub configured_at: NaiveDateTime,

    /// Derived power zones as half-open [lo, hi) intervals, last unbounded
    pub power_zones: Vec<(f64, f64)>,

    /// Derived heart rate zones as half-open [lo, hi) intervals
    pub hr_zones: Vec<(f64, f64)>,
}

impl AnalysisConfig {
    /// Right edges of the power zones, excluding the unbounded top
    pub fn power_zone_edges(&self) -> Vec<f64> {
        self.power_zones
            .iter()
            .map(|(_, hi)| *hi)
            .filter(|hi| hi.is_finite())
            .collect()
    }

    /// Right edges of the HR zones, excluding the unbounded top
    pub fn hr_zone_edges(&self) -> Vec<f64> {
        self.hr_zones
            .iter()
            .map(|(_, hi)| *hi)
            .filter(|hi| hi.is_finite())
            .collect()
    }

    pub fn raw_table_path(&self) -> PathBuf {
        self.processed_data_dir.join("activities_raw.csv")
    }

    pub fn moving_table_path(&self) -> PathBuf {
        self.processed_data_dir.join("activities_moving.csv")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.processed_data_dir.join("activity_summary.json")
    }

    pub fn thresholds_path(&self) -> PathBuf {
        self.processed_data_dir.join("historical_thresholds.csv")
    }

    pub fn stream_path(&self, activity_id: i64) -> PathBuf {
        self.streams_dir.join(format!("stream_{}.csv", activity_id))
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        ConfigDocument::default()
            .build(None)
            .expect("default configuration is valid")
    }
}

/// Raw configuration document as read from YAML or the environment
///
/// Every field is optional so that layered sources can be merged before
/// validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    pub ftp: Option<f64>,
    pub fthr: Option<f64>,
    pub lt1_power: Option<f64>,
    pub lt2_power: Option<f64>,
    pub lt1_hr: Option<f64>,
    pub lt2_hr: Option<f64>,
    pub cp: Option<f64>,
    pub w_prime: Option<f64>,
    pub rider_weight_kg: Option<f64>,
    pub power_curve_intervals: Option<Vec<u32>>,
    pub cp_window_days: Option<i64>,
    pub atl_days: Option<f64>,
    pub ctl_days: Option<f64>,
    pub ftp_rolling_window_days: Option<i64>,
    pub grade_adjustment: Option<GradeAdjustment>,
    pub data_dir: Option<PathBuf>,
    pub activities_file: Option<PathBuf>,
    pub streams_dir: Option<PathBuf>,
    pub processed_data_dir: Option<PathBuf>,
    pub configured_at: Option<NaiveDateTime>,
}

impl ConfigDocument {
    /// Overlay `other` on top of `self`: set fields in `other` win
    pub fn merge(mut self, other: ConfigDocument) -> ConfigDocument {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            ftp,
            fthr,
            lt1_power,
            lt2_power,
            lt1_hr,
            lt2_hr,
            cp,
            w_prime,
            rider_weight_kg,
            power_curve_intervals,
            cp_window_days,
            atl_days,
            ctl_days,
            ftp_rolling_window_days,
            grade_adjustment,
            data_dir,
            activities_file,
            streams_dir,
            processed_data_dir,
            configured_at,
        );
        self
    }

    /// Read overrides from `PACELINE_*` environment variables
    pub fn from_env() -> ConfigDocument {
        fn env_f64(key: &str) -> Option<f64> {
            env::var(key).ok().and_then(|v| v.parse().ok())
        }
        fn env_i64(key: &str) -> Option<i64> {
            env::var(key).ok().and_then(|v| v.parse().ok())
        }
        fn env_path(key: &str) -> Option<PathBuf> {
            env::var(key).ok().map(PathBuf::from)
        }

        ConfigDocument {
            ftp: env_f64("PACELINE_FTP"),
            fthr: env_f64("PACELINE_FTHR"),
            lt1_power: env_f64("PACELINE_LT1_POWER"),
            lt2_power: env_f64("PACELINE_LT2_POWER"),
            lt1_hr: env_f64("PACELINE_LT1_HR"),
            lt2_hr: env_f64("PACELINE_LT2_HR"),
            cp: env_f64("PACELINE_CP"),
            w_prime: env_f64("PACELINE_W_PRIME"),
            rider_weight_kg: env_f64("PACELINE_RIDER_WEIGHT_KG"),
            cp_window_days: env_i64("PACELINE_CP_WINDOW_DAYS"),
            atl_days: env_f64("PACELINE_ATL_DAYS"),
            ctl_days: env_f64("PACELINE_CTL_DAYS"),
            ftp_rolling_window_days: env_i64("PACELINE_FTP_ROLLING_WINDOW_DAYS"),
            data_dir: env_path("PACELINE_DATA_DIR"),
            activities_file: env_path("PACELINE_ACTIVITIES_FILE"),
            streams_dir: env_path("PACELINE_STREAMS_DIR"),
            processed_data_dir: env_path("PACELINE_PROCESSED_DATA_DIR"),
            ..ConfigDocument::default()
        }
    }

    /// Validate and build the immutable configuration
    ///
    /// `base_dir` anchors relative paths (the config file's parent when
    /// loading from disk).
    pub fn build(self, base_dir: Option<&Path>) -> Result<AnalysisConfig> {
        let ftp = self.ftp.unwrap_or(285.0);
        let fthr = self.fthr.unwrap_or(170.0);

        if ftp < 0.0 || !ftp.is_finite() {
            return Err(AnalysisError::Configuration(format!(
                "ftp must be a non-negative number, got {}",
                ftp
            )));
        }
        if fthr < 0.0 || !fthr.is_finite() {
            return Err(AnalysisError::Configuration(format!(
                "fthr must be a non-negative number, got {}",
                fthr
            )));
        }

        let rider_weight_kg = self.rider_weight_kg.unwrap_or(77.0);
        if rider_weight_kg <= 0.0 {
            return Err(AnalysisError::Configuration(
                "rider_weight_kg must be positive".to_string(),
            ));
        }

        let grade_adjustment = self.grade_adjustment.unwrap_or_default();
        if grade_adjustment.uphill_factor < 0.0 || grade_adjustment.uphill_factor > 2.0 {
            return Err(AnalysisError::Configuration(
                "grade_adjustment.uphill_factor must be between 0 and 2".to_string(),
            ));
        }

        let mut power_curve_intervals = self
            .power_curve_intervals
            .unwrap_or_else(|| DEFAULT_POWER_CURVE_INTERVALS.to_vec());
        power_curve_intervals.retain(|d| *d > 0 && *d <= 6 * 3600);
        power_curve_intervals.sort_unstable();
        power_curve_intervals.dedup();
        if power_curve_intervals.is_empty() {
            return Err(AnalysisError::Configuration(
                "power_curve_intervals must contain at least one duration".to_string(),
            ));
        }

        let data_dir = resolve_path(self.data_dir.unwrap_or_else(|| PathBuf::from("data")), base_dir);
        let activities_file = resolve_path(
            self.activities_file
                .unwrap_or_else(|| PathBuf::from("activities.csv")),
            Some(&data_dir),
        );
        let streams_dir = resolve_path(
            self.streams_dir.unwrap_or_else(|| PathBuf::from("Streams")),
            Some(&data_dir),
        );
        let processed_data_dir = resolve_path(
            self.processed_data_dir
                .unwrap_or_else(|| PathBuf::from("processed_data")),
            base_dir,
        );

        let configured_at = self
            .configured_at
            .unwrap_or_else(|| Utc::now().naive_utc());

        let power_zones = derive_power_zones(ftp, self.lt1_power, self.lt2_power);
        let hr_zones = derive_hr_zones(fthr, self.lt1_hr, self.lt2_hr);

        Ok(AnalysisConfig {
            ftp,
            fthr,
            lt1_power: self.lt1_power,
            lt2_power: self.lt2_power,
            lt1_hr: self.lt1_hr,
            lt2_hr: self.lt2_hr,
            cp: self.cp,
            w_prime: self.w_prime,
            rider_weight_kg,
            power_curve_intervals,
            cp_window_days: self.cp_window_days.unwrap_or(90),
            atl_days: self.atl_days.unwrap_or(7.0),
            ctl_days: self.ctl_days.unwrap_or(42.0),
            ftp_rolling_window_days: self.ftp_rolling_window_days.unwrap_or(42),
            grade_adjustment,
            data_dir,
            activities_file,
            streams_dir,
            processed_data_dir,
            configured_at,
            power_zones,
            hr_zones,
        })
    }
}

/// Load configuration: defaults, then environment, then the YAML document
pub fn load_config(config_file: Option<&Path>) -> Result<AnalysisConfig> {
    let mut doc = ConfigDocument::default().merge(ConfigDocument::from_env());
    let mut base_dir = None;
    let mut file_mtime = None;

    if let Some(path) = config_file {
        let text = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let from_yaml: ConfigDocument = serde_yaml::from_str(&text).map_err(|e| {
            AnalysisError::Configuration(format!("invalid YAML in {}: {}", path.display(), e))
        })?;
        doc = doc.merge(from_yaml);
        base_dir = path.parent().map(Path::to_path_buf);

        file_mtime = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Utc>::from(t).naive_utc());
    }

    if doc.configured_at.is_none() {
        doc.configured_at = file_mtime;
    }

    doc.build(base_dir.as_deref())
}

/// Expand `~` and join relative paths against `base`
fn resolve_path(path: PathBuf, base: Option<&Path>) -> PathBuf {
    let expanded = if let Ok(stripped) = path.strip_prefix("~") {
        match dirs::home_dir() {
            Some(home) => home.join(stripped),
            None => path.clone(),
        }
    } else {
        path
    };

    if expanded.is_absolute() {
        expanded
    } else {
        match base {
            Some(base) => base.join(expanded),
            None => expanded,
        }
    }
}

/// Build power zones: LT-based 7-zone layout when both turn points are
/// configured, percentage-of-FTP layout otherwise
fn derive_power_zones(ftp: f64, lt1: Option<f64>, lt2: Option<f64>) -> Vec<(f64, f64)> {
    let edges: Vec<f64> = match (lt1, lt2) {
        (Some(lt1), Some(lt2)) if lt1 > 0.0 && lt2 > lt1 => vec![
            0.80 * lt1,
            lt1,
            (lt1 + lt2) / 2.0,
            lt2,
            1.10 * lt2,
            1.30 * lt2,
        ],
        _ => [0.55, 0.75, 0.90, 1.05, 1.20, 1.50]
            .iter()
            .map(|pct| pct * ftp)
            .collect(),
    };
    zones_from_edges(&edges)
}

/// Build HR zones: LT-based 5-zone layout when both turn points are
/// configured, percentage-of-FTHR layout otherwise. Zone 1 tops out at
/// 85% of FTHR in the percentage layout.
fn derive_hr_zones(fthr: f64, lt1: Option<f64>, lt2: Option<f64>) -> Vec<(f64, f64)> {
    let edges: Vec<f64> = match (lt1, lt2) {
        (Some(lt1), Some(lt2)) if lt1 > 0.0 && lt2 > lt1 => {
            vec![0.90 * lt1, lt1, lt2, 1.05 * lt2]
        }
        _ => [0.85, 0.95, 1.05, 1.20].iter().map(|pct| pct * fthr).collect(),
    };
    zones_from_edges(&edges)
}

/// Turn sorted right edges into half-open [lo, hi) intervals with an
/// unbounded top zone
fn zones_from_edges(edges: &[f64]) -> Vec<(f64, f64)> {
    let mut zones = Vec::with_capacity(edges.len() + 1);
    let mut lo = 0.0;
    for hi in edges {
        zones.push((lo, *hi));
        lo = *hi;
    }
    zones.push((lo, f64::INFINITY));
    zones
}
