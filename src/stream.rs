//! Columnar activity stream
//!
//! A stream is a time-aligned table keyed by ordinal position, one row per
//! recorded sample (nominally 1 Hz but irregular). Stopped intervals are
//! encoded as inter-sample gaps on the `time` axis, so the vectors stay
//! dense. All calculators depend on this narrow surface rather than a
//! general-purpose frame.

use std::ops::Range;

/// Inter-sample gap above which the recording is considered paused.
/// Normal 1 Hz sampling jitters below this; auto-pause gaps land above it.
pub const GAP_THRESHOLD_SECONDS: f64 = 2.0;

/// One activity's sensor streams as parallel columns
///
/// `time` and `moving` are always present after processing; every other
/// column is optional. All columns have identical length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    /// Seconds since activity start, strictly sorted after processing
    pub time: Vec<f64>,

    /// False on the sample immediately after a recording gap
    pub moving: Vec<bool>,

    /// Instantaneous power in watts
    pub watts: Option<Vec<f64>>,

    /// Instantaneous heart rate in bpm
    pub heartrate: Option<Vec<f64>>,

    /// Cadence in rpm (cycling) or spm (running)
    pub cadence: Option<Vec<f64>>,

    /// Smoothed velocity in m/s
    pub velocity: Option<Vec<f64>>,

    /// Smoothed grade in percent
    pub grade: Option<Vec<f64>>,

    /// Altitude in meters
    pub altitude: Option<Vec<f64>>,

    /// Cumulative distance in meters
    pub distance: Option<Vec<f64>>,

    /// WGS84 latitude in degrees
    pub lat: Option<Vec<f64>>,

    /// WGS84 longitude in degrees
    pub lng: Option<Vec<f64>>,

    /// Original timestamps, retained on the moving view after re-pitching
    pub original_time: Option<Vec<f64>>,
}

impl Stream {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn watts(&self) -> Option<&[f64]> {
        self.watts.as_deref()
    }

    pub fn heartrate(&self) -> Option<&[f64]> {
        self.heartrate.as_deref()
    }

    pub fn cadence(&self) -> Option<&[f64]> {
        self.cadence.as_deref()
    }

    pub fn velocity(&self) -> Option<&[f64]> {
        self.velocity.as_deref()
    }

    pub fn grade(&self) -> Option<&[f64]> {
        self.grade.as_deref()
    }

    pub fn altitude(&self) -> Option<&[f64]> {
        self.altitude.as_deref()
    }

    pub fn distance(&self) -> Option<&[f64]> {
        self.distance.as_deref()
    }

    /// Copy a contiguous range of samples into a new stream
    ///
    /// Used for half-splits and interval windows; column presence is
    /// preserved.
    pub fn slice(&self, range: Range<usize>) -> Stream {
        fn cut(col: &Option<Vec<f64>>, range: &Range<usize>) -> Option<Vec<f64>> {
            col.as_ref().map(|v| v[range.clone()].to_vec())
        }

        Stream {
            time: self.time[range.clone()].to_vec(),
            moving: self.moving[range.clone()].to_vec(),
            watts: cut(&self.watts, &range),
            heartrate: cut(&self.heartrate, &range),
            cadence: cut(&self.cadence, &range),
            velocity: cut(&self.velocity, &range),
            grade: cut(&self.grade, &range),
            altitude: cut(&self.altitude, &range),
            distance: cut(&self.distance, &range),
            lat: cut(&self.lat, &range),
            lng: cut(&self.lng, &range),
            original_time: cut(&self.original_time, &range),
        }
    }

    /// Copy the samples selected by `mask` into a new stream
    pub fn filter(&self, mask: &[bool]) -> Stream {
        debug_assert_eq!(mask.len(), self.len());

        fn pick(col: &Option<Vec<f64>>, mask: &[bool]) -> Option<Vec<f64>> {
            col.as_ref().map(|v| {
                v.iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(x, _)| *x)
                    .collect()
            })
        }

        Stream {
            time: self
                .time
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(t, _)| *t)
                .collect(),
            moving: self
                .moving
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(m, _)| *m)
                .collect(),
            watts: pick(&self.watts, mask),
            heartrate: pick(&self.heartrate, mask),
            cadence: pick(&self.cadence, mask),
            velocity: pick(&self.velocity, mask),
            grade: pick(&self.grade, mask),
            altitude: pick(&self.altitude, mask),
            distance: pick(&self.distance, mask),
            lat: pick(&self.lat, mask),
            lng: pick(&self.lng, mask),
            original_time: pick(&self.original_time, mask),
        }
    }

    /// Midpoint split by index count, for half-comparison metrics
    pub fn halves(&self) -> (Stream, Stream) {
        let midpoint = self.len() / 2;
        (self.slice(0..midpoint), self.slice(midpoint..self.len()))
    }
}
