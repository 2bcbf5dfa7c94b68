//! Stream splitting into raw and moving views
//!
//! The split happens before any metric computation. The raw view keeps all
//! samples with their original timestamps; the moving view drops stopped
//! samples and re-pitches `time` onto a contiguous 1 Hz grid so every
//! windowed operator downstream sees `w` seconds as `w` consecutive samples.

use tracing::{debug, warn};

use crate::stream::{Stream, GAP_THRESHOLD_SECONDS};

/// The two views of one processed stream, with their durations
#[derive(Debug, Clone, Default)]
pub struct SplitResult {
    /// All samples, original `time`
    pub raw: Stream,

    /// Moving samples only, `time` rewritten to 0, 1, 2, ...; the original
    /// timestamps are retained under `original_time`
    pub moving: Stream,

    /// `time.last - time.first` of the raw view, in seconds
    pub raw_duration_s: f64,

    /// Sum of gap-clipped deltas over moving samples, in seconds
    pub moving_duration_s: f64,
}

/// Splits a processed stream into raw and moving views
pub struct StreamSplitter;

impl StreamSplitter {
    pub fn new() -> Self {
        StreamSplitter
    }

    pub fn split(&self, stream: &Stream) -> SplitResult {
        if stream.is_empty() {
            warn!("empty stream provided to splitter");
            return SplitResult::default();
        }

        let raw = stream.clone();
        let moving = self.moving_view(stream);

        let raw_duration_s = raw.time.last().unwrap() - raw.time.first().unwrap();
        let moving_duration_s = moving_duration(stream);

        debug!(
            raw_samples = raw.len(),
            raw_duration_s,
            moving_samples = moving.len(),
            moving_duration_s,
            "split stream"
        );

        SplitResult {
            raw,
            moving,
            raw_duration_s,
            moving_duration_s,
        }
    }

    fn moving_view(&self, stream: &Stream) -> Stream {
        let mut view = stream.filter(&stream.moving);
        if view.is_empty() {
            warn!("no moving samples found");
            return view;
        }

        view.original_time = Some(std::mem::take(&mut view.time));
        view.time = (0..view.moving.len()).map(|i| i as f64).collect();
        view
    }
}

impl Default for StreamSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Actual seconds spent moving, from the original timestamps
///
/// Deltas between consecutive moving samples are clipped to the gap
/// threshold: a larger delta spans a filtered-out stop, of which at most
/// one recording interval counts as movement.
fn moving_duration(stream: &Stream) -> f64 {
    let moving_times: Vec<f64> = stream
        .time
        .iter()
        .zip(&stream.moving)
        .filter(|(_, m)| **m)
        .map(|(t, _)| *t)
        .collect();

    if moving_times.is_empty() {
        return 0.0;
    }
    if moving_times.len() < 2 {
        return moving_times.len() as f64;
    }

    let mut total = 1.0; // first moving sample counts as one second
    for pair in moving_times.windows(2) {
        total += (pair[1] - pair[0]).clamp(0.0, GAP_THRESHOLD_SECONDS);
    }
    total
}
