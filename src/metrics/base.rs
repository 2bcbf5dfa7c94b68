//! Shared time-weighted primitives
//!
//! Every non-peak aggregate in the calculators is time-weighted through
//! these operators. On the moving view the deltas are 1.0 by construction;
//! on the raw view they carry the original gap information and are never
//! clipped upward here (clipping gaps is the splitter's job).

/// Time differences between consecutive samples
///
/// The first delta borrows the second (or 1.0 for a single sample) and all
/// deltas are clipped to at least one second so zero or negative steps
/// cannot poison a weighted sum.
pub fn time_deltas(times: &[f64]) -> Vec<f64> {
    if times.is_empty() {
        return Vec::new();
    }
    let mut deltas = Vec::with_capacity(times.len());
    deltas.push(0.0); // placeholder, fixed below
    for pair in times.windows(2) {
        deltas.push((pair[1] - pair[0]).max(1.0));
    }
    deltas[0] = if deltas.len() > 1 { deltas[1] } else { 1.0 };
    deltas
}

/// Time-weighted mean: Σ(value·Δt) / Σ(Δt)
///
/// `values` and `times` must be aligned row for row; callers pass subsets
/// (e.g. climbing samples) with the matching subset of timestamps. Returns
/// 0 for empty input.
pub fn time_weighted_mean(values: &[f64], times: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), times.len());
    if values.is_empty() {
        return 0.0;
    }

    let deltas = time_deltas(times);
    let mut weighted_sum = 0.0;
    let mut total_time = 0.0;
    for (v, dt) in values.iter().zip(&deltas) {
        weighted_sum += v * dt;
        total_time += dt;
    }

    if total_time > 0.0 {
        weighted_sum / total_time
    } else {
        0.0
    }
}

/// Total duration of a view in seconds: the sum of its time deltas
pub fn total_duration(times: &[f64]) -> f64 {
    time_deltas(times).iter().sum()
}

/// Seconds accumulated where `mask` holds
pub fn time_where(times: &[f64], mask: &[bool]) -> f64 {
    debug_assert_eq!(times.len(), mask.len());
    time_deltas(times)
        .iter()
        .zip(mask)
        .filter(|(_, m)| **m)
        .map(|(dt, _)| *dt)
        .sum()
}

/// Trailing rolling mean with an expanding prefix
///
/// Entry `i` is the mean of the last `window` samples ending at `i`; the
/// first `window - 1` entries average over the shorter available prefix.
pub fn rolling_mean_expanding(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Maximum of the full-window trailing rolling mean
///
/// Returns `None` when fewer than `window` samples are available.
pub fn max_rolling_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let mut sum: f64 = values[..window].iter().sum();
    let mut best = sum;
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        if sum > best {
            best = sum;
        }
    }
    Some(best / window as f64)
}

/// Centred rolling mean over full windows only
///
/// Positions without full coverage are skipped, so the output holds one
/// mean per fully covered window in order. The centred labelling does not
/// change the values, only which sample each one nominally belongs to.
pub fn rolling_mean_centered(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}
