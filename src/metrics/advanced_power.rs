//! Advanced power metrics
//!
//! Time above threshold bands, W' balance tracking with match-burn
//! counting, negative split analysis, cardiac drift, and single-ride FTP
//! estimation.

use crate::config::AnalysisConfig;
use crate::metrics::base::{max_rolling_mean, rolling_mean_centered, time_where};
use crate::models::{insert_metric, MetricMap};
use crate::stream::Stream;

/// Fraction of W' below which a depletion counts as a burned match
const MATCH_BURN_THRESHOLD: f64 = 0.50;

/// Re-arm margin above the burn threshold before another match can count
const MATCH_BURN_HYSTERESIS: f64 = 0.10;

/// Samples needed before the halves comparison is meaningful
const MIN_SPLIT_SAMPLES: usize = 60;

/// Samples needed for cardiac drift (10 minutes at 1 Hz)
const MIN_DRIFT_SAMPLES: usize = 600;

/// 20-minute window for FTP estimation, in samples
const FTP_WINDOW: usize = 1200;

pub struct AdvancedPowerCalculator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> AdvancedPowerCalculator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        AdvancedPowerCalculator { config }
    }

    pub fn calculate(&self, stream: &Stream) -> MetricMap {
        let mut metrics = MetricMap::new();

        let watts = match stream.watts() {
            Some(watts) if !watts.is_empty() => watts,
            _ => return self.empty_metrics(),
        };

        insert_metric(
            &mut metrics,
            "time_above_90_ftp",
            self.time_above_threshold(watts, &stream.time, 0.90),
        );
        insert_metric(
            &mut metrics,
            "time_sweet_spot",
            self.time_in_range(watts, &stream.time, 0.88, 0.94),
        );

        match (self.config.cp, self.config.w_prime) {
            (Some(cp), Some(w_prime)) if cp > 0.0 && w_prime > 0.0 => {
                let (min_balance, match_burns) = w_prime_balance(watts, cp, w_prime);
                insert_metric(&mut metrics, "w_prime_balance_min", min_balance);
                insert_metric(&mut metrics, "match_burn_count", match_burns as f64);
            }
            _ => {
                insert_metric(&mut metrics, "w_prime_balance_min", 0.0);
                insert_metric(&mut metrics, "match_burn_count", 0.0);
            }
        }

        insert_metric(
            &mut metrics,
            "negative_split_index",
            self.negative_split_index(stream),
        );

        match stream.heartrate() {
            Some(_) => {
                insert_metric(&mut metrics, "cardiac_drift", self.cardiac_drift(stream));
            }
            None => {
                insert_metric(&mut metrics, "cardiac_drift", 0.0);
            }
        }

        insert_metric(&mut metrics, "estimated_ftp", estimate_ftp(watts));

        metrics
    }

    fn time_above_threshold(&self, watts: &[f64], times: &[f64], pct: f64) -> f64 {
        if self.config.ftp == 0.0 {
            return 0.0;
        }
        let threshold = self.config.ftp * pct;
        let mask: Vec<bool> = watts.iter().map(|w| *w > threshold).collect();
        time_where(times, &mask)
    }

    fn time_in_range(&self, watts: &[f64], times: &[f64], lo_pct: f64, hi_pct: f64) -> f64 {
        if self.config.ftp == 0.0 {
            return 0.0;
        }
        let lo = self.config.ftp * lo_pct;
        let hi = self.config.ftp * hi_pct;
        let mask: Vec<bool> = watts.iter().map(|w| *w >= lo && *w <= hi).collect();
        time_where(times, &mask)
    }

    /// NP of the second half over NP of the first half
    ///
    /// Below 1.0 the rider finished stronger; above 1.0 they faded.
    fn negative_split_index(&self, stream: &Stream) -> f64 {
        if stream.len() < MIN_SPLIT_SAMPLES {
            return 1.0;
        }
        let (first, second) = stream.halves();

        let np_first = simplified_np(first.watts().unwrap_or(&[]));
        let np_second = simplified_np(second.watts().unwrap_or(&[]));

        if np_first == 0.0 {
            return 1.0;
        }
        np_second / np_first
    }

    /// Percent change of the simplified EF between halves
    fn cardiac_drift(&self, stream: &Stream) -> f64 {
        if stream.len() < MIN_DRIFT_SAMPLES {
            return 0.0;
        }
        let (first, second) = stream.halves();

        let ef_first = simplified_ef(&first);
        let ef_second = simplified_ef(&second);

        if ef_first == 0.0 {
            return 0.0;
        }
        (ef_second - ef_first) / ef_first * 100.0
    }

    fn empty_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        for key in [
            "time_above_90_ftp",
            "time_sweet_spot",
            "w_prime_balance_min",
            "match_burn_count",
            "cardiac_drift",
            "estimated_ftp",
        ] {
            insert_metric(&mut metrics, key, 0.0);
        }
        insert_metric(&mut metrics, "negative_split_index", 1.0);
        metrics
    }
}

/// Track W' balance second by second and count match burns
///
/// Above CP the balance depletes linearly with the excess power; below CP
/// it recovers exponentially with the Skiba time constant
/// τ = 546·e^(−0.01·(CP−P)) + 316. A match burns when the balance drops
/// under half of W'; re-entry requires a 10% recovery margin.
pub fn w_prime_balance(watts: &[f64], cp: f64, w_prime: f64) -> (f64, usize) {
    if watts.is_empty() {
        return (0.0, 0);
    }

    let mut balance = w_prime;
    let mut min_balance = w_prime;
    let mut match_count = 0usize;
    let mut in_match = false;

    for &power in &watts[1..] {
        if power > cp {
            balance -= power - cp;
        } else {
            let tau = 546.0 * (-0.01 * (cp - power)).exp() + 316.0;
            balance += (w_prime - balance) * (1.0 - (-1.0 / tau).exp());
        }
        balance = balance.clamp(0.0, w_prime);

        if balance < min_balance {
            min_balance = balance;
        }

        let fraction = balance / w_prime;
        if fraction < MATCH_BURN_THRESHOLD && !in_match {
            match_count += 1;
            in_match = true;
        } else if fraction > MATCH_BURN_THRESHOLD + MATCH_BURN_HYSTERESIS {
            in_match = false;
        }
    }

    (min_balance, match_count)
}

/// Single-ride FTP estimate: 95% of the best 20-minute rolling mean power
pub fn estimate_ftp(watts: &[f64]) -> f64 {
    if watts.len() < FTP_WINDOW {
        return 0.0;
    }
    match max_rolling_mean(watts, FTP_WINDOW) {
        Some(best) if best.is_finite() && best > 0.0 => best * 0.95,
        _ => 0.0,
    }
}

/// Simplified NP for half comparisons: centred 30-sample rolling mean,
/// then the L4 mean of the covered windows
fn simplified_np(watts: &[f64]) -> f64 {
    let rolled = rolling_mean_centered(watts, 30);
    if rolled.is_empty() {
        return 0.0;
    }
    let mean_fourth = rolled.iter().map(|v| v.powi(4)).sum::<f64>() / rolled.len() as f64;
    let np = mean_fourth.powf(0.25);
    if np.is_finite() {
        np
    } else {
        0.0
    }
}

fn simplified_ef(stream: &Stream) -> f64 {
    let heartrate = match stream.heartrate() {
        Some(hr) if !hr.is_empty() => hr,
        _ => return 0.0,
    };
    let np = simplified_np(stream.watts().unwrap_or(&[]));
    let avg_hr = heartrate.iter().sum::<f64>() / heartrate.len() as f64;
    if avg_hr == 0.0 {
        return 0.0;
    }
    np / avg_hr
}
