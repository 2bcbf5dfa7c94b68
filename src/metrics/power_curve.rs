//! Power-duration analytics
//!
//! Maximal mean power extraction at configured durations and the
//! hyperbolic Critical Power model P(t) = CP + W'/t, fitted with a bounded
//! Levenberg-Marquardt solver. Short sprints misspecify the hyperbolic
//! model, so durations under two minutes never enter the fit.

use tracing::warn;

use crate::metrics::base::max_rolling_mean;
use crate::models::{insert_metric, CpModel, MetricMap};
use crate::stream::Stream;

/// Durations below this never enter the CP fit, in seconds
pub const MIN_FIT_DURATION: f64 = 120.0;

/// Minimum number of (duration, power) points for a fit
pub const MIN_FIT_POINTS: usize = 3;

/// Physiological bounds on Critical Power, in watts
pub const CP_BOUNDS: (f64, f64) = (100.0, 400.0);

/// Physiological bounds on W', in joules
pub const W_PRIME_BOUNDS: (f64, f64) = (5_000.0, 50_000.0);

/// Iteration cap for the solver
const MAX_ITERATIONS: usize = 5000;

/// Canonical label for an MMP duration: `5sec`, `1min`, `20min`, `1hr`, ...
pub fn interval_label(seconds: u32) -> String {
    if seconds >= 3600 && seconds % 3600 == 0 {
        format!("{}hr", seconds / 3600)
    } else if seconds >= 60 && seconds % 60 == 0 {
        format!("{}min", seconds / 60)
    } else {
        format!("{}sec", seconds)
    }
}

/// Extract maximal mean power at each configured duration
///
/// Rolls over the active (watts > 0) samples; a duration longer than the
/// active sample count produces no key.
pub fn mmp_metrics(stream: &Stream, intervals: &[u32]) -> MetricMap {
    let mut metrics = MetricMap::new();

    let watts = match stream.watts() {
        Some(watts) => watts,
        None => return metrics,
    };
    let active: Vec<f64> = watts.iter().copied().filter(|w| *w > 0.0).collect();
    if active.is_empty() {
        return metrics;
    }

    for &duration in intervals {
        if duration == 0 {
            continue;
        }
        if let Some(max_avg) = max_rolling_mean(&active, duration as usize) {
            if max_avg.is_finite() {
                insert_metric(
                    &mut metrics,
                    &format!("power_curve_{}", interval_label(duration)),
                    max_avg,
                );
            }
        }
    }

    metrics
}

/// Fit the hyperbolic CP model to (duration, power) points
///
/// Points shorter than [`MIN_FIT_DURATION`] are dropped first; fewer than
/// [`MIN_FIT_POINTS`] surviving points, or a solver failure, yield the NaN
/// sentinel model instead of an error.
pub fn fit_cp_model(points: &[(f64, f64)], ftp_hint: Option<f64>) -> CpModel {
    let points: Vec<(f64, f64)> = points
        .iter()
        .copied()
        .filter(|(t, p)| *t >= MIN_FIT_DURATION && p.is_finite() && *p > 0.0)
        .collect();

    if points.len() < MIN_FIT_POINTS {
        return CpModel::nan();
    }

    let (cp0, w0) = initial_guess(&points, ftp_hint);

    match levenberg_marquardt(&points, cp0, w0) {
        Some((cp, w_prime)) => {
            let r_squared = r_squared(&points, cp, w_prime);
            CpModel {
                cp,
                w_prime,
                r_squared,
            }
        }
        None => {
            warn!("CP model fit did not converge");
            CpModel::nan()
        }
    }
}

/// Anaerobic Energy Index: W' per kilogram of rider mass, in kJ/kg
pub fn anaerobic_energy_index(w_prime: f64, rider_weight_kg: f64) -> f64 {
    if rider_weight_kg <= 0.0 {
        return f64::NAN;
    }
    w_prime / 1000.0 / rider_weight_kg
}

fn initial_guess(points: &[(f64, f64)], ftp_hint: Option<f64>) -> (f64, f64) {
    let (cp0, w0): (f64, f64) = match ftp_hint {
        Some(ftp) if ftp > 0.0 => (0.88 * ftp, 15_000.0),
        _ => {
            let longest = points
                .iter()
                .copied()
                .fold((0.0, 0.0), |acc, p| if p.0 > acc.0 { p } else { acc });
            (0.95 * longest.1, 15_000.0)
        }
    };
    (
        cp0.clamp(CP_BOUNDS.0, CP_BOUNDS.1),
        w0.clamp(W_PRIME_BOUNDS.0, W_PRIME_BOUNDS.1),
    )
}

fn cost(points: &[(f64, f64)], cp: f64, w_prime: f64) -> f64 {
    points
        .iter()
        .map(|(t, p)| {
            let r = p - (cp + w_prime / t);
            r * r
        })
        .sum()
}

/// Damped least squares on the two-parameter hyperbolic model
///
/// The Jacobian is constant in CP and 1/t in W', so the normal equations
/// stay a 2x2 solve. Parameters are projected onto their bounds after every
/// accepted step.
fn levenberg_marquardt(points: &[(f64, f64)], cp0: f64, w0: f64) -> Option<(f64, f64)> {
    let mut cp = cp0;
    let mut w_prime = w0;
    let mut lambda = 1e-3;
    let mut current_cost = cost(points, cp, w_prime);

    for _ in 0..MAX_ITERATIONS {
        // JtJ and Jt r for residuals r_i = p_i - (cp + w/t_i)
        let mut a00 = 0.0;
        let mut a01 = 0.0;
        let mut a11 = 0.0;
        let mut g0 = 0.0;
        let mut g1 = 0.0;
        for (t, p) in points {
            let inv_t = 1.0 / t;
            let r = p - (cp + w_prime * inv_t);
            a00 += 1.0;
            a01 += inv_t;
            a11 += inv_t * inv_t;
            g0 += r;
            g1 += r * inv_t;
        }

        let d00 = a00 * (1.0 + lambda);
        let d11 = a11 * (1.0 + lambda);
        let det = d00 * d11 - a01 * a01;
        if det.abs() < 1e-18 {
            return None;
        }

        let delta_cp = (g0 * d11 - g1 * a01) / det;
        let delta_w = (g1 * d00 - g0 * a01) / det;

        let next_cp = (cp + delta_cp).clamp(CP_BOUNDS.0, CP_BOUNDS.1);
        let next_w = (w_prime + delta_w).clamp(W_PRIME_BOUNDS.0, W_PRIME_BOUNDS.1);
        let next_cost = cost(points, next_cp, next_w);

        if next_cost < current_cost {
            let step = (next_cp - cp).abs() + (next_w - w_prime).abs();
            let improvement = current_cost - next_cost;
            cp = next_cp;
            w_prime = next_w;
            current_cost = next_cost;
            lambda = (lambda / 10.0).max(1e-12);
            if step < 1e-10 || improvement < 1e-12 {
                return Some((cp, w_prime));
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                // stuck against a bound or at the optimum
                return Some((cp, w_prime));
            }
        }
    }

    Some((cp, w_prime))
}

fn r_squared(points: &[(f64, f64)], cp: f64, w_prime: f64) -> f64 {
    let mean_p = points.iter().map(|(_, p)| p).sum::<f64>() / points.len() as f64;
    let ss_res: f64 = points
        .iter()
        .map(|(t, p)| {
            let r = p - (cp + w_prime / t);
            r * r
        })
        .sum();
    let ss_tot: f64 = points
        .iter()
        .map(|(_, p)| {
            let d = p - mean_p;
            d * d
        })
        .sum();

    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        f64::NAN
    }
}
