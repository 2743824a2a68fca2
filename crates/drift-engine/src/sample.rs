//! Small numeric helpers shared by the scorer, the resolver and the
//! golden-window reference strategy.

use std::cmp::Ordering;

use drift_core::Observation;

/// Finite values only, in input order.
pub fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Finite values of a slice of observations.
pub fn observation_values(observations: &[Observation]) -> Vec<f64> {
    observations
        .iter()
        .map(|o| o.value)
        .filter(|v| v.is_finite())
        .collect()
}

pub fn count_valid(observations: &[Observation]) -> usize {
    observations.iter().filter(|o| !o.is_missing()).count()
}

/// Finite values sorted ascending.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted = finite_values(values);
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Quantile with linear interpolation between closest ranks.
/// `q` is in [0, 1]; the slice must be sorted and non-empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Median of finite values, `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    Some(quantile_sorted(&sorted, 0.5))
}

/// Sample standard deviation (n - 1). `NaN` with fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    let clean = finite_values(values);
    if clean.len() < 2 {
        return f64::NAN;
    }
    let n = clean.len() as f64;
    let mean = clean.iter().sum::<f64>() / n;
    let variance = clean.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
