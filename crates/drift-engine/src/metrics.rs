//! Divergence statistics between a reference and a current sample.
//!
//! All scorers drop missing values first and return `None` when either side
//! has fewer than `MIN_SAMPLES` valid points. `None` means "not computable",
//! which callers must keep distinct from "no drift".

use statrs::distribution::{ContinuousCDF, Normal};

use drift_core::{MetricSet, Statistic};

use crate::sample::{finite_values, quantile_sorted, sorted_finite};

/// Minimum valid points on each side for any statistic.
pub const MIN_SAMPLES: usize = 5;

/// Probability floor applied to every PSI bin.
pub const PSI_EPSILON: f64 = 1e-6;

/// Pure statistical scorer
#[derive(Debug, Clone, Copy)]
pub struct MetricScorer {
    psi_bins: usize,
}

impl Default for MetricScorer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl MetricScorer {
    pub fn new(psi_bins: usize) -> Self {
        Self {
            psi_bins: psi_bins.max(1),
        }
    }

    /// Compute one statistic. Distances grow with drift, p-values shrink.
    pub fn score(&self, reference: &[f64], current: &[f64], statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Psi => psi(reference, current, self.psi_bins),
            Statistic::Ks => ks_statistic(reference, current),
            Statistic::KsPValue => ks_p_value(reference, current),
            Statistic::Wasserstein => wasserstein(reference, current),
            Statistic::MannWhitneyPValue => mann_whitney_p_value(reference, current),
        }
    }

    /// Every statistic at once, for composite mode.
    pub fn score_all(&self, reference: &[f64], current: &[f64]) -> MetricSet {
        MetricSet {
            psi: self.score(reference, current, Statistic::Psi),
            ks: self.score(reference, current, Statistic::Ks),
            ks_pvalue: self.score(reference, current, Statistic::KsPValue),
            wasserstein: self.score(reference, current, Statistic::Wasserstein),
            mannwhitney_pvalue: self.score(reference, current, Statistic::MannWhitneyPValue),
        }
    }
}

/// Both sides sorted and cleaned, or `None` if either is too small.
fn prepared(reference: &[f64], current: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let r = sorted_finite(reference);
    let c = sorted_finite(current);
    if r.len() < MIN_SAMPLES || c.len() < MIN_SAMPLES {
        return None;
    }
    Some((r, c))
}

/// Population Stability Index on reference-quantile bins.
///
/// Repeated edges are collapsed; a reference with fewer than two distinct
/// edges is degenerate and scores exactly 0. Current values outside the
/// reference range are not counted. If none of them falls inside it the
/// histograms share no support and the index is not computable.
pub fn psi(reference: &[f64], current: &[f64], n_bins: usize) -> Option<f64> {
    let (r, c) = prepared(reference, current)?;
    let n_bins = n_bins.max(1);

    let mut edges: Vec<f64> = (0..=n_bins)
        .map(|i| quantile_sorted(&r, i as f64 / n_bins as f64))
        .collect();
    edges.dedup();
    if edges.len() < 2 {
        return Some(0.0);
    }

    let cur_counts = histogram(&c, &edges);
    if cur_counts.iter().all(|&n| n == 0) {
        return None;
    }

    let p_ref = bin_probabilities(&histogram(&r, &edges));
    let p_cur = bin_probabilities(&cur_counts);

    let value = p_ref
        .iter()
        .zip(p_cur.iter())
        .map(|(pr, pc)| (pc - pr) * (pc / pr).ln())
        .sum::<f64>();
    Some(value.max(0.0))
}

/// Bins are [e_i, e_{i+1}) with the last one closed; values outside
/// [e_0, e_last] are skipped.
fn histogram(values: &[f64], edges: &[f64]) -> Vec<usize> {
    let bins = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[bins]);
    let mut counts = vec![0usize; bins];
    for &v in values.iter().filter(|v| **v >= lo && **v <= hi) {
        let above = edges.partition_point(|e| *e <= v);
        counts[above.saturating_sub(1).min(bins - 1)] += 1;
    }
    counts
}

fn bin_probabilities(counts: &[usize]) -> Vec<f64> {
    let total = counts.iter().sum::<usize>().max(1) as f64;
    let clipped: Vec<f64> = counts
        .iter()
        .map(|&c| (c as f64 / total).clamp(PSI_EPSILON, 1.0))
        .collect();
    let norm: f64 = clipped.iter().sum();
    clipped.into_iter().map(|p| p / norm).collect()
}

/// Two-sample Kolmogorov-Smirnov statistic (max ECDF gap).
pub fn ks_statistic(reference: &[f64], current: &[f64]) -> Option<f64> {
    let (r, c) = prepared(reference, current)?;
    Some(ks_from_sorted(&r, &c))
}

fn ks_from_sorted(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d_max = 0.0f64;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d_max = d_max.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    d_max
}

/// Two-sided asymptotic p-value for the KS statistic.
pub fn ks_p_value(reference: &[f64], current: &[f64]) -> Option<f64> {
    let (r, c) = prepared(reference, current)?;
    let d = ks_from_sorted(&r, &c);
    let (n1, n2) = (r.len() as f64, c.len() as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();
    // Stephens correction for small samples
    let lambda = (en + 0.12 + 0.11 / en) * d;
    Some(kolmogorov_survival(lambda))
}

/// P(K > lambda) for the Kolmogorov distribution.
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }

    if lambda < 1.18 {
        let y = (-std::f64::consts::PI.powi(2) / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * std::f64::consts::PI).sqrt() / lambda
            * (y + y.powi(9) + y.powi(25) + y.powi(49));
        (1.0 - cdf).clamp(0.0, 1.0)
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        (2.0 * (x - x.powi(4) + x.powi(9) - x.powi(16))).clamp(0.0, 1.0)
    }
}

/// First-order Wasserstein distance between two empirical distributions.
pub fn wasserstein(reference: &[f64], current: &[f64]) -> Option<f64> {
    let (r, c) = prepared(reference, current)?;

    let mut support: Vec<f64> = r.iter().chain(c.iter()).copied().collect();
    support.sort_by(|a, b| a.total_cmp(b));

    let (n1, n2) = (r.len() as f64, c.len() as f64);
    let mut distance = 0.0;
    for pair in support.windows(2) {
        let delta = pair[1] - pair[0];
        if delta <= 0.0 {
            continue;
        }
        let cdf_r = r.partition_point(|v| *v <= pair[0]) as f64 / n1;
        let cdf_c = c.partition_point(|v| *v <= pair[0]) as f64 / n2;
        distance += (cdf_r - cdf_c).abs() * delta;
    }

    Some(distance)
}

/// Two-sided Mann-Whitney U p-value (normal approximation with tie and
/// continuity correction).
pub fn mann_whitney_p_value(reference: &[f64], current: &[f64]) -> Option<f64> {
    let r = finite_values(reference);
    let c = finite_values(current);
    if r.len() < MIN_SAMPLES || c.len() < MIN_SAMPLES {
        return None;
    }

    let mut pooled: Vec<(f64, bool)> = r
        .iter()
        .map(|&v| (v, true))
        .chain(c.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = pooled.len();
    let mut rank_sum_ref = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        // ranks i+1 ..= j+1 share their average
        let avg_rank = (i + j + 2) as f64 / 2.0;
        let ties = (j - i + 1) as f64;
        tie_term += ties.powi(3) - ties;
        rank_sum_ref += pooled[i..=j].iter().filter(|(_, is_ref)| *is_ref).count() as f64 * avg_rank;
        i = j + 1;
    }

    let (n1, n2, nf) = (r.len() as f64, c.len() as f64, n as f64);
    let u1 = rank_sum_ref - n1 * (n1 + 1.0) / 2.0;
    let u = u1.max(n1 * n2 - u1);
    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)))).sqrt();
    if !(sigma > 0.0) {
        return Some(1.0);
    }

    let z = (u - mu - 0.5) / sigma;
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some((2.0 * normal.sf(z)).clamp(0.0, 1.0))
}
