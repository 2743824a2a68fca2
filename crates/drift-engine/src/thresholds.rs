//! Decision boundary per metric.
//!
//! PSI and KS are already normalized and use fixed bounds. Wasserstein is in
//! data units, so its bound scales with the reference spread.

use drift_core::{Metric, Statistic, ThresholdPolicy};

use crate::sample::std_dev;

/// Threshold of a composite verdict, whose statistic is the largest
/// threshold-normalized exceedance.
pub const COMPOSITE_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct ThresholdResolver {
    policy: ThresholdPolicy,
}

impl ThresholdResolver {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Threshold for the configured metric. An override always wins.
    pub fn resolve(&self, metric: Metric, reference: &[f64], override_value: Option<f64>) -> f64 {
        if let Some(thr) = override_value {
            return thr;
        }
        match metric {
            Metric::Psi => self.resolve_statistic(Statistic::Psi, reference),
            Metric::Ks => self.resolve_statistic(Statistic::Ks, reference),
            Metric::Wasserstein => self.resolve_statistic(Statistic::Wasserstein, reference),
            Metric::Composite => COMPOSITE_THRESHOLD,
        }
    }

    /// Policy threshold for a single statistic.
    pub fn resolve_statistic(&self, statistic: Statistic, reference: &[f64]) -> f64 {
        match statistic {
            Statistic::Psi => self.policy.psi,
            Statistic::Ks => self.policy.ks,
            Statistic::Wasserstein => self.wasserstein_threshold(reference),
            Statistic::KsPValue | Statistic::MannWhitneyPValue => self.policy.generic,
        }
    }

    fn wasserstein_threshold(&self, reference: &[f64]) -> f64 {
        let sd = std_dev(reference);
        if sd.is_nan() || sd <= 0.0 {
            return self.policy.fallback_std;
        }
        sd * self.policy.wasserstein_factor
    }
}

impl Default for ThresholdResolver {
    fn default() -> Self {
        Self::new(ThresholdPolicy::default())
    }
}
