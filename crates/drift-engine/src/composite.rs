//! Composite scoring: compute every statistic and flag drift if any
//! configured one crosses its own threshold. Distances cross upwards
//! (`>=`), p-values downwards (`<=`).

use drift_core::{CompositeThresholds, MetricSet, Statistic};

use crate::metrics::MetricScorer;
use crate::thresholds::ThresholdResolver;

/// Upper bound on a normalized exceedance so it stays finite.
const EXCEEDANCE_CAP: f64 = 1e6;

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeOutcome {
    /// Largest threshold-normalized exceedance; >= 1 means crossed
    pub stat: f64,
    pub drift: bool,
    pub metrics: MetricSet,
    /// Statistics that crossed
    pub triggered: Vec<Statistic>,
}

pub struct CompositeEvaluator<'a> {
    thresholds: &'a CompositeThresholds,
    resolver: &'a ThresholdResolver,
    scorer: &'a MetricScorer,
}

impl<'a> CompositeEvaluator<'a> {
    pub fn new(
        thresholds: &'a CompositeThresholds,
        resolver: &'a ThresholdResolver,
        scorer: &'a MetricScorer,
    ) -> Self {
        Self {
            thresholds,
            resolver,
            scorer,
        }
    }

    /// `None` when no configured statistic is computable.
    pub fn evaluate(&self, reference: &[f64], current: &[f64]) -> Option<CompositeOutcome> {
        let metrics = self.scorer.score_all(reference, current);

        let mut stat: Option<f64> = None;
        let mut triggered = Vec::new();
        for (&statistic, &configured) in &self.thresholds.entries {
            let Some(value) = metrics.get(statistic) else {
                continue;
            };
            let threshold =
                configured.unwrap_or_else(|| self.resolver.resolve_statistic(statistic, reference));

            if crosses(statistic, value, threshold) {
                triggered.push(statistic);
            }
            let ratio = exceedance(statistic, value, threshold);
            stat = Some(stat.map_or(ratio, |s| s.max(ratio)));
        }

        Some(CompositeOutcome {
            stat: stat?,
            drift: !triggered.is_empty(),
            metrics,
            triggered,
        })
    }
}

pub fn crosses(statistic: Statistic, value: f64, threshold: f64) -> bool {
    if statistic.is_p_value() {
        value <= threshold
    } else {
        value >= threshold
    }
}

/// How far past its threshold a value sits, scaled so 1.0 is the boundary.
fn exceedance(statistic: Statistic, value: f64, threshold: f64) -> f64 {
    let ratio = if statistic.is_p_value() {
        if value > 0.0 {
            threshold / value
        } else {
            EXCEEDANCE_CAP
        }
    } else if threshold > 0.0 {
        value / threshold
    } else if value >= threshold {
        EXCEEDANCE_CAP
    } else {
        0.0
    };
    ratio.clamp(0.0, EXCEEDANCE_CAP)
}
