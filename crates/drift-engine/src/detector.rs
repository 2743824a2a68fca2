//! Drift Detector
//!
//! Runs the full per-variable pipeline: windows, reference sample, statistic,
//! threshold, state machine, then the point and episode projections.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use drift_core::{
    DriftConfig, DriftError, EpisodeSource, EpisodeSummary, Metric, MetricSet, PointLabel, Series,
    Verdict, Window,
};

use crate::composite::CompositeEvaluator;
use crate::metrics::MetricScorer;
use crate::projection::{aggregate_episodes, batch_labels, project_points, summarize_online_episodes};
use crate::reference::ReferenceBuilder;
use crate::sample::{count_valid, observation_values};
use crate::state_machine::{DriftStateMachine, MachineState, WindowSignal};
use crate::thresholds::{ThresholdResolver, COMPOSITE_THRESHOLD};
use crate::windowing::WindowScheduler;

/// Everything produced for one variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub variable: String,
    pub metric: Metric,
    pub verdicts: Vec<Verdict>,
    pub points: Vec<PointLabel>,
    /// Episodes from the configured authoritative source
    pub episodes: Vec<EpisodeSummary>,
    pub episode_source: EpisodeSource,
}

impl DetectionReport {
    pub fn drift_windows(&self) -> usize {
        self.verdicts.iter().filter(|v| v.drift_flag).count()
    }

    pub fn scored_windows(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_scored()).count()
    }
}

/// Result of scoring one window before it reaches the state machine
#[derive(Debug, Clone, PartialEq)]
struct WindowScore {
    stat: f64,
    threshold: f64,
    drift: bool,
    metrics: Option<MetricSet>,
}

#[derive(Debug)]
pub struct DriftDetector {
    config: DriftConfig,
    scheduler: WindowScheduler,
    reference: ReferenceBuilder,
    resolver: ThresholdResolver,
    scorer: MetricScorer,
}

impl DriftDetector {
    /// Validate the configuration up front; nothing is evaluated on error.
    pub fn new(config: DriftConfig) -> Result<Self, DriftError> {
        config.validate()?;
        Ok(Self {
            scheduler: WindowScheduler::new(config.window)?,
            reference: ReferenceBuilder::new(config.strategy, config.reference),
            resolver: ThresholdResolver::new(config.thresholds),
            scorer: MetricScorer::new(config.psi_bins),
            config,
        })
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Window verdicts in chronological order, one per generated window.
    pub fn evaluate(&self, series: &Series) -> Vec<Verdict> {
        let windows = self.scheduler.windows(series);
        let mut machine = DriftStateMachine::new(self.config.hysteresis_windows);
        let mut verdicts = Vec::with_capacity(windows.len());

        for window in windows {
            let current = self.scheduler.current(series, &window);
            let history = self.scheduler.history(series, &window);
            let n_current = count_valid(current);

            let (score, n_reference) = if n_current < self.config.min_points || history.is_empty() {
                (None, 0)
            } else {
                let reference = self.reference.build(history, window.end);
                let ref_values = observation_values(&reference);
                let cur_values = observation_values(current);
                (self.score_window(&ref_values, &cur_values), ref_values.len())
            };

            let signal = match &score {
                Some(s) => WindowSignal::Scored { drift: s.drift },
                None => WindowSignal::Insufficient,
            };
            let state = machine.step(signal);

            debug!(
                variable = series.name(),
                window = window.index,
                stat = ?score.as_ref().map(|s| s.stat),
                threshold = ?score.as_ref().map(|s| s.threshold),
                state = %state.state,
                "window evaluated"
            );

            verdicts.push(build_verdict(window, score, signal, state, n_reference, n_current));
        }

        verdicts
    }

    fn score_window(&self, reference: &[f64], current: &[f64]) -> Option<WindowScore> {
        let metric = self.config.metric;
        match metric.statistic() {
            Some(statistic) => {
                let stat = self.scorer.score(reference, current, statistic)?;
                let threshold = self
                    .resolver
                    .resolve(metric, reference, self.config.threshold_override);
                Some(WindowScore {
                    stat,
                    threshold,
                    drift: stat >= threshold,
                    metrics: None,
                })
            }
            // Each statistic is judged against its own threshold
            None => {
                let evaluator =
                    CompositeEvaluator::new(&self.config.composite, &self.resolver, &self.scorer);
                let outcome = evaluator.evaluate(reference, current)?;
                Some(WindowScore {
                    stat: outcome.stat,
                    threshold: COMPOSITE_THRESHOLD,
                    drift: outcome.drift,
                    metrics: Some(outcome.metrics),
                })
            }
        }
    }

    /// Full report for one variable.
    pub fn detect(&self, series: &Series) -> DetectionReport {
        let verdicts = self.evaluate(series);
        let points = project_points(series, &verdicts);
        let episodes = match self.config.episodes.source {
            EpisodeSource::Online => summarize_online_episodes(&verdicts),
            EpisodeSource::Batch => aggregate_episodes(&batch_labels(&verdicts), &self.config.episodes),
        };

        let report = DetectionReport {
            variable: series.name().to_string(),
            metric: self.config.metric,
            verdicts,
            points,
            episodes,
            episode_source: self.config.episodes.source,
        };

        info!(
            variable = %report.variable,
            metric = %report.metric,
            strategy = %self.config.strategy,
            windows = report.verdicts.len(),
            scored = report.scored_windows(),
            drift_windows = report.drift_windows(),
            episodes = report.episodes.len(),
            "drift detection finished"
        );

        report
    }
}

fn build_verdict(
    window: Window,
    score: Option<WindowScore>,
    signal: WindowSignal,
    state: MachineState,
    n_reference: usize,
    n_current: usize,
) -> Verdict {
    let raw_drift = matches!(signal, WindowSignal::Scored { drift: true });
    let (stat_value, threshold, metrics) = match score {
        Some(s) => (Some(s.stat), Some(s.threshold), s.metrics),
        None => (None, None, None),
    };
    Verdict {
        window,
        stat_value,
        threshold,
        raw_drift,
        drift_flag: state.is_drift(),
        state: state.state,
        episode_id: state.active_episode(),
        n_reference,
        n_current,
        metrics,
    }
}

/// Run every variable with the same configuration, in parallel across
/// variables. Output order follows the input order.
pub fn detect_all(
    config: &DriftConfig,
    series: &[Series],
) -> Vec<(String, Result<DetectionReport, DriftError>)> {
    series
        .par_iter()
        .map(|s| (s.name().to_string(), DriftDetector::new(config.clone()).map(|d| d.detect(s))))
        .collect()
}

/// Like `detect_all`, with a configuration per variable.
pub fn detect_each(jobs: &[(DriftConfig, Series)]) -> Vec<(String, Result<DetectionReport, DriftError>)> {
    jobs.par_iter()
        .map(|(config, s)| {
            (s.name().to_string(), DriftDetector::new(config.clone()).map(|d| d.detect(s)))
        })
        .collect()
}
