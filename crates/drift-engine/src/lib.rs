//! Drift Engine
//!
//! Windowed distribution-drift detection over a single time series: reference
//! selection, divergence statistics, adaptive thresholds, a hysteresis state
//! machine and the point/episode projections built on top of it.

pub mod composite;
pub mod detector;
pub mod metrics;
pub mod projection;
pub mod reference;
pub mod sample;
pub mod state_machine;
pub mod thresholds;
pub mod windowing;

#[cfg(test)]
mod tests;

pub use composite::{CompositeEvaluator, CompositeOutcome};
pub use detector::{detect_all, detect_each, DetectionReport, DriftDetector};
pub use metrics::MetricScorer;
pub use projection::{
    aggregate_episodes, batch_labels, project_points, summarize_online_episodes, WindowLabel,
};
pub use reference::{ReferenceBuilder, ReferenceSelector};
pub use state_machine::{transition, DriftStateMachine, MachineState, WindowSignal};
pub use thresholds::ThresholdResolver;
pub use windowing::WindowScheduler;
