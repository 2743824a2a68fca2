use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DriftError;

/// A single timestamped measurement. `NaN` encodes a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn is_missing(&self) -> bool {
        !self.value.is_finite()
    }
}

/// Time-indexed series for one variable, timestamps strictly increasing.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    name: String,
    observations: Vec<Observation>,
}

impl Series {
    /// Build a series, rejecting timestamps that are not strictly increasing.
    pub fn new(name: impl Into<String>, observations: Vec<Observation>) -> Result<Self, DriftError> {
        let name = name.into();
        if let Some(pos) = observations
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(DriftError::InvalidSeries(format!(
                "'{}' is not strictly time-ordered at position {} ({} follows {})",
                name,
                pos + 1,
                observations[pos + 1].timestamp,
                observations[pos].timestamp
            )));
        }
        Ok(Self { name, observations })
    }

    /// Build a series from (timestamp, value) pairs, sorting them first.
    /// Duplicate timestamps are still rejected.
    pub fn from_unsorted(
        name: impl Into<String>,
        mut observations: Vec<Observation>,
    ) -> Result<Self, DriftError> {
        observations.sort_by_key(|o| o.timestamp);
        Self::new(name, observations)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn min_timestamp(&self) -> Option<DateTime<Utc>> {
        self.observations.first().map(|o| o.timestamp)
    }

    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.observations.last().map(|o| o.timestamp)
    }
}

/// Closed interval [start, end] evaluated as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Divergence statistic used to compare reference and current samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Population Stability Index
    Psi,
    /// Two-sample Kolmogorov-Smirnov statistic
    Ks,
    /// First-order earth-mover distance
    Wasserstein,
    /// Every statistic at once, drift if any configured one crosses
    Composite,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Psi => "psi",
            Metric::Ks => "ks",
            Metric::Wasserstein => "wasserstein",
            Metric::Composite => "composite",
        }
    }

    /// The single statistic behind this metric; `None` for composite.
    pub fn statistic(&self) -> Option<Statistic> {
        match self {
            Metric::Psi => Some(Statistic::Psi),
            Metric::Ks => Some(Statistic::Ks),
            Metric::Wasserstein => Some(Statistic::Wasserstein),
            Metric::Composite => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psi" => Ok(Metric::Psi),
            "ks" => Ok(Metric::Ks),
            "wasserstein" => Ok(Metric::Wasserstein),
            "composite" | "all" => Ok(Metric::Composite),
            _ => Err(DriftError::UnknownMetric(s.to_string())),
        }
    }
}

/// How the reference sample is drawn from history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStrategy {
    /// Recency-weighted prefix covering a target mass
    Decay,
    /// Most stable historical sub-windows
    Golden,
    /// Same weekday/hour slot within a lookback horizon
    Seasonal,
}

impl ReferenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceStrategy::Decay => "decay",
            ReferenceStrategy::Golden => "golden",
            ReferenceStrategy::Seasonal => "seasonal",
        }
    }
}

impl fmt::Display for ReferenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceStrategy {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decay" => Ok(ReferenceStrategy::Decay),
            "golden" => Ok(ReferenceStrategy::Golden),
            "seasonal" => Ok(ReferenceStrategy::Seasonal),
            _ => Err(DriftError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Individual statistic available in composite mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Statistic {
    #[serde(rename = "psi")]
    Psi,
    #[serde(rename = "ks")]
    Ks,
    #[serde(rename = "ks_pvalue")]
    KsPValue,
    #[serde(rename = "wasserstein")]
    Wasserstein,
    #[serde(rename = "mannwhitney_pvalue")]
    MannWhitneyPValue,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::Psi,
        Statistic::Ks,
        Statistic::KsPValue,
        Statistic::Wasserstein,
        Statistic::MannWhitneyPValue,
    ];

    /// Smaller values mean more evidence of drift.
    pub fn is_p_value(&self) -> bool {
        matches!(self, Statistic::KsPValue | Statistic::MannWhitneyPValue)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Psi => "psi",
            Statistic::Ks => "ks",
            Statistic::KsPValue => "ks_pvalue",
            Statistic::Wasserstein => "wasserstein",
            Statistic::MannWhitneyPValue => "mannwhitney_pvalue",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psi" => Ok(Statistic::Psi),
            "ks" => Ok(Statistic::Ks),
            "ks_pvalue" => Ok(Statistic::KsPValue),
            "wasserstein" => Ok(Statistic::Wasserstein),
            "mannwhitney_pvalue" | "mannwhitney" => Ok(Statistic::MannWhitneyPValue),
            _ => Err(DriftError::UnknownMetric(s.to_string())),
        }
    }
}

/// Every statistic computed for one reference/current pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub psi: Option<f64>,
    pub ks: Option<f64>,
    pub ks_pvalue: Option<f64>,
    pub wasserstein: Option<f64>,
    pub mannwhitney_pvalue: Option<f64>,
}

impl MetricSet {
    pub fn get(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Psi => self.psi,
            Statistic::Ks => self.ks,
            Statistic::KsPValue => self.ks_pvalue,
            Statistic::Wasserstein => self.wasserstein,
            Statistic::MannWhitneyPValue => self.mannwhitney_pvalue,
        }
    }
}

/// State of the per-variable drift state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriftState {
    Normal,
    Drift,
}

impl DriftState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftState::Normal => "NORMAL",
            DriftState::Drift => "DRIFT",
        }
    }
}

impl fmt::Display for DriftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision record for one evaluation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub window: Window,
    /// `None` when the window was not scorable
    pub stat_value: Option<f64>,
    pub threshold: Option<f64>,
    /// This window crossed its threshold, regardless of hysteresis
    pub raw_drift: bool,
    /// `state == Drift` after this window
    pub drift_flag: bool,
    pub state: DriftState,
    /// Set only while in `Drift`
    pub episode_id: Option<u32>,
    pub n_reference: usize,
    pub n_current: usize,
    /// Per-statistic breakdown in composite mode
    #[serde(default)]
    pub metrics: Option<MetricSet>,
}

impl Verdict {
    pub fn is_scored(&self) -> bool {
        self.stat_value.is_some()
    }
}

/// One drift episode, from either the online state machine or batch aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub window_count: usize,
}

/// Drift label projected back onto an original observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLabel {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub drift: bool,
    /// Largest statistic among overlapping drift windows
    pub score: Option<f64>,
}
