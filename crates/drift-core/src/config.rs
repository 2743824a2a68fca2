//! Drift configuration
//!
//! `DriftConfigFile` is the string-tagged form read from JSON. `validate()`
//! turns it into a typed `DriftConfig`, rejecting unknown metric, strategy
//! and statistic names before any window is processed.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{DriftError, Metric, ReferenceStrategy, Statistic};

/// Parse a pandas-style offset such as "24H", "30min" or "7d".
pub fn parse_duration(text: &str) -> Result<Duration, DriftError> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DriftError::InvalidWindow(format!("'{}' has no unit", text)))?;
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(DriftError::InvalidWindow(format!("'{}' has no magnitude", text)));
    }
    let amount: i64 = number
        .parse()
        .map_err(|_| DriftError::InvalidWindow(format!("'{}' is not a number", number)))?;

    let unit_seconds: i64 = match unit.trim() {
        "s" | "S" | "sec" => 1,
        "min" | "m" | "T" => 60,
        "h" | "H" => 3_600,
        "d" | "D" => 86_400,
        "w" | "W" => 604_800,
        other => {
            return Err(DriftError::InvalidWindow(format!(
                "unsupported unit '{}' in '{}'",
                other, text
            )))
        }
    };

    let seconds = amount
        .checked_mul(unit_seconds)
        .ok_or_else(|| DriftError::InvalidWindow(format!("'{}' overflows", text)))?;
    if seconds <= 0 {
        return Err(DriftError::InvalidWindow(format!("'{}' must be positive", text)));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| DriftError::InvalidWindow(format!("'{}' is out of range", text)))
}

/// Render a duration with the largest unit that divides it exactly.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    for (unit, size) in [("W", 604_800), ("D", 86_400), ("H", 3_600), ("min", 60)] {
        if seconds != 0 && seconds % size == 0 {
            return format!("{}{}", seconds / size, unit);
        }
    }
    format!("{}s", seconds)
}

/// Decision boundaries per metric, built once per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub psi: f64,
    pub ks: f64,
    /// Wasserstein threshold = factor * std(reference)
    pub wasserstein_factor: f64,
    /// Wasserstein threshold when the reference has no spread
    pub fallback_std: f64,
    /// Anything without a dedicated rule
    pub generic: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            psi: 0.25,
            ks: 0.15,
            wasserstein_factor: 0.6,
            fallback_std: 0.5,
            generic: 0.25,
        }
    }
}

impl ThresholdPolicy {
    /// Looser PSI/KS bounds used by the single-metric profile.
    pub fn simple() -> Self {
        Self {
            psi: 0.2,
            ks: 0.1,
            ..Self::default()
        }
    }

    pub fn from_profile(name: &str) -> Result<Self, DriftError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Ok(Self::default()),
            "simple" => Ok(Self::simple()),
            other => Err(DriftError::InvalidConfig(format!(
                "unknown threshold profile '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    pub half_life: Duration,
    pub target_mass: f64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            half_life: Duration::days(7),
            target_mass: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoldenParams {
    pub sub_window: Duration,
    pub step: Duration,
    /// Number of most stable sub-windows kept
    pub k: usize,
}

impl Default for GoldenParams {
    fn default() -> Self {
        Self {
            sub_window: Duration::minutes(30),
            step: Duration::minutes(10),
            k: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalParams {
    pub weeks_back: u32,
}

impl Default for SeasonalParams {
    fn default() -> Self {
        Self { weeks_back: 12 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReferenceParams {
    pub decay: DecayParams,
    pub golden: GoldenParams,
    pub seasonal: SeasonalParams,
}

/// Which episode definition a deployment treats as authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeSource {
    /// Episode ids assigned by the hysteresis state machine
    #[default]
    Online,
    /// Gap-tolerant grouping of raw drift windows
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodePolicy {
    pub source: EpisodeSource,
    pub min_consecutive: usize,
    pub max_gap: usize,
}

impl Default for EpisodePolicy {
    fn default() -> Self {
        Self {
            source: EpisodeSource::Online,
            min_consecutive: 2,
            max_gap: 1,
        }
    }
}

/// Statistics evaluated in composite mode. A `None` threshold is resolved
/// from the `ThresholdPolicy` at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeThresholds {
    pub entries: BTreeMap<Statistic, Option<f64>>,
}

impl Default for CompositeThresholds {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Statistic::Psi, Some(0.2));
        entries.insert(Statistic::Ks, Some(0.1));
        entries.insert(Statistic::Wasserstein, Some(0.5));
        entries.insert(Statistic::MannWhitneyPValue, Some(0.05));
        Self { entries }
    }
}

/// Typed, validated configuration for one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftConfig {
    pub metric: Metric,
    pub strategy: ReferenceStrategy,
    pub window: Duration,
    /// Always wins over the policy when set
    pub threshold_override: Option<f64>,
    /// Minimum valid current-window points to be scorable
    pub min_points: usize,
    /// Consecutive non-drift windows needed to leave an episode
    pub hysteresis_windows: usize,
    pub thresholds: ThresholdPolicy,
    pub psi_bins: usize,
    pub reference: ReferenceParams,
    pub composite: CompositeThresholds,
    pub episodes: EpisodePolicy,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Ks,
            strategy: ReferenceStrategy::Golden,
            window: Duration::hours(24),
            threshold_override: None,
            min_points: 5,
            hysteresis_windows: 1,
            thresholds: ThresholdPolicy::default(),
            psi_bins: 10,
            reference: ReferenceParams::default(),
            composite: CompositeThresholds::default(),
            episodes: EpisodePolicy::default(),
        }
    }
}

impl DriftConfig {
    pub fn new(metric: Metric, strategy: ReferenceStrategy, window: Duration) -> Self {
        Self {
            metric,
            strategy,
            window,
            ..Self::default()
        }
    }

    /// Check ranges that the type system does not enforce.
    pub fn validate(&self) -> Result<(), DriftError> {
        if self.window <= Duration::zero() {
            return Err(DriftError::InvalidWindow(format!(
                "window must be positive, got {}s",
                self.window.num_seconds()
            )));
        }
        if self.hysteresis_windows == 0 {
            return Err(DriftError::InvalidConfig(
                "hysteresis_windows must be at least 1".to_string(),
            ));
        }
        if self.psi_bins == 0 {
            return Err(DriftError::InvalidConfig("psi_bins must be at least 1".to_string()));
        }
        if let Some(thr) = self.threshold_override {
            if !thr.is_finite() {
                return Err(DriftError::InvalidConfig(format!(
                    "threshold override must be finite, got {}",
                    thr
                )));
            }
        }

        let decay = &self.reference.decay;
        if decay.half_life <= Duration::zero() {
            return Err(DriftError::InvalidConfig("decay half-life must be positive".to_string()));
        }
        if !(decay.target_mass > 0.0 && decay.target_mass <= 1.0) {
            return Err(DriftError::InvalidConfig(format!(
                "decay target_mass must be in (0, 1], got {}",
                decay.target_mass
            )));
        }

        let golden = &self.reference.golden;
        if golden.sub_window <= Duration::zero() || golden.step <= Duration::zero() {
            return Err(DriftError::InvalidConfig(
                "golden sub_window and step must be positive".to_string(),
            ));
        }
        if golden.k == 0 {
            return Err(DriftError::InvalidConfig("golden k must be at least 1".to_string()));
        }

        if self.reference.seasonal.weeks_back == 0 {
            return Err(DriftError::InvalidConfig(
                "seasonal weeks_back must be at least 1".to_string(),
            ));
        }

        if self.metric == Metric::Composite {
            if self.composite.entries.is_empty() {
                return Err(DriftError::InvalidConfig(
                    "composite mode needs at least one statistic threshold".to_string(),
                ));
            }
            if self.threshold_override.is_some() {
                return Err(DriftError::InvalidConfig(
                    "composite mode takes per-statistic composite_thresholds, not a single threshold"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecaySection {
    pub half_life_hours: u32,
    pub target_mass: f64,
}

impl Default for DecaySection {
    fn default() -> Self {
        Self {
            half_life_hours: 24 * 7,
            target_mass: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldenSection {
    pub sub_window: String,
    pub step: String,
    pub k: usize,
}

impl Default for GoldenSection {
    fn default() -> Self {
        Self {
            sub_window: "30min".to_string(),
            step: "10min".to_string(),
            k: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalSection {
    pub weeks_back: u32,
}

impl Default for SeasonalSection {
    fn default() -> Self {
        Self { weeks_back: 12 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodesSection {
    pub source: String,
    pub min_consecutive: usize,
    pub max_gap: usize,
}

impl Default for EpisodesSection {
    fn default() -> Self {
        Self {
            source: "online".to_string(),
            min_consecutive: 2,
            max_gap: 1,
        }
    }
}

/// Raw per-variable configuration as stored in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfigFile {
    pub metric: String,
    pub strategy: String,
    pub window: String,
    pub threshold: Option<f64>,
    pub min_points: usize,
    pub hysteresis_windows: usize,
    pub threshold_profile: String,
    pub psi_bins: usize,
    pub decay: DecaySection,
    pub golden: GoldenSection,
    pub seasonal: SeasonalSection,
    pub composite_thresholds: BTreeMap<String, Option<f64>>,
    pub episodes: EpisodesSection,
}

impl Default for DriftConfigFile {
    fn default() -> Self {
        let composite_thresholds = CompositeThresholds::default()
            .entries
            .into_iter()
            .map(|(stat, thr)| (stat.as_str().to_string(), thr))
            .collect();

        Self {
            metric: "ks".to_string(),
            strategy: "golden".to_string(),
            window: "24H".to_string(),
            threshold: None,
            min_points: 5,
            hysteresis_windows: 1,
            threshold_profile: "default".to_string(),
            psi_bins: 10,
            decay: DecaySection::default(),
            golden: GoldenSection::default(),
            seasonal: SeasonalSection::default(),
            composite_thresholds,
            episodes: EpisodesSection::default(),
        }
    }
}

impl DriftConfigFile {
    pub fn validate(&self) -> Result<DriftConfig, DriftError> {
        let metric: Metric = self.metric.parse()?;
        let strategy: ReferenceStrategy = self.strategy.parse()?;
        let window = parse_duration(&self.window)?;

        let mut entries = BTreeMap::new();
        for (name, thr) in &self.composite_thresholds {
            entries.insert(name.parse::<Statistic>()?, *thr);
        }

        let source = match self.episodes.source.trim().to_ascii_lowercase().as_str() {
            "online" => EpisodeSource::Online,
            "batch" => EpisodeSource::Batch,
            other => {
                return Err(DriftError::InvalidConfig(format!(
                    "unknown episode source '{}'",
                    other
                )))
            }
        };

        let half_life = Duration::try_hours(i64::from(self.decay.half_life_hours))
            .ok_or_else(|| DriftError::InvalidConfig("decay half-life out of range".to_string()))?;

        let config = DriftConfig {
            metric,
            strategy,
            window,
            threshold_override: self.threshold,
            min_points: self.min_points,
            hysteresis_windows: self.hysteresis_windows,
            thresholds: ThresholdPolicy::from_profile(&self.threshold_profile)?,
            psi_bins: self.psi_bins,
            reference: ReferenceParams {
                decay: DecayParams {
                    half_life,
                    target_mass: self.decay.target_mass,
                },
                golden: GoldenParams {
                    sub_window: parse_duration(&self.golden.sub_window)
                        .map_err(|e| DriftError::InvalidConfig(format!("golden sub_window: {}", e)))?,
                    step: parse_duration(&self.golden.step)
                        .map_err(|e| DriftError::InvalidConfig(format!("golden step: {}", e)))?,
                    k: self.golden.k,
                },
                seasonal: SeasonalParams {
                    weeks_back: self.seasonal.weeks_back,
                },
            },
            composite: CompositeThresholds { entries },
            episodes: EpisodePolicy {
                source,
                min_consecutive: self.episodes.min_consecutive,
                max_gap: self.episodes.max_gap,
            },
        };

        config.validate()?;
        Ok(config)
    }
}
