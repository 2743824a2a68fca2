//! Reference Sample Construction
//!
//! Three strategies derive a baseline sample from the history that precedes
//! an evaluation window. `history` is always chronological and is never
//! modified; each strategy returns a fresh subset of it.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use tracing::debug;

use drift_core::{DecayParams, GoldenParams, Observation, ReferenceParams, ReferenceStrategy, SeasonalParams};

use crate::sample::{quantile_sorted, sorted_finite};

/// Guards the relative-spread denominator against a zero median.
const SPREAD_EPSILON: f64 = 1e-12;

/// Minimum rows in a golden sub-window before it is scored.
const GOLDEN_MIN_ROWS: usize = 3;

/// A way of picking a reference sample out of history.
pub trait ReferenceSelector {
    /// Selected rows in chronological order. Empty means "no opinion" and
    /// lets the caller fall back to the full history.
    fn select(&self, history: &[Observation], now: DateTime<Utc>) -> Vec<Observation>;
}

/// Recency-weighted prefix.
///
/// Each point gets weight `exp(-dt / tau)` with `tau = half_life / ln 2`.
/// Walking from the newest point backwards, the shortest run whose
/// normalized cumulative weight reaches `target_mass` is kept; everything
/// older is dropped.
#[derive(Debug, Clone, Copy)]
pub struct DecayReference {
    params: DecayParams,
}

impl DecayReference {
    pub fn new(params: DecayParams) -> Self {
        Self { params }
    }

    fn tau_seconds(&self) -> f64 {
        seconds(self.params.half_life) / std::f64::consts::LN_2
    }

    /// Unnormalized weights, newest first.
    fn recency_weights(&self, history: &[Observation], anchor: DateTime<Utc>) -> Vec<f64> {
        let tau = self.tau_seconds();
        history
            .iter()
            .rev()
            .map(|o| (-seconds(anchor - o.timestamp) / tau).exp())
            .collect()
    }
}

impl ReferenceSelector for DecayReference {
    fn select(&self, history: &[Observation], now: DateTime<Utc>) -> Vec<Observation> {
        let Some(latest) = history.last() else {
            return Vec::new();
        };

        // Normalized weights do not depend on `now`; anchoring at the newest
        // point keeps them away from underflow for long gaps.
        let anchor = if now < latest.timestamp { now } else { latest.timestamp };
        let weights = self.recency_weights(history, anchor);
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Vec::new();
        }

        let mut cumulative = 0.0;
        let mut cut = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w / total;
            if cumulative >= self.params.target_mass {
                cut = i;
                break;
            }
        }

        history[history.len() - (cut + 1)..].to_vec()
    }
}

/// Most stable historical sub-windows.
///
/// A short sub-window slides over history; each one with enough rows is
/// scored by its relative interquartile spread `IQR / (|median| + eps)`.
/// Rows of the `k` lowest-scored sub-windows are kept, once each, in time
/// order.
#[derive(Debug, Clone, Copy)]
pub struct GoldenReference {
    params: GoldenParams,
}

#[derive(Debug, Clone, Copy)]
struct ScoredSpan {
    lo: usize,
    hi: usize,
    score: f64,
}

impl GoldenReference {
    pub fn new(params: GoldenParams) -> Self {
        Self { params }
    }

    fn scored_spans(&self, history: &[Observation]) -> Vec<ScoredSpan> {
        let (Some(first), Some(last)) = (history.first(), history.last()) else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut start = first.timestamp;
        while let Some(end) = start.checked_add_signed(self.params.sub_window) {
            if end > last.timestamp {
                break;
            }
            let lo = history.partition_point(|o| o.timestamp < start);
            let hi = history.partition_point(|o| o.timestamp < end);
            if hi - lo >= GOLDEN_MIN_ROWS {
                spans.push(ScoredSpan {
                    lo,
                    hi,
                    score: stability_score(&history[lo..hi]),
                });
            }
            match start.checked_add_signed(self.params.step) {
                Some(next) => start = next,
                None => break,
            }
        }
        spans
    }
}

impl ReferenceSelector for GoldenReference {
    fn select(&self, history: &[Observation], _now: DateTime<Utc>) -> Vec<Observation> {
        let mut spans = self.scored_spans(history);
        if spans.is_empty() {
            return Vec::new();
        }

        // NaN scores rank after every finite score.
        spans.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
            (false, false) => a.score.total_cmp(&b.score),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        });

        let mut keep = vec![false; history.len()];
        for span in spans.iter().take(self.params.k) {
            keep[span.lo..span.hi].iter_mut().for_each(|k| *k = true);
        }

        history
            .iter()
            .zip(keep)
            .filter_map(|(o, kept)| kept.then_some(*o))
            .collect()
    }
}

/// Relative interquartile spread of a sub-window; NaN when undefined.
fn stability_score(rows: &[Observation]) -> f64 {
    let values: Vec<f64> = rows.iter().map(|o| o.value).collect();
    let sorted = sorted_finite(&values);
    if sorted.is_empty() {
        return f64::NAN;
    }
    let median = quantile_sorted(&sorted, 0.5);
    let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);
    let spread = iqr / (median.abs() + SPREAD_EPSILON);
    if spread.is_finite() {
        spread
    } else {
        f64::NAN
    }
}

/// Rows sharing the (weekday, hour) slot of `now`, within a lookback horizon.
#[derive(Debug, Clone, Copy)]
pub struct SeasonalReference {
    params: SeasonalParams,
}

impl SeasonalReference {
    pub fn new(params: SeasonalParams) -> Self {
        Self { params }
    }
}

/// Hour-of-week, 0 = Monday 00:00.
fn week_slot(ts: DateTime<Utc>) -> u32 {
    ts.weekday().num_days_from_monday() * 24 + ts.hour()
}

impl ReferenceSelector for SeasonalReference {
    fn select(&self, history: &[Observation], now: DateTime<Utc>) -> Vec<Observation> {
        let slot = week_slot(now);
        let horizon = Duration::try_weeks(i64::from(self.params.weeks_back))
            .and_then(|lookback| now.checked_sub_signed(lookback));

        history
            .iter()
            .filter(|o| o.timestamp <= now)
            .filter(|o| horizon.map_or(true, |start| o.timestamp >= start))
            .filter(|o| week_slot(o.timestamp) == slot)
            .copied()
            .collect()
    }
}

/// Strategy dispatcher with the fall-back-to-history rule.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceBuilder {
    strategy: ReferenceStrategy,
    params: ReferenceParams,
}

impl ReferenceBuilder {
    pub fn new(strategy: ReferenceStrategy, params: ReferenceParams) -> Self {
        Self { strategy, params }
    }

    pub fn strategy(&self) -> ReferenceStrategy {
        self.strategy
    }

    /// Reference sample for a window ending at `now`. Falls back to the
    /// whole history when the strategy selects nothing.
    pub fn build(&self, history: &[Observation], now: DateTime<Utc>) -> Vec<Observation> {
        let selected = match self.strategy {
            ReferenceStrategy::Decay => DecayReference::new(self.params.decay).select(history, now),
            ReferenceStrategy::Golden => GoldenReference::new(self.params.golden).select(history, now),
            ReferenceStrategy::Seasonal => {
                SeasonalReference::new(self.params.seasonal).select(history, now)
            }
        };

        if selected.is_empty() {
            if !history.is_empty() {
                debug!(
                    strategy = %self.strategy,
                    history = history.len(),
                    "reference strategy selected nothing, using full history"
                );
            }
            return history.to_vec();
        }
        selected
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        // A Monday
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn hourly(n: usize, value: impl Fn(usize) -> f64) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation::new(start() + Duration::hours(i as i64), value(i)))
            .collect()
    }

    #[test]
    fn test_decay_keeps_recent_suffix_reaching_mass() {
        let history = hourly(1000, |i| i as f64);
        let now = history.last().unwrap().timestamp + Duration::hours(1);
        let params = DecayParams::default();
        let decay = DecayReference::new(params);
        let selected = decay.select(&history, now);

        assert!(!selected.is_empty());
        assert!(selected.len() < history.len());
        // Chronological suffix of history
        assert_eq!(selected.last(), history.last());
        assert!(selected.windows(2).all(|p| p[0].timestamp < p[1].timestamp));

        let weights = decay.recency_weights(&history, history.last().unwrap().timestamp);
        let total: f64 = weights.iter().sum();
        let mass: Vec<f64> = weights
            .iter()
            .scan(0.0, |acc, w| {
                *acc += w / total;
                Some(*acc)
            })
            .collect();
        assert!(mass[selected.len() - 1] >= 0.95);
        assert!(mass[selected.len() - 2] < 0.95);
    }

    #[test]
    fn test_decay_full_mass_keeps_everything() {
        let history = hourly(50, |i| i as f64);
        let params = DecayParams {
            half_life: Duration::hours(24),
            target_mass: 1.0,
        };
        let selected = DecayReference::new(params).select(&history, start() + Duration::days(30));
        assert_eq!(selected.len(), history.len());
    }

    #[test]
    fn test_decay_survives_long_gap_before_now() {
        let history = hourly(100, |i| i as f64);
        let now = start() + Duration::weeks(500);
        let selected = DecayReference::new(DecayParams::default()).select(&history, now);
        assert!(!selected.is_empty());
    }

    #[test]
    fn test_golden_prefers_stable_stretch() {
        // Noisy first day, flat second day, noisy third day, every 5 minutes
        let history: Vec<Observation> = (0..(3 * 288))
            .map(|i| {
                let ts = start() + Duration::minutes(5 * i as i64);
                let day = i / 288;
                let value = if day == 1 {
                    100.0 + (i % 2) as f64 * 0.01
                } else {
                    100.0 + ((i * 37) % 50) as f64
                };
                Observation::new(ts, value)
            })
            .collect();

        let params = GoldenParams {
            k: 5,
            ..GoldenParams::default()
        };
        let selected = GoldenReference::new(params).select(&history, start() + Duration::days(3));
        assert!(!selected.is_empty());
        let day_two = start() + Duration::days(1)..start() + Duration::days(2);
        assert!(selected.iter().all(|o| day_two.contains(&o.timestamp)));
        assert!(selected.windows(2).all(|p| p[0].timestamp < p[1].timestamp));
    }

    #[test]
    fn test_golden_deduplicates_overlap() {
        let history: Vec<Observation> = (0..120)
            .map(|i| Observation::new(start() + Duration::minutes(i as i64), 10.0))
            .collect();
        let selected = GoldenReference::new(GoldenParams::default()).select(&history, start());
        let mut stamps: Vec<_> = selected.iter().map(|o| o.timestamp).collect();
        let before = stamps.len();
        stamps.dedup();
        assert_eq!(before, stamps.len());
    }

    #[test]
    fn test_golden_too_short_history_is_empty() {
        let history = vec![
            Observation::new(start(), 1.0),
            Observation::new(start() + Duration::minutes(10), 1.0),
        ];
        let selected = GoldenReference::new(GoldenParams::default()).select(&history, start());
        assert!(selected.is_empty());
    }

    #[test]
    fn test_seasonal_respects_lookback() {
        // 20 weeks of hourly data
        let history = hourly(20 * 168, |i| i as f64);
        let now = start() + Duration::weeks(20) + Duration::hours(9);
        let params = SeasonalParams { weeks_back: 12 };
        let selected = SeasonalReference::new(params).select(&history, now);

        let cutoff = now - Duration::weeks(12);
        assert_eq!(selected.len(), 12);
        assert!(selected.iter().all(|o| o.timestamp >= cutoff));
        assert!(selected.iter().all(|o| week_slot(o.timestamp) == week_slot(now)));
    }

    #[test]
    fn test_builder_falls_back_to_history() {
        // Six hours of data never matches a slot three days later
        let history = hourly(6, |i| i as f64);
        let builder = ReferenceBuilder::new(ReferenceStrategy::Seasonal, ReferenceParams::default());
        let reference = builder.build(&history, start() + Duration::days(3));
        assert_eq!(reference, history);
    }

    #[test]
    fn test_builder_empty_history() {
        let builder = ReferenceBuilder::new(ReferenceStrategy::Decay, ReferenceParams::default());
        assert!(builder.build(&[], start()).is_empty());
    }
}
