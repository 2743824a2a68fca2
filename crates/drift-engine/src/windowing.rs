//! Evaluation windows over a series.
//!
//! Windows are contiguous, non-overlapping in cadence and fully determined by
//! (series min, series max, duration): `end` runs over
//! `t_min + w, t_min + 2w, ...` up to and including `t_max`, `start = end - w`.

use chrono::{DateTime, Duration, Utc};

use drift_core::{DriftError, Observation, Series, Window};

#[derive(Debug, Clone, Copy)]
pub struct WindowScheduler {
    duration: Duration,
}

impl WindowScheduler {
    pub fn new(duration: Duration) -> Result<Self, DriftError> {
        if duration <= Duration::zero() {
            return Err(DriftError::InvalidWindow(format!(
                "window must be positive, got {}s",
                duration.num_seconds()
            )));
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Ordered windows for the series. Empty when the series does not span
    /// at least one full window.
    pub fn windows(&self, series: &Series) -> Vec<Window> {
        let (Some(t_min), Some(t_max)) = (series.min_timestamp(), series.max_timestamp()) else {
            return Vec::new();
        };
        self.windows_between(t_min, t_max)
    }

    pub fn windows_between(&self, t_min: DateTime<Utc>, t_max: DateTime<Utc>) -> Vec<Window> {
        let mut windows = Vec::new();
        let mut step: i32 = 1;
        loop {
            let Some(end) = self
                .duration
                .checked_mul(step)
                .and_then(|offset| t_min.checked_add_signed(offset))
            else {
                break;
            };
            if end > t_max {
                break;
            }
            windows.push(Window {
                index: windows.len(),
                start: end - self.duration,
                end,
            });
            step += 1;
        }
        windows
    }

    /// Points with `start <= ts <= end`.
    pub fn current<'a>(&self, series: &'a Series, window: &Window) -> &'a [Observation] {
        let obs = series.observations();
        let lo = obs.partition_point(|o| o.timestamp < window.start);
        let hi = obs.partition_point(|o| o.timestamp <= window.end);
        &obs[lo..hi]
    }

    /// Points strictly before the window start.
    pub fn history<'a>(&self, series: &'a Series, window: &Window) -> &'a [Observation] {
        let obs = series.observations();
        let hi = obs.partition_point(|o| o.timestamp < window.start);
        &obs[..hi]
    }
}
