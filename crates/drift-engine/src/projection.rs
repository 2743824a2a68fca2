//! Flag Projection and Episode Aggregation
//!
//! Pure functions over a finished verdict sequence: point-level labels on the
//! original timestamps, online episode summaries (by `episode_id`) and the
//! batch, gap-tolerant episode grouping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drift_core::{EpisodePolicy, EpisodeSummary, PointLabel, Series, Verdict};

/// Label every observation of the series. A point is drifting if any
/// drift-flagged window covers it; its score is the largest statistic among
/// those windows.
pub fn project_points(series: &Series, verdicts: &[Verdict]) -> Vec<PointLabel> {
    let obs = series.observations();
    let mut labels: Vec<PointLabel> = obs
        .iter()
        .map(|o| PointLabel {
            timestamp: o.timestamp,
            value: o.value,
            drift: false,
            score: None,
        })
        .collect();

    for verdict in verdicts.iter().filter(|v| v.drift_flag) {
        let lo = obs.partition_point(|o| o.timestamp < verdict.window.start);
        let hi = obs.partition_point(|o| o.timestamp <= verdict.window.end);
        for label in &mut labels[lo..hi] {
            label.drift = true;
            if let Some(stat) = verdict.stat_value {
                label.score = Some(label.score.map_or(stat, |s| s.max(stat)));
            }
        }
    }

    labels
}

/// Episodes as assigned by the state machine.
pub fn summarize_online_episodes(verdicts: &[Verdict]) -> Vec<EpisodeSummary> {
    let mut episodes: Vec<EpisodeSummary> = Vec::new();
    for verdict in verdicts {
        let Some(id) = verdict.episode_id else {
            continue;
        };
        match episodes.last_mut() {
            Some(ep) if ep.episode_id == id => {
                ep.start_time = ep.start_time.min(verdict.window.start);
                ep.end_time = ep.end_time.max(verdict.window.end);
                ep.window_count += 1;
            }
            _ => episodes.push(EpisodeSummary {
                episode_id: id,
                start_time: verdict.window.start,
                end_time: verdict.window.end,
                window_count: 1,
            }),
        }
    }
    episodes
}

/// Minimal per-window row consumed by batch aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLabel {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub drifting: bool,
}

/// Batch labels from the raw per-window crossing, ignoring hysteresis.
pub fn batch_labels(verdicts: &[Verdict]) -> Vec<WindowLabel> {
    verdicts
        .iter()
        .map(|v| WindowLabel {
            index: v.window.index,
            start: v.window.start,
            end: v.window.end,
            drifting: v.raw_drift,
        })
        .collect()
}

/// Group drifting window indices into runs, merging runs separated by at
/// most `max_gap` indices, then drop runs spanning fewer than
/// `min_consecutive` windows. Episodes are numbered from 1.
pub fn aggregate_episodes(labels: &[WindowLabel], policy: &EpisodePolicy) -> Vec<EpisodeSummary> {
    let mut drifting: Vec<usize> = labels.iter().filter(|l| l.drifting).map(|l| l.index).collect();
    drifting.sort_unstable();
    drifting.dedup();

    let Some((&first, rest)) = drifting.split_first() else {
        return Vec::new();
    };

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let (mut run_start, mut run_end) = (first, first);
    for &idx in rest {
        // Windows strictly between the two drifting indices
        if idx - run_end - 1 <= policy.max_gap {
            run_end = idx;
        } else {
            runs.push((run_start, run_end));
            run_start = idx;
            run_end = idx;
        }
    }
    runs.push((run_start, run_end));

    runs.into_iter()
        .filter(|(lo, hi)| hi - lo + 1 >= policy.min_consecutive)
        .filter_map(|(lo, hi)| {
            let covered = labels.iter().filter(|l| l.index >= lo && l.index <= hi);
            let start_time = covered.clone().map(|l| l.start).min()?;
            let end_time = covered.map(|l| l.end).max()?;
            Some((start_time, end_time, hi - lo + 1))
        })
        .enumerate()
        .map(|(i, (start_time, end_time, window_count))| EpisodeSummary {
            episode_id: i as u32 + 1,
            start_time,
            end_time,
            window_count,
        })
        .collect()
}
