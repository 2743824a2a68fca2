use chrono::{DateTime, Duration, TimeZone, Utc};

use drift_core::{
    DriftConfig, DriftConfigFile, DriftError, DriftState, EpisodeSource, Metric, Observation,
    ReferenceStrategy, Series,
};

use crate::detector::{detect_all, DriftDetector};

/// Helper: Monday 2024-05-06 00:00 UTC.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()
}

/// Helper: low-discrepancy filler in [0, 1), deterministic and evenly spread.
fn filler(i: usize) -> f64 {
    (i as f64 * 0.618_033_988_75) % 1.0
}

/// Helper: one point every 10 minutes over `hours`, inclusive of both ends.
/// `value` gets the point index and its offset from `t0`.
fn ten_minutely(name: &str, hours: i64, value: impl Fn(usize, Duration) -> f64) -> Series {
    let obs = (0..=(hours * 6) as usize)
        .map(|i| {
            let offset = Duration::minutes(10 * i as i64);
            Observation::new(t0() + offset, value(i, offset))
        })
        .collect();
    Series::new(name, obs).unwrap()
}

/// Helper: +5 level shift from `from` (inclusive) to `until` (exclusive).
fn shifted(name: &str, hours: i64, from: i64, until: i64) -> Series {
    ten_minutely(name, hours, |i, offset| {
        let shift = offset >= Duration::hours(from) && offset < Duration::hours(until);
        filler(i) + if shift { 5.0 } else { 0.0 }
    })
}

/// Helper: KS on 2H windows with a decay reference and a fixed bound.
fn ks_config(hysteresis: usize) -> DriftConfig {
    DriftConfig {
        threshold_override: Some(0.5),
        hysteresis_windows: hysteresis,
        ..DriftConfig::new(Metric::Ks, ReferenceStrategy::Decay, Duration::hours(2))
    }
}

#[test]
fn test_persistent_shift_opens_one_episode() {
    let series = shifted("temp", 36, 24, 36 + 1);
    let report = DriftDetector::new(ks_config(1)).unwrap().detect(&series);

    assert_eq!(report.verdicts.len(), 18);

    // First window has no history before it
    let first = &report.verdicts[0];
    assert_eq!(first.stat_value, None);
    assert_eq!(first.state, DriftState::Normal);
    assert_eq!(first.n_reference, 0);

    for v in &report.verdicts[1..12] {
        assert!(v.is_scored(), "window {} should be scored", v.window.index);
        assert!(!v.drift_flag, "window {} should be normal", v.window.index);
        assert_eq!(v.episode_id, None);
    }
    for v in &report.verdicts[12..] {
        assert!(v.drift_flag, "window {} should drift", v.window.index);
        assert_eq!(v.episode_id, Some(1));
        assert_eq!(v.threshold, Some(0.5));
    }

    assert_eq!(report.episodes.len(), 1);
    assert_eq!(report.episodes[0].start_time, t0() + Duration::hours(24));
    assert_eq!(report.episodes[0].end_time, t0() + Duration::hours(36));
    assert_eq!(report.episodes[0].window_count, 6);
}

#[test]
fn test_points_follow_drift_windows() {
    let series = shifted("temp", 36, 24, 36 + 1);
    let report = DriftDetector::new(ks_config(1)).unwrap().detect(&series);

    assert_eq!(report.points.len(), series.len());
    for p in &report.points {
        let after_shift = p.timestamp >= t0() + Duration::hours(24);
        assert_eq!(p.drift, after_shift, "point at {}", p.timestamp);
        assert_eq!(p.score.is_some(), after_shift);
    }
}

#[test]
fn test_hysteresis_holds_drift_after_recovery() {
    let series = shifted("temp", 36, 24, 28);

    let report = DriftDetector::new(ks_config(3)).unwrap().detect(&series);
    let raw: Vec<usize> = report
        .verdicts
        .iter()
        .filter(|v| v.raw_drift)
        .map(|v| v.window.index)
        .collect();
    let flagged: Vec<usize> = report
        .verdicts
        .iter()
        .filter(|v| v.drift_flag)
        .map(|v| v.window.index)
        .collect();

    assert_eq!(raw, vec![12, 13]);
    // Three calm windows (14, 15, 16) are needed; the third one exits
    assert_eq!(flagged, vec![12, 13, 14, 15]);

    let quick = DriftDetector::new(ks_config(1)).unwrap().detect(&series);
    let quick_flagged: Vec<usize> = quick
        .verdicts
        .iter()
        .filter(|v| v.drift_flag)
        .map(|v| v.window.index)
        .collect();
    assert_eq!(quick_flagged, vec![12, 13]);
}

#[test]
fn test_episode_sources_disagree_under_hysteresis() {
    let series = shifted("temp", 36, 24, 28);

    let online = DriftDetector::new(ks_config(3)).unwrap().detect(&series);
    assert_eq!(online.episode_source, EpisodeSource::Online);
    assert_eq!(online.episodes.len(), 1);
    assert_eq!(online.episodes[0].window_count, 4);

    let mut config = ks_config(3);
    config.episodes.source = EpisodeSource::Batch;
    let batch = DriftDetector::new(config).unwrap().detect(&series);
    assert_eq!(batch.episode_source, EpisodeSource::Batch);
    assert_eq!(batch.episodes.len(), 1);
    assert_eq!(batch.episodes[0].episode_id, 1);
    assert_eq!(batch.episodes[0].window_count, 2);
    assert_eq!(batch.episodes[0].start_time, t0() + Duration::hours(24));
    assert_eq!(batch.episodes[0].end_time, t0() + Duration::hours(28));
}

#[test]
fn test_missing_data_carries_state_forward() {
    // Shift from 20h; values missing strictly between 22h and 28h
    let series = ten_minutely("flow", 30, |i, offset| {
        if offset > Duration::hours(22) && offset < Duration::hours(28) {
            return f64::NAN;
        }
        filler(i) + if offset >= Duration::hours(20) { 5.0 } else { 0.0 }
    });
    let report = DriftDetector::new(ks_config(1)).unwrap().detect(&series);

    let entered = &report.verdicts[10];
    assert!(entered.drift_flag);
    assert_eq!(entered.episode_id, Some(1));

    for v in &report.verdicts[11..14] {
        assert_eq!(v.stat_value, None, "window {}", v.window.index);
        assert_eq!(v.threshold, None);
        assert!(!v.raw_drift);
        assert!(v.n_current < 5);
        assert!(v.drift_flag);
        assert_eq!(v.episode_id, Some(1));
    }

    let resumed = &report.verdicts[14];
    assert!(resumed.is_scored());
    assert!(resumed.drift_flag);
    assert_eq!(resumed.episode_id, Some(1));
    assert_eq!(report.episodes.len(), 1);
}

#[test]
fn test_composite_mode_reports_every_statistic() {
    let series = shifted("temp", 36, 24, 36 + 1);
    let config = DriftConfig {
        hysteresis_windows: 1,
        ..DriftConfig::new(Metric::Composite, ReferenceStrategy::Decay, Duration::hours(2))
    };
    let report = DriftDetector::new(config).unwrap().detect(&series);

    for v in report.verdicts.iter().filter(|v| v.is_scored()) {
        let metrics = v.metrics.expect("composite verdicts carry metrics");
        // Window 12 is the first one entirely above the reference range
        assert_eq!(metrics.psi.is_none(), v.window.index == 12);
        assert!(metrics.ks.is_some());
        assert!(metrics.ks_pvalue.is_some());
        assert!(metrics.wasserstein.is_some());
        assert!(metrics.mannwhitney_pvalue.is_some());
        assert_eq!(v.threshold, Some(1.0));
    }

    let shifted_window = &report.verdicts[12];
    assert!(shifted_window.raw_drift);
    assert!(shifted_window.stat_value.unwrap() >= 1.0);
}

#[test]
fn test_composite_drift_only_when_a_statistic_crosses() {
    let series = ten_minutely("steady", 36, |i, _| filler(i));
    let config = DriftConfig::new(Metric::Composite, ReferenceStrategy::Decay, Duration::hours(2));
    let report = DriftDetector::new(config).unwrap().detect(&series);

    let mut scored = 0;
    for v in report.verdicts.iter().filter(|v| v.is_scored()) {
        scored += 1;
        let m = v.metrics.unwrap();
        let crossed = m.psi.map_or(false, |x| x >= 0.2)
            || m.ks.map_or(false, |x| x >= 0.1)
            || m.wasserstein.map_or(false, |x| x >= 0.5)
            || m.mannwhitney_pvalue.map_or(false, |x| x <= 0.05);
        assert_eq!(v.raw_drift, crossed, "window {}", v.window.index);
    }
    assert!(scored > 0);
}

#[test]
fn test_composite_with_single_threshold_is_rejected() {
    let config = DriftConfig {
        threshold_override: Some(0.05),
        ..DriftConfig::new(Metric::Composite, ReferenceStrategy::Decay, Duration::hours(2))
    };
    let err = DriftDetector::new(config).unwrap_err();
    assert!(matches!(err, DriftError::InvalidConfig(_)));
}

#[test]
fn test_batch_episodes_with_extreme_policy() {
    let series = shifted("temp", 36, 24, 28);

    let mut config = ks_config(1);
    config.episodes.source = EpisodeSource::Batch;
    config.episodes.max_gap = usize::MAX;
    config.episodes.min_consecutive = 0;
    let merged = DriftDetector::new(config.clone()).unwrap().detect(&series);
    assert_eq!(merged.episodes.len(), 1);
    assert_eq!(merged.episodes[0].window_count, 2);

    config.episodes.min_consecutive = usize::MAX;
    let none = DriftDetector::new(config).unwrap().detect(&series);
    assert!(none.episodes.is_empty());
}

#[test]
fn test_seasonal_without_matching_slots_uses_full_history() {
    let series = shifted("temp", 36, 24, 36 + 1);
    let config = DriftConfig {
        threshold_override: Some(0.5),
        ..DriftConfig::new(Metric::Ks, ReferenceStrategy::Seasonal, Duration::hours(2))
    };
    let report = DriftDetector::new(config).unwrap().detect(&series);

    // Window 12 ends Tuesday 02:00; no Tuesday rows exist before 24h
    let v = &report.verdicts[12];
    assert_eq!(v.n_reference, 144);
    assert!(v.raw_drift);
}

#[test]
fn test_single_point_series() {
    let series = Series::new("x", vec![Observation::new(t0(), 1.0)]).unwrap();
    let report = DriftDetector::new(DriftConfig::default()).unwrap().detect(&series);
    assert!(report.verdicts.is_empty());
    assert!(report.episodes.is_empty());
    assert_eq!(report.points.len(), 1);
    assert!(!report.points[0].drift);
}

#[test]
fn test_invalid_configuration_fails_fast() {
    let file = DriftConfigFile {
        metric: "entropy".to_string(),
        ..DriftConfigFile::default()
    };
    assert_eq!(file.validate().unwrap_err(), DriftError::UnknownMetric("entropy".to_string()));

    let zero_window = DriftConfig {
        window: Duration::zero(),
        ..DriftConfig::default()
    };
    assert!(DriftDetector::new(zero_window).unwrap_err().is_input_shape());

    let no_hysteresis = DriftConfig {
        hysteresis_windows: 0,
        ..DriftConfig::default()
    };
    assert!(DriftDetector::new(no_hysteresis).unwrap_err().is_configuration());
}

#[test]
fn test_detect_all_keeps_variable_order() {
    let series = vec![
        shifted("a", 36, 24, 36 + 1),
        shifted("b", 36, 40, 41),
        shifted("c", 36, 24, 28),
    ];
    let results = detect_all(&ks_config(1), &series);

    let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    let reports: Vec<_> = results.into_iter().map(|(_, r)| r.unwrap()).collect();
    assert_eq!(reports[0].episodes.len(), 1);
    assert!(reports[1].episodes.is_empty());
    assert_eq!(reports[2].drift_windows(), 2);
}

#[test]
fn test_detection_is_deterministic() {
    let series = shifted("temp", 36, 24, 28);
    let detector = DriftDetector::new(ks_config(2)).unwrap();
    let first = detector.detect(&series);
    let second = detector.detect(&series);
    assert_eq!(first.verdicts, second.verdicts);
    assert_eq!(first.episodes, second.episodes);
}
