//! CSV input and output for the runner.
//!
//! Input is one wide table: a `date_time` column plus one numeric column per
//! variable. Output is three flat tables per variable.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use drift_core::{DriftState, Observation, Series, Verdict};
use drift_engine::DetectionReport;

pub const TIMESTAMP_COLUMN: &str = "date_time";

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// RFC 3339, then naive date-times (read as UTC), then bare dates.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Empty or non-numeric cells are missing values.
fn parse_value(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

/// Header names other than the timestamp column.
pub fn variable_columns<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = reader.headers().context("failed to read CSV header")?;
    if !headers.iter().any(|h| h.trim() == TIMESTAMP_COLUMN) {
        bail!("CSV has no '{}' column", TIMESTAMP_COLUMN);
    }
    Ok(headers
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| h != TIMESTAMP_COLUMN)
        .collect())
}

/// One series per requested column (all variable columns when `columns` is
/// empty), in the requested order.
pub fn read_series<R: Read>(reader: R, columns: &[String]) -> Result<Vec<Series>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .context("failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let Some(ts_idx) = headers.iter().position(|h| h == TIMESTAMP_COLUMN) else {
        bail!("CSV has no '{}' column", TIMESTAMP_COLUMN);
    };

    let wanted: Vec<String> = if columns.is_empty() {
        headers.iter().filter(|h| *h != TIMESTAMP_COLUMN).cloned().collect()
    } else {
        columns.to_vec()
    };
    let indices = wanted
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("column '{}' not found in CSV", name))
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut observations: Vec<Vec<Observation>> = vec![Vec::new(); wanted.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV record {}", row + 1))?;
        let raw_ts = record.get(ts_idx).unwrap_or("");
        let Some(timestamp) = parse_timestamp(raw_ts) else {
            bail!("unparseable {} '{}' in record {}", TIMESTAMP_COLUMN, raw_ts, row + 1);
        };
        for (slot, &idx) in observations.iter_mut().zip(&indices) {
            let value = record.get(idx).map(parse_value).unwrap_or(f64::NAN);
            slot.push(Observation::new(timestamp, value));
        }
    }

    wanted
        .into_iter()
        .zip(observations)
        .map(|(name, obs)| {
            Series::from_unsorted(name.clone(), obs)
                .with_context(|| format!("invalid series for column '{}'", name))
        })
        .collect()
}

/// Flat per-window row, one column per statistic in composite mode.
#[derive(Debug, Clone, Serialize)]
pub struct WindowRow {
    pub window_index: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub stat_value: Option<f64>,
    pub threshold: Option<f64>,
    pub raw_drift: bool,
    pub drift_flag: bool,
    pub state: DriftState,
    pub episode_id: Option<u32>,
    pub n_reference: usize,
    pub n_current: usize,
    pub psi: Option<f64>,
    pub ks: Option<f64>,
    pub ks_pvalue: Option<f64>,
    pub wasserstein: Option<f64>,
    pub mannwhitney_pvalue: Option<f64>,
}

impl From<&Verdict> for WindowRow {
    fn from(v: &Verdict) -> Self {
        let metrics = v.metrics.unwrap_or_default();
        Self {
            window_index: v.window.index,
            window_start: v.window.start,
            window_end: v.window.end,
            stat_value: v.stat_value,
            threshold: v.threshold,
            raw_drift: v.raw_drift,
            drift_flag: v.drift_flag,
            state: v.state,
            episode_id: v.episode_id,
            n_reference: v.n_reference,
            n_current: v.n_current,
            psi: metrics.psi,
            ks: metrics.ks,
            ks_pvalue: metrics.ks_pvalue,
            wasserstein: metrics.wasserstein,
            mannwhitney_pvalue: metrics.mannwhitney_pvalue,
        }
    }
}

pub const WINDOW_COLUMNS: &[&str] = &[
    "window_index",
    "window_start",
    "window_end",
    "stat_value",
    "threshold",
    "raw_drift",
    "drift_flag",
    "state",
    "episode_id",
    "n_reference",
    "n_current",
    "psi",
    "ks",
    "ks_pvalue",
    "wasserstein",
    "mannwhitney_pvalue",
];
pub const EPISODE_COLUMNS: &[&str] = &["episode_id", "start_time", "end_time", "window_count"];
pub const POINT_COLUMNS: &[&str] = &["timestamp", "value", "drift", "score"];

/// Header first, so a table with no rows still names its columns.
pub fn write_rows<W: Write, T: Serialize>(
    writer: W,
    columns: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(columns).context("failed to write CSV header")?;
    for row in rows {
        writer.serialize(row).context("failed to write CSV row")?;
    }
    writer.flush().context("failed to flush CSV output")?;
    Ok(())
}

fn write_file<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_rows(file, columns, rows).with_context(|| format!("failed to write {}", path.display()))
}

/// File-name stem for a variable: anything but ASCII alphanumerics, `-`,
/// `_` and `.` becomes `_`, so the name can never leave the output directory.
pub fn file_stem(variable: &str) -> String {
    let stem: String = variable
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.chars().all(|c| c == '.') {
        format!("_{}", stem)
    } else {
        stem
    }
}

/// Write `<var>_windows.csv`, `<var>_episodes.csv` and `<var>_points.csv`.
pub fn write_report(dir: &Path, report: &DetectionReport) -> Result<Vec<PathBuf>> {
    let stem = file_stem(&report.variable);
    let windows = dir.join(format!("{}_windows.csv", stem));
    let episodes = dir.join(format!("{}_episodes.csv", stem));
    let points = dir.join(format!("{}_points.csv", stem));

    write_file(&windows, WINDOW_COLUMNS, report.verdicts.iter().map(WindowRow::from))?;
    write_file(&episodes, EPISODE_COLUMNS, report.episodes.iter())?;
    write_file(&points, POINT_COLUMNS, report.points.iter())?;

    Ok(vec![windows, episodes, points])
}
