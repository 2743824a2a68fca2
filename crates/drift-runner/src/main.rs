//! drift-runner: batch drift detection over a wide CSV.
//!
//! Reads a CSV with a `date_time` column, runs the drift engine on every
//! variable column with its own configuration, and writes per-variable
//! window, episode and point tables.
//!
//! Usage:
//!   cargo run -p drift-runner -- data.csv --config drift_config.json --output-dir out
//!   cargo run -p drift-runner -- data.csv --columns temp,flow
//!   cargo run -p drift-runner -- data.csv --init-config [--overwrite]

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use drift_core::{DriftConfig, DriftConfigFile};
use drift_engine::detect_each;

mod config;
mod io;

use config::RunnerConfig;

/// Window used for generated configurations.
const GENERATED_WINDOW: &str = "6H";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "drift_runner=info,drift_engine=info".into())
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let runner = RunnerConfig::from_args_and_env(&args)?;

    if runner.init_config {
        return init_config(&runner);
    }
    run(&runner)
}

/// Write a default configuration for every selected column.
fn init_config(runner: &RunnerConfig) -> Result<()> {
    if runner.config_path.exists() && !runner.overwrite {
        bail!(
            "{} already exists (pass --overwrite to replace it)",
            runner.config_path.display()
        );
    }

    let columns = if runner.columns.is_empty() {
        io::variable_columns(open(&runner.data_path)?)?
    } else {
        runner.columns.clone()
    };

    let configs: BTreeMap<String, DriftConfigFile> = columns
        .into_iter()
        .map(|name| {
            let file = DriftConfigFile {
                window: GENERATED_WINDOW.to_string(),
                ..DriftConfigFile::default()
            };
            (name, file)
        })
        .collect();

    let json = serde_json::to_string_pretty(&configs)?;
    fs::write(&runner.config_path, json)
        .with_context(|| format!("failed to write {}", runner.config_path.display()))?;

    tracing::info!(
        "Wrote default configuration for {} columns to {}",
        configs.len(),
        runner.config_path.display()
    );
    Ok(())
}

fn run(runner: &RunnerConfig) -> Result<()> {
    let files = load_config_files(&runner.config_path)?;
    let series = io::read_series(open(&runner.data_path)?, &runner.columns)
        .with_context(|| format!("failed to read {}", runner.data_path.display()))?;
    tracing::info!(
        "Loaded {} variables from {}",
        series.len(),
        runner.data_path.display()
    );

    // Every configuration is validated before any variable runs
    let jobs = series
        .into_iter()
        .map(|s| {
            let config = resolve_config(&files, s.name())?;
            Ok((config, s))
        })
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(&runner.output_dir)
        .with_context(|| format!("failed to create {}", runner.output_dir.display()))?;

    let results = detect_each(&jobs);

    let failures: Vec<String> = results
        .par_iter()
        .filter_map(|(name, result)| {
            let outcome = match result {
                Ok(report) => io::write_report(&runner.output_dir, report).map(|paths| {
                    tracing::info!(
                        "{}: {} drift windows, {} episodes -> {} files",
                        name,
                        report.drift_windows(),
                        report.episodes.len(),
                        paths.len()
                    );
                }),
                Err(e) => Err(anyhow::Error::new(e.clone())),
            };
            outcome.err().map(|e| {
                tracing::error!("{}: {:#}", name, e);
                name.clone()
            })
        })
        .collect();

    if !failures.is_empty() {
        bail!("{} variable(s) failed: {}", failures.len(), failures.join(", "));
    }
    tracing::info!("Results written to {}", runner.output_dir.display());
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Per-variable raw configurations. A missing file means defaults for all.
fn load_config_files(path: &Path) -> Result<BTreeMap<String, DriftConfigFile>> {
    if !path.exists() {
        tracing::warn!("{} not found, using default configuration", path.display());
        return Ok(BTreeMap::new());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn resolve_config(files: &BTreeMap<String, DriftConfigFile>, name: &str) -> Result<DriftConfig> {
    let file = files.get(name).cloned().unwrap_or_default();
    file.validate()
        .with_context(|| format!("invalid configuration for '{}'", name))
}
