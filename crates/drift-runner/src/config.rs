use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "drift_config.json";
const DEFAULT_OUTPUT_DIR: &str = "drift_output";

/// Flags that take a value; used to tell positionals from flag arguments.
const VALUE_FLAGS: &[&str] = &["--config", "--columns", "--output-dir"];

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub data_path: PathBuf,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    /// Columns to analyse; empty means every column except `date_time`
    pub columns: Vec<String>,
    pub init_config: bool,
    pub overwrite: bool,
}

impl RunnerConfig {
    /// Command-line flags win over environment variables, which win over
    /// defaults. `args` excludes the program name.
    pub fn from_args_and_env(args: &[String]) -> Result<Self> {
        let flag_value = |name: &str| -> Option<String> {
            args.iter()
                .position(|a| a == name)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let positional = args
            .iter()
            .enumerate()
            .find(|(i, a)| {
                !a.starts_with("--")
                    && (*i == 0 || !VALUE_FLAGS.contains(&args[i - 1].as_str()))
            })
            .map(|(_, a)| a.clone());

        let data_path = match positional.or_else(|| env::var("DRIFT_DATA_PATH").ok()) {
            Some(path) => PathBuf::from(path),
            None => bail!("no input CSV given (pass a path or set DRIFT_DATA_PATH)"),
        };

        let config_path = flag_value("--config")
            .or_else(|| env::var("DRIFT_CONFIG_PATH").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let output_dir = flag_value("--output-dir")
            .or_else(|| env::var("DRIFT_OUTPUT_DIR").ok())
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        let columns = flag_value("--columns")
            .or_else(|| env::var("DRIFT_COLUMNS").ok())
            .map(|list| parse_columns(&list))
            .unwrap_or_default();

        Ok(Self {
            data_path,
            config_path: PathBuf::from(config_path),
            output_dir: PathBuf::from(output_dir),
            columns,
            init_config: args.iter().any(|a| a == "--init-config"),
            overwrite: args.iter().any(|a| a == "--overwrite"),
        })
    }
}

/// Comma-separated column list, blanks dropped.
pub fn parse_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flags_and_positional() {
        let config = RunnerConfig::from_args_and_env(&args(&[
            "--config",
            "cfg.json",
            "data.csv",
            "--columns",
            "temp, flow,,",
            "--output-dir",
            "out",
            "--overwrite",
        ]))
        .unwrap();

        assert_eq!(config.data_path, PathBuf::from("data.csv"));
        assert_eq!(config.config_path, PathBuf::from("cfg.json"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.columns, vec!["temp", "flow"]);
        assert!(config.overwrite);
        assert!(!config.init_config);
    }

    #[test]
    fn test_flag_values_are_not_positionals() {
        let config =
            RunnerConfig::from_args_and_env(&args(&["--output-dir", "out", "input.csv"])).unwrap();
        assert_eq!(config.data_path, PathBuf::from("input.csv"));
    }

    #[test]
    fn test_parse_columns() {
        assert!(parse_columns("").is_empty());
        assert_eq!(parse_columns("a,b"), vec!["a", "b"]);
    }
}
