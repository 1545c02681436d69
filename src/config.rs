// ⚙️ Configuration - JSON file with environment overrides

use crate::deduplication::DedupOptions;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "RECONCILE_DB";
pub const ENV_THRESHOLD: &str = "RECONCILE_THRESHOLD";
pub const ENV_DATE_WINDOW_DAYS: &str = "RECONCILE_DATE_WINDOW_DAYS";
pub const ENV_AMOUNT_TOLERANCE: &str = "RECONCILE_AMOUNT_TOLERANCE";
pub const ENV_LOG_FORMAT: &str = "RECONCILE_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub dedup: DedupOptions,
    pub database_path: PathBuf,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dedup: DedupOptions::default(),
            database_path: PathBuf::from("transactions.db"),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides.
    /// No path means defaults; a named file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(value) = lookup(ENV_THRESHOLD) {
            self.dedup.threshold = parse_number(ENV_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_DATE_WINDOW_DAYS) {
            self.dedup.date_window_days = parse_number(ENV_DATE_WINDOW_DAYS, &value)?;
        }
        if let Some(value) = lookup(ENV_AMOUNT_TOLERANCE) {
            self.dedup.amount_tolerance_percent = parse_number(ENV_AMOUNT_TOLERANCE, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.log_format = match value.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => bail!("{} must be 'text' or 'json', got {:?}", ENV_LOG_FORMAT, other),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.dedup;
        if !d.threshold.is_finite() {
            bail!("threshold must be a finite number");
        }
        if !d.date_window_days.is_finite() || d.date_window_days < 0.0 {
            bail!("dateWindowDays must be a non-negative number");
        }
        if !d.amount_tolerance_percent.is_finite() || d.amount_tolerance_percent < 0.0 {
            bail!("amountTolerancePercent must be a non-negative number");
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .with_context(|| format!("{} must be a number, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.dedup, DedupOptions::default());
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"dedup": {"threshold": 0.7}, "databasePath": "/tmp/x.db", "logFormat": "json"}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.dedup.threshold, 0.7);
        assert_eq!(config.dedup.date_window_days, 3.0);
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_no_path_means_defaults() {
        let config = Config::load(None).unwrap();

        assert_eq!(config.log_format, Config::default().log_format);
    }

    #[test]
    fn test_named_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");

        let err = Config::load(Some(&missing)).unwrap_err();

        assert!(format!("{:#}", err).contains("nope.json"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();

        config
            .apply_overrides(lookup(&[
                (ENV_DB, "other.db"),
                (ENV_THRESHOLD, "0.65"),
                (ENV_DATE_WINDOW_DAYS, "5"),
                (ENV_AMOUNT_TOLERANCE, " 12.5 "),
                (ENV_LOG_FORMAT, "JSON"),
            ]))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.dedup.threshold, 0.65);
        assert_eq!(config.dedup.date_window_days, 5.0);
        assert_eq!(config.dedup.amount_tolerance_percent, 12.5);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        let mut config = Config::default();

        assert!(config.apply_overrides(lookup(&[(ENV_THRESHOLD, "high")])).is_err());
        assert!(config.apply_overrides(lookup(&[(ENV_LOG_FORMAT, "xml")])).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_window() {
        let mut config = Config::default();
        config.dedup.date_window_days = -1.0;

        assert!(config.validate().is_err());
    }
}
