//! Pipeline configuration.
//!
//! Stored as a plain JSON object on disk, every field optional:
//! ```json
//! {
//!   "timezone": "America/New_York",
//!   "read_attempts": 3,
//!   "read_backoff_ms": 250,
//!   "match_tolerance_secs": 1800,
//!   "concurrency": 4
//! }
//! ```
//! `BUS_PERF_*` environment variables override whatever the file says.

use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IANA name of the agency's local clock.
    pub timezone: String,
    /// Total attempts per upstream read, including the first one.
    pub read_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub read_backoff_ms: u64,
    /// How far outside a TM pullout's departure window a GTFS departure may
    /// fall and still be a match candidate.
    pub match_tolerance_secs: i64,
    /// Service dates computed at once by `backfill`.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            read_attempts: 3,
            read_backoff_ms: 250,
            match_tolerance_secs: 1800,
            concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`, then applies env overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        config.with_env_overrides()
    }

    /// Defaults with env overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(tz) = lookup("BUS_PERF_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(v) = lookup("BUS_PERF_READ_ATTEMPTS") {
            self.read_attempts = parse_value("BUS_PERF_READ_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("BUS_PERF_READ_BACKOFF_MS") {
            self.read_backoff_ms = parse_value("BUS_PERF_READ_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("BUS_PERF_MATCH_TOLERANCE_SECS") {
            self.match_tolerance_secs = parse_value("BUS_PERF_MATCH_TOLERANCE_SECS", &v)?;
        }
        if let Some(v) = lookup("BUS_PERF_CONCURRENCY") {
            self.concurrency = parse_value("BUS_PERF_CONCURRENCY", &v)?;
        }
        self.tz()?;
        Ok(self)
    }

    /// The parsed local timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.tz().unwrap(), chrono_tz::America::New_York);
        assert_eq!(config.read_attempts, 3);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let env: HashMap<&str, &str> = [
            ("BUS_PERF_TIMEZONE", "America/Chicago"),
            ("BUS_PERF_READ_ATTEMPTS", "5"),
            ("BUS_PERF_CONCURRENCY", " 2 "),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.timezone, "America/Chicago");
        assert_eq!(config.read_attempts, 5);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.match_tolerance_secs, 1800);
    }

    #[test]
    fn test_bad_timezone_is_rejected() {
        let result = PipelineConfig::default().with_overrides(|k| {
            (k == "BUS_PERF_TIMEZONE").then(|| "Mars/Olympus_Mons".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidTimezone(_))));
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let result = PipelineConfig::default()
            .with_overrides(|k| (k == "BUS_PERF_READ_ATTEMPTS").then(|| "many".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"read_attempts": 7}"#).unwrap();
        assert_eq!(config.read_attempts, 7);
        assert_eq!(config.timezone, "America/New_York");
    }
}
