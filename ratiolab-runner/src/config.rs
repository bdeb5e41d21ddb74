//! Serializable search configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! start = "2018-03-01"
//! end = "2018-05-15T00:00:00Z"
//! trials = 1000
//! seed = 42
//! report_path = "results.txt"
//! ```
//!
//! Timestamps are quoted strings in RFC 3339, `YYYY-MM-DD HH:MM:SS` or
//! `YYYY-MM-DD` form.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ratiolab_core::domain::{ConfigError, USD};
use ratiolab_core::rng::RngHierarchy;

#[derive(Debug, Error)]
pub enum SearchConfigError {
    #[error("read search config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse search config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Everything needed to reproduce one ratio search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Simulation window start (inclusive).
    #[serde(with = "flexible_timestamp")]
    pub start: DateTime<Utc>,

    /// Simulation window end (exclusive).
    #[serde(with = "flexible_timestamp")]
    pub end: DateTime<Utc>,

    /// Number of ratio vectors to evaluate.
    #[serde(default = "default_trials")]
    pub trials: usize,

    #[serde(default = "default_min_cadence")]
    pub min_cadence_days: u32,

    #[serde(default = "default_max_cadence")]
    pub max_cadence_days: u32,

    /// Master seed. `None` draws one from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Currency the final value is reported in (`USD` is read from `BTC/USDT`).
    #[serde(default = "default_report_currency")]
    pub report_currency: String,

    /// Evaluate trials of a batch on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Proposals requested from the strategy before results are fed back.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of best results kept on the leaderboard.
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,

    /// Plain-text report of every result.
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    /// JSONL log of every result.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

fn default_trials() -> usize {
    100
}

fn default_min_cadence() -> u32 {
    1
}

fn default_max_cadence() -> u32 {
    30
}

fn default_report_currency() -> String {
    USD.to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_batch_size() -> usize {
    8
}

fn default_leaderboard_size() -> usize {
    10
}

impl SearchConfig {
    /// A config with defaults for everything but the window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            trials: default_trials(),
            min_cadence_days: default_min_cadence(),
            max_cadence_days: default_max_cadence(),
            seed: None,
            report_currency: default_report_currency(),
            parallel: default_parallel(),
            batch_size: default_batch_size(),
            leaderboard_size: default_leaderboard_size(),
            report_path: None,
            history_path: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SearchConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| SearchConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, SearchConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start >= self.end {
            return Err(ConfigError::InvalidRange);
        }
        if self.min_cadence_days == 0 {
            return Err(ConfigError::InvalidCadence(self.min_cadence_days));
        }
        if self.max_cadence_days < self.min_cadence_days {
            return Err(ConfigError::InvalidCadence(self.max_cadence_days));
        }
        Ok(())
    }

    pub fn cadences(&self) -> RangeInclusive<u32> {
        self.min_cadence_days..=self.max_cadence_days
    }

    pub fn rng_hierarchy(&self) -> RngHierarchy {
        match self.seed {
            Some(seed) => RngHierarchy::new(seed),
            None => RngHierarchy::from_entropy(),
        }
    }
}

/// Serialize as RFC 3339, accept any format `parse_timestamp` understands.
mod flexible_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use ratiolab_core::domain::parse_timestamp;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&at.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(|e| de::Error::custom(format!("bad timestamp '{raw}': {e}")))
    }
}
