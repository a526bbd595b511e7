//! Scan configuration: TOML file, environment overrides, validation.
//!
//! ```toml
//! tickers = ["AAPL", "SPY", "TSLA"]
//! parallel = false
//!
//! [thresholds]
//! abs_change = 2000
//! percent_change = 100.0
//!
//! [fetch]
//! max_retries = 3
//! retry_delay_secs = 2.0
//! request_timeout_secs = 30
//! # max_expirations = 8
//!
//! [storage]
//! baseline_path = "oi_baseline.csv"
//!
//! [notify]
//! max_message_len = 2000
//! ```
//!
//! The webhook URL is a credential and is only read from `OIWATCH_WEBHOOK_URL`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use oiwatch_core::data::RetryPolicy;
use oiwatch_core::notify::{WebhookUrl, DEFAULT_MAX_MESSAGE_LEN};
use oiwatch_core::reconcile::Thresholds;

pub const ENV_WEBHOOK_URL: &str = "OIWATCH_WEBHOOK_URL";
pub const ENV_TICKERS: &str = "OIWATCH_TICKERS";
pub const ENV_BASELINE_PATH: &str = "OIWATCH_BASELINE_PATH";

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "oiwatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Contracts added day-over-day.
    pub abs_change: u64,
    /// Whole percentage points (100 = +100%).
    pub percent_change: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            abs_change: t.abs_change,
            percent_change: t.percent_change,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Total attempts per expiration, not extra retries.
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub request_timeout_secs: u64,
    /// Only scan the N nearest expirations per ticker.
    pub max_expirations: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 2.0,
            request_timeout_secs: 30,
            max_expirations: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub baseline_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            baseline_path: PathBuf::from("oi_baseline.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub max_message_len: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

/// Immutable run configuration handed to the scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub tickers: Vec<String>,
    /// Scan tickers on the rayon pool.
    pub parallel: bool,
    pub thresholds: ThresholdConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    #[serde(skip)]
    pub webhook_url: Option<WebhookUrl>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tickers: [
                "INTC", "AAPL", "AMD", "SPY", "NVDA", "QQQ", "LMT", "TSLA", "PLTR", "MSFT",
                "GOOGL",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            parallel: false,
            thresholds: ThresholdConfig::default(),
            fetch: FetchConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            webhook_url: None,
        }
    }
}

impl ScanConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Resolve the full configuration for a run.
    ///
    /// An explicit path must exist. Without one, `oiwatch.toml` is used if
    /// present, otherwise the defaults. Environment overrides are applied
    /// last, then everything is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_WEBHOOK_URL) {
            let parsed = WebhookUrl::parse(&url)
                .map_err(|e| invalid("OIWATCH_WEBHOOK_URL", e.to_string()))?;
            self.webhook_url = Some(parsed);
        }
        if let Some(list) = get(ENV_TICKERS) {
            self.tickers = list.split(',').map(|t| t.to_string()).collect();
        }
        if let Some(path) = get(ENV_BASELINE_PATH) {
            self.storage.baseline_path = PathBuf::from(path.trim());
        }
        Ok(())
    }

    /// Normalize the watchlist and check every range.
    ///
    /// Tickers are trimmed, upper-cased and de-duplicated keeping first
    /// occurrence.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        self.tickers = self
            .tickers
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if self.tickers.is_empty() {
            return Err(invalid("tickers", "watchlist must contain at least one symbol"));
        }

        if self.thresholds.abs_change == 0 {
            return Err(invalid("thresholds.abs_change", "must be a positive integer"));
        }
        let pct = self.thresholds.percent_change;
        if !pct.is_finite() || pct <= 0.0 {
            return Err(invalid(
                "thresholds.percent_change",
                format!("must be a positive number of percentage points, got {pct}"),
            ));
        }

        if self.fetch.max_retries == 0 {
            return Err(invalid("fetch.max_retries", "must be at least 1"));
        }
        let delay = self.fetch.retry_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(invalid(
                "fetch.retry_delay_secs",
                format!("must be a non-negative number, got {delay}"),
            ));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(invalid("fetch.request_timeout_secs", "must be positive"));
        }
        if self.fetch.max_expirations == Some(0) {
            return Err(invalid("fetch.max_expirations", "must be positive when set"));
        }

        if self.storage.baseline_path.as_os_str().is_empty() {
            return Err(invalid("storage.baseline_path", "must not be empty"));
        }
        if self.notify.max_message_len < 100 {
            return Err(invalid("notify.max_message_len", "must be at least 100 characters"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            abs_change: self.thresholds.abs_change,
            percent_change: self.thresholds.percent_change,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(self.fetch.max_retries, self.fetch.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    /// TOML rendering of the effective config. The webhook is never included.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
