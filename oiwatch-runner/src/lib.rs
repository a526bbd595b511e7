//! OI Watch Runner — configuration and the daily scan orchestrator.
//!
//! This crate builds on `oiwatch-core` to provide:
//! - Layered scan configuration (TOML file, environment, validation)
//! - The scanner that walks the watchlist, reconciles, alerts, and persists
//! - A serializable per-run report

pub mod config;
pub mod scan;

pub use config::{
    ConfigError, FetchConfig, NotifyConfig, ScanConfig, StorageConfig, ThresholdConfig,
    DEFAULT_CONFIG_FILE, ENV_BASELINE_PATH, ENV_TICKERS, ENV_WEBHOOK_URL,
};
pub use scan::{
    NotificationOutcome, Phase, ScanError, ScanReport, Scanner, SkippedExpiration,
};
