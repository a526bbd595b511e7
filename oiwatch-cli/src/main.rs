//! OI Watch CLI — daily open interest scan and baseline inspection.
//!
//! Commands:
//! - `scan` — fetch the watchlist's option chains, alert on unusual OI, rotate the baseline
//! - `snapshot status` — report the persisted baseline's rows, dates and tickers
//! - `config check` — validate the effective configuration and print it (secret redacted)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oiwatch_core::data::{ThreadSleeper, YahooOptionsProvider};
use oiwatch_core::notify::{DiscordWebhook, LogSink, NotificationSink};
use oiwatch_core::store::CsvSnapshotStore;
use oiwatch_runner::{NotificationOutcome, ScanConfig, ScanReport, Scanner, ENV_WEBHOOK_URL};

#[derive(Parser)]
#[command(
    name = "oiwatch",
    about = "OI Watch — unusual options open interest scanner"
)]
struct Cli {
    /// Debug-level logging (ignored when RUST_LOG is set).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the watchlist, alert on unusual OI changes and persist today's baseline.
    Scan {
        /// Path to a TOML config file. Defaults to ./oiwatch.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run date stamped on today's rows (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Build and print the alert without sending it or touching the baseline.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Print the run report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Baseline inspection commands.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Report row count, run dates and per-ticker rows of the persisted baseline.
    Status {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration, then print it.
    Check {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            config,
            as_of,
            dry_run,
            json,
        } => run_scan(config.as_deref(), as_of.as_deref(), dry_run, json),
        Commands::Snapshot { action } => match action {
            SnapshotAction::Status { config } => run_snapshot_status(config.as_deref()),
        },
        Commands::Config { action } => match action {
            ConfigAction::Check { config } => run_config_check(config.as_deref()),
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    ScanConfig::load(path).context("failed to load configuration")
}

fn run_scan(
    config_path: Option<&Path>,
    as_of: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let as_of = match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of date '{s}', expected YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let provider = YahooOptionsProvider::new(config.request_timeout())
        .context("failed to build market data client")?;
    let store = CsvSnapshotStore::new(&config.storage.baseline_path);
    let sink: Box<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => {
            info!(host = url.host(), "alerts go to Discord webhook");
            Box::new(
                DiscordWebhook::new(url.clone(), config.request_timeout())
                    .context("failed to build webhook client")?,
            )
        }
        None => {
            warn!("{ENV_WEBHOOK_URL} not set, alerts will only be logged");
            Box::new(LogSink)
        }
    };

    let report = Scanner::new(
        &config,
        &provider,
        &store,
        sink.as_ref(),
        &ThreadSleeper,
        as_of,
    )
    .with_dry_run(dry_run)
    .run()
    .context("scan failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to render report")?
        );
    } else {
        print_report(&report, config.tickers.len());
    }
    Ok(())
}

fn print_report(report: &ScanReport, watchlist: usize) {
    println!("=== OI scan {} ===", report.as_of);
    println!(
        "Tickers:      {}/{} scanned",
        report.tickers_scanned, watchlist
    );
    if !report.tickers_skipped.is_empty() {
        println!("  skipped:    {}", report.tickers_skipped.join(", "));
    }
    println!("Expirations:  {} fetched", report.expirations_fetched);
    for skipped in &report.expirations_skipped {
        println!("  skipped:    {} {}", skipped.ticker, skipped.expiration);
    }
    println!(
        "Rows:         {} reconciled, {} in new baseline ({} duplicate)",
        report.rows, report.snapshot_rows, report.duplicates
    );
    println!("Baseline in:  {} rows", report.baseline_rows);
    println!("Anomalies:    {}", report.anomalies.len());

    let outcome = match report.notification {
        NotificationOutcome::NotNeeded => "not needed",
        NotificationOutcome::Delivered => "delivered",
        NotificationOutcome::Failed => "FAILED (see log)",
        NotificationOutcome::Suppressed => "suppressed (dry run)",
    };
    println!("Alert:        {outcome}");
    match &report.persisted_to {
        Some(location) => println!("Persisted to: {location}"),
        None => println!("Persisted to: (dry run, baseline unchanged)"),
    }

    if let Some(message) = &report.message {
        println!();
        println!("{message}");
    }
}

fn run_snapshot_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let path = &config.storage.baseline_path;
    let store = CsvSnapshotStore::new(path);

    let snapshot = match store
        .inspect()
        .with_context(|| format!("baseline {} is unreadable", path.display()))?
    {
        Some(snapshot) => snapshot,
        None => {
            println!("No baseline yet: {}", path.display());
            return Ok(());
        }
    };

    println!("Baseline: {}", path.display());
    println!("Rows: {}", snapshot.len());
    let dates: Vec<String> = snapshot.run_dates().iter().map(|d| d.to_string()).collect();
    if dates.is_empty() {
        println!("Run date: (not recorded)");
    } else {
        println!("Run date: {}", dates.join(", "));
    }
    if snapshot.is_empty() {
        return Ok(());
    }

    println!();
    println!("{:<8} {:>8}", "Ticker", "Rows");
    println!("{}", "-".repeat(17));
    for (ticker, rows) in snapshot.rows_per_ticker() {
        println!("{ticker:<8} {rows:>8}");
    }

    let present = snapshot.tickers();
    let missing: Vec<&str> = config
        .tickers
        .iter()
        .map(|t| t.as_str())
        .filter(|t| !present.contains(t))
        .collect();
    if !missing.is_empty() {
        println!();
        println!("Not in baseline: {}", missing.join(", "));
    }
    Ok(())
}

fn run_config_check(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("# configuration OK");
    print!(
        "{}",
        config.to_toml().context("failed to render configuration")?
    );
    match &config.webhook_url {
        Some(url) => println!("# webhook: {url}"),
        None => println!("# webhook: not set ({ENV_WEBHOOK_URL}), alerts will be logged"),
    }
    Ok(())
}
