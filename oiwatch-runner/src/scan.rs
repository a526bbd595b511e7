//! Scanner — drives one run from baseline load to baseline persist.
//!
//! Phases, strictly in order:
//!
//! `Init → LoadBaseline → Scan (per ticker: list expirations → per expiration:
//! fetch → reconcile) → Aggregate → Notify (only if anomalies) →
//! PersistBaseline → Done`
//!
//! A ticker whose expiration listing fails is skipped whole. An expiration
//! whose chain fetch exhausts its retries is skipped alone. Notification
//! failure is reported in the [`ScanReport`]. Only a failed persist fails the run.

use std::fmt;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use oiwatch_core::data::{fetch_with_retry, DataProvider, RetryPolicy, Sleeper};
use oiwatch_core::notify::{build_alert_message, notify, NotificationSink};
use oiwatch_core::reconcile::{Anomaly, BaselineIndex, Reconciler};
use oiwatch_core::store::{SnapshotStore, StoreError};

use crate::config::ScanConfig;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to persist baseline to {location}: {source}")]
    Persist {
        location: String,
        #[source]
        source: StoreError,
    },
}

/// Orchestrator phase, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    LoadBaseline,
    Scan,
    Aggregate,
    Notify,
    PersistBaseline,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::LoadBaseline => "load_baseline",
            Phase::Scan => "scan",
            Phase::Aggregate => "aggregate",
            Phase::Notify => "notify",
            Phase::PersistBaseline => "persist_baseline",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened to the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Zero anomalies, the sink was not called.
    NotNeeded,
    Delivered,
    Failed,
    /// Dry run: the message was built but not dispatched.
    Suppressed,
}

/// An expiration dropped after its fetch retries ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedExpiration {
    pub ticker: String,
    pub expiration: NaiveDate,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub as_of: NaiveDate,
    pub baseline_rows: usize,
    pub tickers_scanned: usize,
    pub tickers_skipped: Vec<String>,
    pub expirations_fetched: usize,
    pub expirations_skipped: Vec<SkippedExpiration>,
    pub rows: usize,
    pub duplicates: usize,
    pub snapshot_rows: usize,
    pub anomalies: Vec<Anomaly>,
    pub message: Option<String>,
    pub notification: NotificationOutcome,
    /// `None` on a dry run.
    pub persisted_to: Option<String>,
}

impl ScanReport {
    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// Per-ticker partial result, merged in watchlist order.
struct TickerScan<'a> {
    ticker: String,
    listed: bool,
    reconciler: Reconciler<'a>,
    fetched: usize,
    skipped: Vec<SkippedExpiration>,
}

/// One run of the anomaly scan.
pub struct Scanner<'a> {
    config: &'a ScanConfig,
    provider: &'a dyn DataProvider,
    store: &'a dyn SnapshotStore,
    sink: &'a dyn NotificationSink,
    sleeper: &'a dyn Sleeper,
    as_of: NaiveDate,
    dry_run: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(
        config: &'a ScanConfig,
        provider: &'a dyn DataProvider,
        store: &'a dyn SnapshotStore,
        sink: &'a dyn NotificationSink,
        sleeper: &'a dyn Sleeper,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            sink,
            sleeper,
            as_of,
            dry_run: false,
        }
    }

    /// Build and report, but neither dispatch the alert nor persist the baseline.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self) -> Result<ScanReport, ScanError> {
        enter(Phase::Init);
        info!(
            provider = self.provider.name(),
            tickers = self.config.tickers.len(),
            abs_threshold = self.config.thresholds.abs_change,
            pct_threshold = self.config.thresholds.percent_change,
            parallel = self.config.parallel,
            dry_run = self.dry_run,
            as_of = %self.as_of,
            "starting OI scan"
        );

        enter(Phase::LoadBaseline);
        let prior = self.store.load();
        let index = BaselineIndex::build(&prior);
        info!(
            location = %self.store.location(),
            rows = prior.len(),
            keys = index.len(),
            "baseline ready"
        );

        enter(Phase::Scan);
        let thresholds = self.config.thresholds();
        let policy = self.config.retry_policy();
        let scans: Vec<TickerScan<'_>> = if self.config.parallel {
            self.config
                .tickers
                .par_iter()
                .map(|ticker| self.scan_ticker(ticker, &index, &policy))
                .collect()
        } else {
            self.config
                .tickers
                .iter()
                .map(|ticker| self.scan_ticker(ticker, &index, &policy))
                .collect()
        };

        enter(Phase::Aggregate);
        let mut all = Reconciler::new(&index, thresholds);
        let mut tickers_scanned = 0;
        let mut tickers_skipped = Vec::new();
        let mut expirations_fetched = 0;
        let mut expirations_skipped = Vec::new();
        for scan in scans {
            if scan.listed {
                tickers_scanned += 1;
            } else {
                tickers_skipped.push(scan.ticker);
            }
            expirations_fetched += scan.fetched;
            expirations_skipped.extend(scan.skipped);
            all.absorb(scan.reconciler);
        }
        let outcome = all.finish();
        info!(
            rows = outcome.rows,
            snapshot_rows = outcome.snapshot.len(),
            anomalies = outcome.anomalies.len(),
            tickers_skipped = tickers_skipped.len(),
            expirations_skipped = expirations_skipped.len(),
            "reconciliation complete"
        );

        let message = build_alert_message(&outcome.anomalies, self.config.notify.max_message_len);
        let notification = match &message {
            None => {
                info!("no unusual OI changes found");
                NotificationOutcome::NotNeeded
            }
            Some(_) if self.dry_run => NotificationOutcome::Suppressed,
            Some(text) => {
                enter(Phase::Notify);
                if notify(self.sink, text) {
                    NotificationOutcome::Delivered
                } else {
                    NotificationOutcome::Failed
                }
            }
        };

        let persisted_to = if self.dry_run {
            info!("dry run, baseline left untouched");
            None
        } else {
            enter(Phase::PersistBaseline);
            let location = self.store.location();
            self.store
                .save(&outcome.snapshot)
                .map_err(|source| ScanError::Persist {
                    location: location.clone(),
                    source,
                })?;
            Some(location)
        };

        enter(Phase::Done);
        Ok(ScanReport {
            as_of: self.as_of,
            baseline_rows: prior.len(),
            tickers_scanned,
            tickers_skipped,
            expirations_fetched,
            expirations_skipped,
            rows: outcome.rows,
            duplicates: outcome.duplicates,
            snapshot_rows: outcome.snapshot.len(),
            anomalies: outcome.anomalies,
            message,
            notification,
            persisted_to,
        })
    }

    fn scan_ticker<'i>(
        &self,
        ticker: &str,
        index: &'i BaselineIndex,
        policy: &RetryPolicy,
    ) -> TickerScan<'i> {
        let mut scan = TickerScan {
            ticker: ticker.to_string(),
            listed: false,
            reconciler: Reconciler::new(index, self.config.thresholds()),
            fetched: 0,
            skipped: Vec::new(),
        };

        let mut expirations = match self.provider.list_expirations(ticker) {
            Ok(list) => list,
            Err(e) => {
                warn!(ticker, kind = e.kind(), error = %e, "failed to list expirations, skipping ticker");
                return scan;
            }
        };
        scan.listed = true;

        expirations.sort_unstable();
        expirations.dedup();
        if let Some(cap) = self.config.fetch.max_expirations {
            expirations.truncate(cap);
        }
        debug!(ticker, expirations = expirations.len(), "listed expirations");

        for expiration in expirations {
            match fetch_with_retry(self.provider, ticker, expiration, policy, self.sleeper) {
                Some(batch) => {
                    scan.fetched += 1;
                    let rows = batch.len();
                    scan.reconciler
                        .reconcile_all(batch.into_records(ticker, expiration, self.as_of));
                    debug!(ticker, %expiration, rows, "reconciled expiration");
                }
                None => scan.skipped.push(SkippedExpiration {
                    ticker: ticker.to_string(),
                    expiration,
                }),
            }
        }

        info!(
            ticker,
            rows = scan.reconciler.rows(),
            anomalies = scan.reconciler.anomalies().len(),
            skipped = scan.skipped.len(),
            "ticker scanned"
        );
        scan
    }
}

fn enter(phase: Phase) {
    debug!(%phase, "scan phase");
}
