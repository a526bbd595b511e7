//! OI Watch Core — open interest records, snapshots, reconciliation, adapters.
//!
//! This crate contains the anomaly-detection engine and its collaborators:
//! - Domain types (OI records, contract keys, snapshots)
//! - Options data provider trait, Yahoo Finance provider, bounded fetch retry
//! - Reconciliation engine: baseline index, delta arithmetic, threshold rules
//! - Snapshot store (CSV baseline with atomic replace)
//! - Notifier (single aggregated alert, Discord webhook sink)

pub mod data;
pub mod domain;
pub mod notify;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with the parallel scanner are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::OiRecord>();
        require_sync::<domain::OiRecord>();
        require_send::<domain::Snapshot>();
        require_sync::<domain::Snapshot>();
        require_send::<domain::SnapshotBuilder>();
        require_sync::<domain::SnapshotBuilder>();

        require_send::<reconcile::BaselineIndex>();
        require_sync::<reconcile::BaselineIndex>();
        require_send::<reconcile::Reconciler<'static>>();
        require_send::<reconcile::Anomaly>();
        require_sync::<reconcile::Anomaly>();
        require_send::<reconcile::Thresholds>();
        require_sync::<reconcile::Thresholds>();

        require_send::<data::RetryPolicy>();
        require_sync::<data::RetryPolicy>();
        require_send::<data::YahooOptionsProvider>();
        require_sync::<data::YahooOptionsProvider>();

        require_send::<store::CsvSnapshotStore>();
        require_sync::<store::CsvSnapshotStore>();
        require_send::<notify::DiscordWebhook>();
        require_sync::<notify::DiscordWebhook>();
    }

    /// Architecture contract: the reconciler only ever reads the baseline.
    ///
    /// `Reconciler::new` takes `&BaselineIndex`; if it ever needs `&mut`, this
    /// stops compiling.
    #[test]
    fn reconciler_borrows_baseline_immutably() {
        fn _check(index: &reconcile::BaselineIndex) -> reconcile::Reconciler<'_> {
            reconcile::Reconciler::new(index, reconcile::Thresholds::default())
        }
    }
}
