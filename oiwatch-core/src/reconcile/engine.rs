//! Reconciliation engine — joins today's rows against the prior snapshot.
//!
//! The prior snapshot is indexed once into a [`BaselineIndex`] (first row per
//! key wins). A [`Reconciler`] then walks today's rows one at a time: look up
//! yesterday's open interest (absent = 0), compute the delta, classify it, and
//! append the row to the snapshot being built whether or not it was flagged.
//!
//! The index is only ever read, so several reconcilers may share it and be
//! merged with [`Reconciler::absorb`] in a fixed order.

use std::collections::HashMap;

use tracing::debug;

use super::anomaly::Anomaly;
use super::delta::{OiDelta, Thresholds};
use crate::domain::{ContractKey, OiRecord, Snapshot, SnapshotBuilder};

/// Read-only hash index over the prior snapshot.
#[derive(Debug, Default)]
pub struct BaselineIndex {
    open_interest: HashMap<ContractKey, u64>,
}

impl BaselineIndex {
    pub fn build(prior: &Snapshot) -> Self {
        let mut open_interest = HashMap::with_capacity(prior.len());
        for record in prior.records() {
            open_interest
                .entry(record.key())
                .or_insert(record.open_interest);
        }
        Self { open_interest }
    }

    /// Prior open interest for a key, if the baseline has it.
    pub fn get(&self, key: &ContractKey) -> Option<u64> {
        self.open_interest.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.open_interest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_interest.is_empty()
    }
}

/// Incremental reconciler for one run (or one slice of a run).
#[derive(Debug)]
pub struct Reconciler<'a> {
    baseline: &'a BaselineIndex,
    thresholds: Thresholds,
    current: SnapshotBuilder,
    anomalies: Vec<Anomaly>,
    rows: usize,
    duplicates: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(baseline: &'a BaselineIndex, thresholds: Thresholds) -> Self {
        Self {
            baseline,
            thresholds,
            current: SnapshotBuilder::new(),
            anomalies: Vec::new(),
            rows: 0,
            duplicates: 0,
        }
    }

    /// Reconcile one of today's rows. Returns the anomaly if either rule fired.
    pub fn reconcile(&mut self, record: OiRecord) -> Option<&Anomaly> {
        let key = record.key();
        let oi_yesterday = self.baseline.get(&key).unwrap_or(0);
        let delta = OiDelta::compute(oi_yesterday, record.open_interest);
        let flagged = self.thresholds.classify(&delta);

        if let Some(trigger) = flagged {
            debug!(contract = %key, ?trigger, abs_change = delta.abs_change, "anomaly");
            self.anomalies.push(Anomaly::new(&record, delta, trigger));
        }

        self.rows += 1;
        if self.current.push(record) {
            self.duplicates += 1;
            debug!(contract = %key, "duplicate key in today's data, last row kept");
        }

        flagged.and_then(|_| self.anomalies.last())
    }

    pub fn reconcile_all(&mut self, records: impl IntoIterator<Item = OiRecord>) {
        for record in records {
            self.reconcile(record);
        }
    }

    /// Append another reconciler's results after this one's.
    pub fn absorb(&mut self, other: Reconciler<'_>) {
        self.anomalies.extend(other.anomalies);
        self.rows += other.rows;
        self.duplicates += other.duplicates;
        let before = self.current.len() + other.current.len();
        self.current.absorb(other.current);
        self.duplicates += before - self.current.len();
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> ReconcileOutcome {
        ReconcileOutcome {
            anomalies: self.anomalies,
            snapshot: self.current.finish(),
            rows: self.rows,
            duplicates: self.duplicates,
        }
    }
}

/// Result of reconciling a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Flagged rows, in the order today's data was seen.
    pub anomalies: Vec<Anomaly>,
    /// The new baseline.
    pub snapshot: Snapshot,
    /// Rows reconciled, duplicates included.
    pub rows: usize,
    /// Rows that replaced an earlier row with the same key.
    pub duplicates: usize,
}

/// Reconcile a whole day's rows against a prior snapshot in one call.
pub fn reconcile(
    prior: &Snapshot,
    today: impl IntoIterator<Item = OiRecord>,
    thresholds: Thresholds,
) -> ReconcileOutcome {
    let index = BaselineIndex::build(prior);
    let mut reconciler = Reconciler::new(&index, thresholds);
    reconciler.reconcile_all(today);
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OptionType;
    use crate::reconcile::delta::{PercentChange, Trigger};
    use chrono::NaiveDate;

    fn rec(ticker: &str, exp: (i32, u32, u32), strike: f64, t: OptionType, oi: u64) -> OiRecord {
        OiRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ticker: ticker.into(),
            expiration: NaiveDate::from_ymd_opt(exp.0, exp.1, exp.2).unwrap(),
            strike,
            option_type: t,
            open_interest: oi,
        }
    }

    #[test]
    fn baseline_first_match_wins() {
        let prior = Snapshot::from_records(vec![
            rec("AAPL", (2025, 1, 17), 150.0, OptionType::Call, 1000),
            rec("AAPL", (2025, 1, 17), 150.0, OptionType::Call, 50),
        ]);
        let index = BaselineIndex::build(&prior);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&prior.records()[0].key()), Some(1000));
    }

    #[test]
    fn growth_past_absolute_threshold_fires() {
        let prior = Snapshot::from_records(vec![rec(
            "AAPL",
            (2025, 1, 17),
            150.0,
            OptionType::Call,
            1000,
        )]);
        let out = reconcile(
            &prior,
            vec![rec("AAPL", (2025, 1, 17), 150.0, OptionType::Call, 3200)],
            Thresholds::default(),
        );
        assert_eq!(out.anomalies.len(), 1);
        let a = &out.anomalies[0];
        assert_eq!(a.delta.abs_change, 2200);
        assert_eq!(a.delta.pct_change, PercentChange::Finite(120.0));
        assert_eq!(a.trigger, Trigger::Both);
        assert_eq!(out.snapshot.len(), 1);
    }

    #[test]
    fn side_is_part_of_the_key() {
        let prior = Snapshot::from_records(vec![rec(
            "AAPL",
            (2025, 1, 17),
            150.0,
            OptionType::Put,
            5000,
        )]);
        // CALL has no baseline, so 3000 reads as a new contract
        let out = reconcile(
            &prior,
            vec![rec("AAPL", (2025, 1, 17), 150.0, OptionType::Call, 3000)],
            Thresholds::default(),
        );
        assert_eq!(out.anomalies.len(), 1);
        assert!(out.anomalies[0].delta.pct_change.is_infinite());
        assert_eq!(out.anomalies[0].trigger, Trigger::Absolute);
    }

    #[test]
    fn every_row_lands_in_the_new_snapshot() {
        let today = vec![
            rec("AAPL", (2025, 1, 17), 150.0, OptionType::Call, 10),
            rec("AAPL", (2025, 1, 17), 155.0, OptionType::Call, 9000),
            rec("AAPL", (2025, 1, 17), 150.0, OptionType::Put, 0),
        ];
        let out = reconcile(&Snapshot::empty(), today.clone(), Thresholds::default());
        assert_eq!(out.snapshot.records(), today.as_slice());
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.rows, 3);
    }

    #[test]
    fn duplicate_rows_are_each_reconciled_last_kept() {
        let today = vec![
            rec("SPY", (2025, 3, 21), 500.0, OptionType::Call, 2500),
            rec("SPY", (2025, 3, 21), 500.0, OptionType::Call, 100),
        ];
        let out = reconcile(&Snapshot::empty(), today, Thresholds::default());
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.rows, 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.snapshot.len(), 1);
        assert_eq!(out.snapshot.records()[0].open_interest, 100);
    }

    #[test]
    fn absorb_matches_single_pass() {
        let prior = Snapshot::from_records(vec![rec(
            "AMD",
            (2025, 2, 21),
            100.0,
            OptionType::Call,
            100,
        )]);
        let first = vec![rec("AMD", (2025, 2, 21), 100.0, OptionType::Call, 400)];
        let second = vec![rec("NVDA", (2025, 2, 21), 120.0, OptionType::Put, 4000)];

        let single = reconcile(
            &prior,
            first.iter().chain(second.iter()).cloned(),
            Thresholds::default(),
        );

        let index = BaselineIndex::build(&prior);
        let mut left = Reconciler::new(&index, Thresholds::default());
        left.reconcile_all(first);
        let mut right = Reconciler::new(&index, Thresholds::default());
        right.reconcile_all(second);
        left.absorb(right);

        assert_eq!(left.finish(), single);
    }

    #[test]
    fn reconcile_returns_the_flagged_entry() {
        let index = BaselineIndex::default();
        let mut r = Reconciler::new(&index, Thresholds::default());
        assert!(r
            .reconcile(rec("TSLA", (2025, 2, 21), 300.0, OptionType::Put, 500))
            .is_none());
        let flagged = r
            .reconcile(rec("TSLA", (2025, 2, 21), 310.0, OptionType::Put, 2100))
            .cloned();
        assert_eq!(flagged.map(|a| a.strike), Some(310.0));
        assert_eq!(r.anomalies().len(), 1);
        assert_eq!(r.rows(), 2);
    }
}
