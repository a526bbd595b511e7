//! Snapshot — one full day's scan across the watchlist.
//!
//! Two snapshots exist during a run: the prior one (loaded, read-only) and the
//! current one (built with [`SnapshotBuilder`], persisted once at the end).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use super::record::{ContractKey, OiRecord};

/// Ordered sequence of OI records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Vec<OiRecord>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<OiRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[OiRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OiRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct tickers, sorted.
    pub fn tickers(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.ticker.as_str()).collect()
    }

    /// Distinct run dates present in the snapshot.
    pub fn run_dates(&self) -> BTreeSet<NaiveDate> {
        self.records.iter().filter_map(|r| r.date).collect()
    }

    /// Row count per ticker, sorted by ticker.
    pub fn rows_per_ticker(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.ticker.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Write-once accumulator for the current snapshot.
///
/// A key seen twice in one run keeps its first position and takes the last
/// row's values.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    records: Vec<OiRecord>,
    positions: HashMap<ContractKey, usize>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Returns `true` if it replaced an earlier row with the same key.
    pub fn push(&mut self, record: OiRecord) -> bool {
        let key = record.key();
        match self.positions.get(&key) {
            Some(&idx) => {
                self.records[idx] = record;
                true
            }
            None => {
                self.positions.insert(key, self.records.len());
                self.records.push(record);
                false
            }
        }
    }

    /// Fold another partial snapshot into this one, preserving its row order.
    pub fn absorb(&mut self, other: SnapshotBuilder) {
        for record in other.records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> Snapshot {
        Snapshot {
            records: self.records,
        }
    }
}
