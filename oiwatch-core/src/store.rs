//! Snapshot store — the one-day baseline persisted between runs.
//!
//! On-disk format is a CSV with header
//! `date,ticker,expiration,strike,type,openInterest`.
//!
//! - Missing file on load → empty snapshot (first run)
//! - Malformed file on load → quarantined as `{file}.quarantined`, empty snapshot
//! - I/O failure on load → file left in place, empty snapshot
//! - Save writes `{file}.tmp`, fsyncs, then renames over the old baseline

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{OiRecord, Snapshot};

/// Canonical column set, in file order.
pub const COLUMNS: [&str; 6] = ["date", "ticker", "expiration", "strike", "type", "openInterest"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for the prior/current snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Where the baseline lives, for logs and reports.
    fn location(&self) -> String;

    /// The persisted baseline, or an empty snapshot. Never fails.
    fn load(&self) -> Snapshot;

    /// Replace the persisted baseline with `snapshot`.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// CSV file store.
#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    path: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the baseline without the load-time fallbacks: a missing file is
    /// `Ok(None)`, an unreadable one is an error and is left in place.
    pub fn inspect(&self) -> Result<Option<Snapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        self.read_records().map(|r| Some(Snapshot::from_records(r)))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "oi_baseline.csv".to_string());
        self.path.with_file_name(format!("{name}.{suffix}"))
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling("tmp")
    }

    fn quarantine_path(&self) -> PathBuf {
        self.sibling("quarantined")
    }

    fn read_records(&self) -> Result<Vec<OiRecord>, StoreError> {
        // Only headers are trimmed so fields read back exactly as written.
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| self.read_error(e))?;

        reader
            .deserialize::<OiRecord>()
            .map(|row| row.map_err(|e| self.read_error(e)))
            .collect()
    }

    /// I/O failures stay `StoreError::Io`; everything else is a malformed file.
    fn read_error(&self, e: csv::Error) -> StoreError {
        if !e.is_io_error() {
            return self.csv_error(e);
        }
        match e.into_kind() {
            csv::ErrorKind::Io(source) => io_error(&self.path, source),
            other => StoreError::Csv {
                path: self.path.clone(),
                message: format!("{other:?}"),
            },
        }
    }

    fn write_records(&self, path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer
            .write_record(COLUMNS)
            .map_err(|e| csv_error(path, e))?;
        for record in snapshot.records() {
            writer.serialize(record).map_err(|e| csv_error(path, e))?;
        }

        let file = writer.into_inner().map_err(|e| StoreError::Csv {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.sync_all().map_err(|e| io_error(path, e))
    }

    fn quarantine(&self) {
        let target = self.quarantine_path();
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(
                path = %self.path.display(),
                quarantined = %target.display(),
                "quarantined malformed baseline"
            ),
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not quarantine baseline"),
        }
    }

    fn csv_error(&self, e: csv::Error) -> StoreError {
        csv_error(&self.path, e)
    }
}

impl SnapshotStore for CsvSnapshotStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Snapshot {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no baseline found, starting from empty snapshot");
            return Snapshot::empty();
        }

        match self.read_records() {
            Ok(records) => {
                info!(path = %self.path.display(), rows = records.len(), "loaded baseline");
                Snapshot::from_records(records)
            }
            Err(e @ StoreError::Io { .. }) => {
                warn!(error = %e, "baseline could not be read, left in place, starting from empty snapshot");
                Snapshot::empty()
            }
            Err(e) => {
                warn!(error = %e, "baseline malformed, starting from empty snapshot");
                self.quarantine();
                Snapshot::empty()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = self.write_records(&tmp, snapshot) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        // Atomic rename
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_error(&self.path, e)
        })?;

        info!(path = %self.path.display(), rows = snapshot.len(), "saved baseline");
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
/// In-process store for tests. Enabled by the `testing` feature.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

#[cfg(any(test, feature = "testing"))]
impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// The last saved (or seeded) snapshot.
    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

#[cfg(any(test, feature = "testing"))]
impl SnapshotStore for MemorySnapshotStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Snapshot {
        self.current().unwrap_or_default()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut slot = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        *slot = Some(snapshot.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_error(path: &Path, e: csv::Error) -> StoreError {
    StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_paths_keep_the_file_name() {
        let store = CsvSnapshotStore::new("/var/lib/oiwatch/oi_baseline.csv");
        assert_eq!(
            store.tmp_path(),
            PathBuf::from("/var/lib/oiwatch/oi_baseline.csv.tmp")
        );
        assert_eq!(
            store.quarantine_path(),
            PathBuf::from("/var/lib/oiwatch/oi_baseline.csv.quarantined")
        );
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().is_empty());
        store.save(&Snapshot::empty()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current(), Some(Snapshot::empty()));
    }
}
