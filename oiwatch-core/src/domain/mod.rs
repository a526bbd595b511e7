//! Domain types for OI Watch

pub mod record;
pub mod snapshot;

pub use record::{
    ContractKey, OiRecord, OptionType, ParseOptionTypeError, StrikeKey, MAX_OPEN_INTEREST,
};
pub use snapshot::{Snapshot, SnapshotBuilder};
