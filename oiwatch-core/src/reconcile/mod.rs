//! Reconciliation: delta arithmetic, threshold rules, anomaly entries, engine

pub mod anomaly;
pub mod delta;
pub mod engine;

pub use anomaly::Anomaly;
pub use delta::{OiDelta, PercentChange, Thresholds, Trigger};
pub use engine::{reconcile, BaselineIndex, ReconcileOutcome, Reconciler};
