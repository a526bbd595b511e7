//! Day-over-day delta arithmetic and threshold classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Percentage change relative to yesterday's open interest.
///
/// `Infinite` marks growth from a zero baseline. It is a display sentinel and
/// never takes part in a numeric threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PercentChange {
    Finite(f64),
    Infinite,
}

impl PercentChange {
    pub fn is_infinite(&self) -> bool {
        matches!(self, PercentChange::Infinite)
    }

    pub fn finite(&self) -> Option<f64> {
        match self {
            PercentChange::Finite(p) => Some(*p),
            PercentChange::Infinite => None,
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentChange::Finite(p) => write!(f, "{p:+.1}%"),
            PercentChange::Infinite => f.write_str("+∞%"),
        }
    }
}

/// Yesterday/today open interest and the derived changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OiDelta {
    pub oi_yesterday: u64,
    pub oi_today: u64,
    pub abs_change: i64,
    pub pct_change: PercentChange,
}

impl OiDelta {
    /// An absent baseline row is passed in as `oi_yesterday = 0`.
    ///
    /// - `0 → 0`: percentage 0
    /// - `0 → T > 0`: percentage infinite
    /// - `Y > 0`: `(T - Y) / Y * 100`, signed
    pub fn compute(oi_yesterday: u64, oi_today: u64) -> Self {
        let abs_change = (i128::from(oi_today) - i128::from(oi_yesterday))
            .clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
        let pct_change = if oi_yesterday != 0 {
            PercentChange::Finite((abs_change as f64 / oi_yesterday as f64) * 100.0)
        } else if oi_today > 0 {
            PercentChange::Infinite
        } else {
            PercentChange::Finite(0.0)
        };
        Self {
            oi_yesterday,
            oi_today,
            abs_change,
            pct_change,
        }
    }
}

/// Which rule flagged a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Absolute,
    Percent,
    Both,
}

/// Run-wide anomaly thresholds.
///
/// `percent_change` is in whole percentage points (100 = +100%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub abs_change: u64,
    pub percent_change: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            abs_change: 2000,
            percent_change: 100.0,
        }
    }
}

impl Thresholds {
    /// Two independent rules, OR'd. Both only look at growth.
    ///
    /// - absolute: `abs_change >= abs_change threshold`
    /// - percent: `oi_yesterday != 0 && pct_change >= percent threshold`
    ///
    /// A brand-new contract (zero baseline) can only be flagged by the
    /// absolute rule.
    pub fn classify(&self, delta: &OiDelta) -> Option<Trigger> {
        let abs_hit = delta.abs_change >= i64::try_from(self.abs_change).unwrap_or(i64::MAX);
        let pct_hit = delta.oi_yesterday != 0
            && delta
                .pct_change
                .finite()
                .is_some_and(|p| p >= self.percent_change);

        match (abs_hit, pct_hit) {
            (true, true) => Some(Trigger::Both),
            (true, false) => Some(Trigger::Absolute),
            (false, true) => Some(Trigger::Percent),
            (false, false) => None,
        }
    }
}
