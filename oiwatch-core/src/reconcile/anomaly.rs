//! Anomaly entry — derived during reconciliation, consumed once by the notifier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::delta::{OiDelta, Trigger};
use crate::domain::{OiRecord, OptionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub date: Option<NaiveDate>,
    pub delta: OiDelta,
    pub trigger: Trigger,
}

impl Anomaly {
    pub(crate) fn new(record: &OiRecord, delta: OiDelta, trigger: Trigger) -> Self {
        Self {
            ticker: record.ticker.clone(),
            expiration: record.expiration,
            strike: record.strike,
            option_type: record.option_type,
            date: record.date,
            delta,
            trigger,
        }
    }

    /// Two-line, markdown-flavoured summary used in the alert message.
    ///
    /// ```text
    /// **AAPL** 2025-01-17 CALL 150
    /// OI changed from 1000 to 3200 (+2200, +120.0%)
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "**{}** {} {} {}\nOI changed from {} to {} ({:+}, {})",
            self.ticker,
            self.expiration,
            self.option_type,
            self.strike,
            self.delta.oi_yesterday,
            self.delta.oi_today,
            self.delta.abs_change,
            self.delta.pct_change,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(yesterday: u64, today: u64, strike: f64) -> Anomaly {
        let record = OiRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ticker: "AAPL".into(),
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            strike,
            option_type: OptionType::Call,
            open_interest: today,
        };
        Anomaly::new(&record, OiDelta::compute(yesterday, today), Trigger::Absolute)
    }

    #[test]
    fn summary_matches_alert_format() {
        assert_eq!(
            anomaly(1000, 3200, 150.0).summary(),
            "**AAPL** 2025-01-17 CALL 150\nOI changed from 1000 to 3200 (+2200, +120.0%)"
        );
    }

    #[test]
    fn summary_shows_fractional_strike_and_new_contract() {
        assert_eq!(
            anomaly(0, 2500, 152.5).summary(),
            "**AAPL** 2025-01-17 CALL 152.5\nOI changed from 0 to 2500 (+2500, +∞%)"
        );
    }
}
