//! Notifier — one aggregated alert per run, delivered best-effort.
//!
//! Delivery failures are logged and reported as `false`; they never stop the
//! run from persisting its baseline. There is no retry.

pub mod discord;

use thiserror::Error;
use tracing::{info, warn};

use crate::reconcile::Anomaly;

pub use discord::{DiscordWebhook, WebhookUrl};

/// First line of every alert.
pub const ALERT_HEADER: &str = "UNUSUAL OI DETECTED:";

/// Discord rejects message content over 2000 characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification timed out: {0}")]
    Timeout(String),

    #[error("notification connection failed: {0}")]
    Connection(String),

    #[error("notification rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),
}

/// External sink that accepts a single text payload.
pub trait NotificationSink: Send + Sync {
    /// Human-readable name of this sink.
    fn name(&self) -> &str;

    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sink that writes the alert to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        info!("alert (not delivered):\n{message}");
        Ok(())
    }
}

/// Build the single aggregated alert for a run. `None` when there is nothing to report.
///
/// Entries that would push the message past `max_len` characters are replaced
/// by a trailing `…and N more` line.
pub fn build_alert_message(anomalies: &[Anomaly], max_len: usize) -> Option<String> {
    if anomalies.is_empty() {
        return None;
    }

    let total = anomalies.len();
    let mut message = ALERT_HEADER.to_string();
    let mut len = message.chars().count();
    let mut included = 0;

    for anomaly in anomalies {
        let line = anomaly.summary();
        let line_len = line.chars().count() + 1;
        let rest = total - included - 1;
        let reserve = if rest > 0 {
            overflow_line(rest).chars().count() + 1
        } else {
            0
        };
        if len + line_len + reserve > max_len {
            break;
        }
        message.push('\n');
        message.push_str(&line);
        len += line_len;
        included += 1;
    }

    if included < total {
        message.push('\n');
        message.push_str(&overflow_line(total - included));
    }

    if message.chars().count() > max_len {
        message = message.chars().take(max_len).collect();
    }
    Some(message)
}

fn overflow_line(remaining: usize) -> String {
    format!("…and {remaining} more")
}

/// Send one message, logging the outcome. Returns whether delivery succeeded.
pub fn notify(sink: &dyn NotificationSink, message: &str) -> bool {
    match sink.send(message) {
        Ok(()) => {
            info!(sink = sink.name(), chars = message.chars().count(), "alert delivered");
            true
        }
        Err(e) => {
            warn!(sink = sink.name(), error = %e, "alert delivery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OiRecord, OptionType};
    use crate::reconcile::{reconcile, Thresholds};
    use crate::domain::Snapshot;
    use chrono::NaiveDate;

    fn anomalies(n: usize) -> Vec<Anomaly> {
        let today = (0..n).map(|i| OiRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ticker: "NVDA".into(),
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            strike: 100.0 + i as f64,
            option_type: OptionType::Call,
            open_interest: 5000,
        });
        reconcile(&Snapshot::empty(), today, Thresholds::default()).anomalies
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&self, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Status {
                status: 500,
                body: "oops".into(),
            })
        }
    }

    #[test]
    fn no_anomalies_no_message() {
        assert_eq!(build_alert_message(&[], DEFAULT_MAX_MESSAGE_LEN), None);
    }

    #[test]
    fn message_batches_every_entry() {
        let list = anomalies(3);
        let msg = build_alert_message(&list, DEFAULT_MAX_MESSAGE_LEN).unwrap();
        assert!(msg.starts_with("UNUSUAL OI DETECTED:\n**NVDA** 2025-01-17 CALL 100\n"));
        assert_eq!(msg.matches("**NVDA**").count(), 3);
        assert!(!msg.contains("more"));
    }

    #[test]
    fn long_message_is_truncated_with_overflow_line() {
        let list = anomalies(100);
        let msg = build_alert_message(&list, DEFAULT_MAX_MESSAGE_LEN).unwrap();
        assert!(msg.chars().count() <= DEFAULT_MAX_MESSAGE_LEN);
        let shown = msg.matches("**NVDA**").count();
        assert!(shown > 0 && shown < 100);
        assert!(msg.ends_with(&format!("…and {} more", 100 - shown)));
    }

    #[test]
    fn failed_delivery_is_reported_not_raised() {
        assert!(!notify(&FailingSink, "hello"));
        assert!(notify(&LogSink, "hello"));
    }
}
