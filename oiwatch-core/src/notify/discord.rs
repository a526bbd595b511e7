//! Discord webhook sink.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::{NotificationSink, NotifyError};

/// Webhook URL. Carries a credential in its path, so `Debug` and `Display`
/// only ever show the host.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookUrl(reqwest::Url);

impl WebhookUrl {
    pub fn parse(raw: &str) -> Result<Self, NotifyError> {
        let url = reqwest::Url::parse(raw.trim()).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(NotifyError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(NotifyError::InvalidUrl("missing host".into()));
        }
        Ok(Self(url))
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or("")
    }

    /// Full URL, for the HTTP client only.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WebhookUrl({}/<redacted>)", self.host())
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/<redacted>", self.0.scheme(), self.host())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts `{"content": message}` to a Discord webhook. Any 2xx is success.
pub struct DiscordWebhook {
    client: reqwest::blocking::Client,
    url: WebhookUrl,
}

impl DiscordWebhook {
    pub fn new(url: WebhookUrl, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

impl NotificationSink for DiscordWebhook {
    fn name(&self) -> &str {
        "discord"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.url.expose())
            .json(&WebhookPayload { content: message })
            .send()
            .map_err(|e| {
                // reqwest errors embed the URL; keep the credential out of logs
                let e = e.without_url();
                if e.is_timeout() {
                    NotifyError::Timeout(e.to_string())
                } else {
                    NotifyError::Connection(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
