//! Yahoo Finance options provider.
//!
//! Reads expirations and option chains from Yahoo's v7 options API. One HTTP
//! request per call, no internal retries: the scanner wraps chain fetches in
//! [`crate::data::retry::fetch_with_retry`].
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use super::provider::{ContractBatch, ContractRow, DataError, DataProvider};
use crate::domain::MAX_OPEN_INTEREST;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com/v7/finance/options";

/// Yahoo Finance v7 options API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    option_chain: OptionChain,
}

#[derive(Debug, Deserialize)]
struct OptionChain {
    result: Option<Vec<ChainResult>>,
    error: Option<ChainError>,
}

#[derive(Debug, Deserialize)]
struct ChainError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainResult {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<ChainOptions>,
}

#[derive(Debug, Deserialize)]
struct ChainOptions {
    #[serde(default)]
    calls: Vec<ContractQuote>,
    #[serde(default)]
    puts: Vec<ContractQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractQuote {
    strike: Option<f64>,
    open_interest: Option<u64>,
}

/// Yahoo Finance options provider.
pub struct YahooOptionsProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooOptionsProvider {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the provider at a different host (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn ticker_url(&self, ticker: &str) -> String {
        format!("{}/{ticker}", self.base_url)
    }

    fn chain_url(&self, ticker: &str, expiration: NaiveDate) -> String {
        format!("{}?date={}", self.ticker_url(ticker), expiration_timestamp(expiration))
    }

    /// Execute one GET and decode the options envelope.
    fn get(&self, ticker: &str, url: &str) -> Result<ChainResult, DataError> {
        debug!(ticker, url, "requesting yahoo options");
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                DataError::Timeout(e.to_string())
            } else {
                DataError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                context: ticker.to_string(),
            });
        }

        let body = resp.text().map_err(|e| {
            if e.is_timeout() {
                DataError::Timeout(e.to_string())
            } else {
                DataError::NetworkUnreachable(e.to_string())
            }
        })?;
        parse_response(ticker, &body)
    }
}

impl DataProvider for YahooOptionsProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn list_expirations(&self, ticker: &str) -> Result<Vec<NaiveDate>, DataError> {
        let result = self.get(ticker, &self.ticker_url(ticker))?;
        parse_expirations(&result.expiration_dates)
    }

    fn fetch_contracts(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<ContractBatch, DataError> {
        let result = self.get(ticker, &self.chain_url(ticker, expiration))?;
        Ok(batch_from_result(result))
    }
}

/// Yahoo keys expirations by midnight UTC of the expiry day.
fn expiration_timestamp(expiration: NaiveDate) -> i64 {
    expiration
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn parse_response(ticker: &str, body: &str) -> Result<ChainResult, DataError> {
    let resp: OptionsResponse = serde_json::from_str(body).map_err(|e| {
        DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
    })?;

    if let Some(err) = resp.option_chain.error {
        return Err(if err.code == "Not Found" {
            DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            }
        } else {
            DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
        });
    }

    resp.option_chain
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DataError::SymbolNotFound {
            symbol: ticker.to_string(),
        })
}

fn parse_expirations(timestamps: &[i64]) -> Result<Vec<NaiveDate>, DataError> {
    let mut dates = timestamps
        .iter()
        .map(|&ts| {
            DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid expiration timestamp: {ts}"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    dates.sort_unstable();
    dates.dedup();
    Ok(dates)
}

/// Missing open interest reads as zero. Rows without a usable strike, or with
/// an open interest past [`MAX_OPEN_INTEREST`], are dropped.
fn batch_from_result(result: ChainResult) -> ContractBatch {
    let Some(chain) = result.options.into_iter().next() else {
        return ContractBatch::default();
    };
    ContractBatch {
        calls: rows_from_quotes(chain.calls),
        puts: rows_from_quotes(chain.puts),
    }
}

fn rows_from_quotes(quotes: Vec<ContractQuote>) -> Vec<ContractRow> {
    quotes
        .into_iter()
        .filter_map(|q| {
            let strike = q.strike.filter(|s| s.is_finite() && *s >= 0.0)?;
            let open_interest = q.open_interest.unwrap_or(0);
            if open_interest > MAX_OPEN_INTEREST {
                debug!(strike, open_interest, "dropping contract with out-of-range open interest");
                return None;
            }
            Some(ContractRow {
                strike,
                open_interest,
            })
        })
        .collect()
}
