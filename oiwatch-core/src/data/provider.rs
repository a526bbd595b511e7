//! Options data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over quote sources (Yahoo Finance today) so
//! the scanner can be driven by an in-memory fake in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OiRecord, OptionType};

/// One contract row from an option chain, before it is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractRow {
    pub strike: f64,
    pub open_interest: u64,
}

/// Calls and puts for a single (ticker, expiration).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractBatch {
    pub calls: Vec<ContractRow>,
    pub puts: Vec<ContractRow>,
}

impl ContractBatch {
    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }

    /// Union of calls then puts, stamped with ticker, expiration and run date.
    pub fn into_records(
        self,
        ticker: &str,
        expiration: NaiveDate,
        date: NaiveDate,
    ) -> Vec<OiRecord> {
        let calls = self.calls.into_iter().map(|row| (OptionType::Call, row));
        let puts = self.puts.into_iter().map(|row| (OptionType::Put, row));
        calls
            .chain(puts)
            .map(|(option_type, row)| OiRecord {
                date: Some(date),
                ticker: ticker.to_string(),
                expiration,
                strike: row.strike,
                option_type,
                open_interest: row.open_interest,
            })
            .collect()
    }
}

/// Structured error types for provider calls.
///
/// Network and timeout failures are transient; everything else is not. The
/// retry wrapper retries both kinds, the distinction only shows up in logs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from provider: {context}")]
    HttpStatus { status: u16, context: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::Timeout(_)
        )
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DataError::NetworkUnreachable(_) => "network",
            DataError::Timeout(_) => "timeout",
            DataError::RateLimited { .. } => "rate_limited",
            DataError::HttpStatus { .. } => "http_status",
            DataError::ResponseFormatChanged(_) => "format",
            DataError::SymbolNotFound { .. } => "not_found",
            DataError::Other(_) => "other",
        }
    }
}

/// Trait for options data providers.
///
/// Implementations make a single attempt per call. Retries are the caller's
/// concern (see [`crate::data::retry`]).
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Expiration dates currently listed for a ticker.
    fn list_expirations(&self, ticker: &str) -> Result<Vec<NaiveDate>, DataError>;

    /// Full call/put chain for one expiration.
    fn fetch_contracts(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<ContractBatch, DataError>;
}
