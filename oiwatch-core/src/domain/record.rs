//! OI record (one row of a snapshot) and the composite contract key.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Contract side.
///
/// Always written upper-case (`CALL` / `PUT`). Parsing is case-insensitive so
/// baselines written with lower-case types still join against fresh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown option type '{0}' (expected CALL or PUT)")]
pub struct ParseOptionTypeError(pub String);

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
        }
    }
}

impl FromStr for OptionType {
    type Err = ParseOptionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionType::Call),
            "PUT" | "P" => Ok(OptionType::Put),
            _ => Err(ParseOptionTypeError(s.to_string())),
        }
    }
}

impl TryFrom<String> for OptionType {
    type Error = ParseOptionTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open interest for one contract on one run date.
///
/// Column names match the persisted baseline header:
/// `date,ticker,expiration,strike,type,openInterest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiRecord {
    /// Run date the record was observed on. Older baselines omit the column.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    #[serde(rename = "openInterest", deserialize_with = "lenient_count")]
    pub open_interest: u64,
}

impl OiRecord {
    /// Composite key identifying this contract across runs. `date` is not part of it.
    pub fn key(&self) -> ContractKey {
        ContractKey {
            ticker: self.ticker.clone(),
            expiration: self.expiration,
            strike: StrikeKey::from(self.strike),
            option_type: self.option_type,
        }
    }
}

/// Exact, hashable form of a strike price.
///
/// Strikes compare by bit pattern, so `150.0` from today's chain matches the
/// `150` read back from the baseline file. Negative zero folds into zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrikeKey(u64);

impl StrikeKey {
    pub fn value(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for StrikeKey {
    fn from(strike: f64) -> Self {
        let normalized = if strike == 0.0 { 0.0 } else { strike };
        StrikeKey(normalized.to_bits())
    }
}

/// Largest open interest accepted from a baseline file or a provider.
pub const MAX_OPEN_INTEREST: u64 = i64::MAX as u64;

/// (ticker, expiration, strike, type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: StrikeKey,
    pub option_type: OptionType,
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.ticker,
            self.expiration,
            self.option_type,
            self.strike.value()
        )
    }
}

/// Accepts `1200`, `1200.0` and blank/NaN cells (read as 0). Counts above
/// [`MAX_OPEN_INTEREST`] are rejected.
///
/// Baselines produced by dataframe tooling store counts as floats whenever a
/// column held a missing value.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(0);
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        if n <= MAX_OPEN_INTEREST {
            return Ok(n);
        }
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < i64::MAX as f64 => {
            Ok(f as u64)
        }
        _ => Err(serde::de::Error::custom(format!(
            "invalid openInterest '{trimmed}'"
        ))),
    }
}
