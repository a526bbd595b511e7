//! Options data: provider trait, Yahoo Finance provider, retry wrapper

pub mod provider;
pub mod retry;
pub mod yahoo;

pub use provider::{ContractBatch, ContractRow, DataError, DataProvider};
pub use retry::{fetch_with_retry, RetryPolicy, Sleeper, ThreadSleeper};
#[cfg(any(test, feature = "testing"))]
pub use retry::RecordingSleeper;
pub use yahoo::YahooOptionsProvider;
