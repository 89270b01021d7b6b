//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over data sources (Yahoo Finance, CSV
//! directory) so the pipeline can swap implementations and mock them in tests.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use super::interval::Interval;

/// Raw OHLCV bar from a data provider. Missing prices are `NaN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output and logs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("provider server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped, {remaining_secs}s cooldown left)")]
    CircuitBreakerTripped { remaining_secs: u64 },

    #[error(
        "interval {interval} only reaches back {max_days} days; start date {start} is older"
    )]
    IntradayLookbackExceeded {
        interval: Interval,
        max_days: i64,
        start: NaiveDate,
    },

    #[error("fetch timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::ServerError { .. }
        )
    }
}

/// Half-open request window `[start, end)` at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    /// Hard deadline for the whole fetch step, if any.
    pub deadline: Option<Instant>,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, interval: Interval) -> Self {
        Self {
            start,
            end,
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// True if `ts` falls inside `[start, end)`.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let day = ts.date();
        day >= self.start && day < self.end
    }
}

/// Result of a successful data fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    InMemory,
}

/// Trait for data providers (Yahoo Finance, CSV directory, etc).
///
/// Implementations handle the specifics of fetching from one source.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for a symbol over the window.
    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<FetchResult, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-symbol fetches.
pub trait FetchProgress: Send {
    /// Called when starting to fetch a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol fetch completes.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<usize, DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, fetched: usize, total: usize);
}

/// Progress reporter that logs through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::debug!(symbol, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(bars) => tracing::debug!(symbol, bars, "fetched"),
            Err(e) => tracing::warn!(symbol, error = %e, "fetch failed"),
        }
    }

    fn on_batch_complete(&self, fetched: usize, total: usize) {
        tracing::info!(fetched, total, "price download complete");
    }
}
