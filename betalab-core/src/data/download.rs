//! Fetch orchestrator: pulls the equity universe and the benchmark through a
//! provider, one symbol at a time, under an overall deadline.
//!
//! Any failure is fatal for the batch. Partial data never reaches the
//! regression stage.

use super::interval::{Interval, PriceField};
use super::provider::{DataError, DataProvider, DataSource, FetchProgress, FetchWindow};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Retrieval failure, tagged with the input that triggered it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot fetch {interval} bars for window {start} to {end}: {source}")]
    Window {
        interval: Interval,
        start: NaiveDate,
        end: NaiveDate,
        #[source]
        source: DataError,
    },

    #[error("failed to fetch '{symbol}' ({interval} bars, {start} to {end}): {source}")]
    Symbol {
        symbol: String,
        interval: Interval,
        start: NaiveDate,
        end: NaiveDate,
        #[source]
        source: DataError,
    },
}

impl FetchError {
    pub fn data_error(&self) -> &DataError {
        match self {
            FetchError::Window { source, .. } | FetchError::Symbol { source, .. } => source,
        }
    }
}

/// What to fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub tickers: Vec<String>,
    pub benchmark: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    pub price_field: PriceField,
    /// Overall budget for the whole fetch step.
    pub timeout: Option<Duration>,
    /// Reference date for the intraday lookback check.
    pub today: NaiveDate,
}

/// One symbol's selected price field, sorted by timestamp, unique timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<(NaiveDateTime, f64)>,
}

impl PriceSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Fetched equities (in universe order) plus the benchmark.
#[derive(Debug, Clone)]
pub struct FetchedPrices {
    pub equities: Vec<PriceSeries>,
    pub benchmark: PriceSeries,
    pub sources: HashMap<String, DataSource>,
}

/// Fetch every ticker and the benchmark. Fails on the first error.
pub fn fetch_prices(
    provider: &dyn DataProvider,
    request: &FetchRequest,
    progress: &dyn FetchProgress,
) -> Result<FetchedPrices, FetchError> {
    let mut window = FetchWindow::new(request.start, request.end, request.interval);
    let started = Instant::now();
    if let Some(timeout) = request.timeout {
        window = window.with_deadline(started + timeout);
    }

    check_lookback(request).map_err(|source| FetchError::Window {
        interval: request.interval,
        start: request.start,
        end: request.end,
        source,
    })?;

    // Benchmark last, fetched once even if it is also in the universe
    let mut symbols: Vec<&str> = request.tickers.iter().map(String::as_str).collect();
    if !symbols.contains(&request.benchmark.as_str()) {
        symbols.push(&request.benchmark);
    }

    tracing::info!(
        provider = provider.name(),
        symbols = symbols.len(),
        interval = %request.interval,
        start = %request.start,
        end = %request.end,
        "fetching prices"
    );

    let total = symbols.len();
    let mut series: HashMap<String, PriceSeries> = HashMap::with_capacity(total);
    let mut sources = HashMap::with_capacity(total);

    for (i, symbol) in symbols.iter().enumerate() {
        let tag = |source: DataError| FetchError::Symbol {
            symbol: symbol.to_string(),
            interval: request.interval,
            start: request.start,
            end: request.end,
            source,
        };

        if window.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(tag(DataError::Timeout {
                elapsed_secs: started.elapsed().as_secs(),
            }));
        }
        if !provider.is_available() {
            return Err(tag(DataError::Other(format!(
                "provider '{}' is unavailable",
                provider.name()
            ))));
        }

        progress.on_start(symbol, i, total);
        let result = provider.fetch(symbol, &window);
        let report = result.as_ref().map(|r| r.bars.len()).map_err(clone_for_report);
        progress.on_complete(symbol, i, total, &report);

        let fetched = result.map_err(tag)?;
        let points = select_points(&fetched.bars, &window, request.price_field);
        if points.is_empty() {
            return Err(tag(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }));
        }
        sources.insert(symbol.to_string(), fetched.source);
        series.insert(
            symbol.to_string(),
            PriceSeries {
                symbol: symbol.to_string(),
                points,
            },
        );
    }

    progress.on_batch_complete(series.len(), total);

    let equities = request
        .tickers
        .iter()
        .filter_map(|t| series.get(t).cloned())
        .collect();
    let benchmark = series
        .remove(&request.benchmark)
        .ok_or_else(|| FetchError::Symbol {
            symbol: request.benchmark.clone(),
            interval: request.interval,
            start: request.start,
            end: request.end,
            source: DataError::SymbolNotFound {
                symbol: request.benchmark.clone(),
            },
        })?;

    Ok(FetchedPrices {
        equities,
        benchmark,
        sources,
    })
}

/// Intraday data is only served for a recent window.
fn check_lookback(request: &FetchRequest) -> Result<(), DataError> {
    if let Some(max_days) = request.interval.max_lookback_days() {
        let oldest = request.today - chrono::Duration::days(max_days);
        if request.start < oldest {
            return Err(DataError::IntradayLookbackExceeded {
                interval: request.interval,
                max_days,
                start: request.start,
            });
        }
    }
    Ok(())
}

/// Keep in-window bars, sort by time, last bar wins on duplicate timestamps.
fn select_points(
    bars: &[super::provider::RawBar],
    window: &FetchWindow,
    field: PriceField,
) -> Vec<(NaiveDateTime, f64)> {
    let mut by_time = BTreeMap::new();
    for bar in bars.iter().filter(|b| window.contains(b.timestamp)) {
        by_time.insert(bar.timestamp, field.select(bar));
    }
    by_time.into_iter().collect()
}

// DataError is not Clone; progress only needs the message.
fn clone_for_report(e: &DataError) -> DataError {
    DataError::Other(e.to_string())
}
