//! Multi-symbol time alignment and the aligned return panel.
//!
//! Prices for every symbol are placed on the union of all timestamps, with
//! strict NaN where a symbol has no bar (no forward-fill). Log returns are
//! taken row by row, the first row is discarded, and any column with a
//! single missing return is dropped whole.

use super::download::{FetchedPrices, PriceSeries};
use crate::stats::returns::log_returns;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignError {
    #[error(
        "benchmark '{symbol}' has {missing} missing observation(s) in the window; \
         cannot regress against it"
    )]
    BenchmarkIncomplete { symbol: String, missing: usize },
}

/// Prices for several symbols on a common timeline.
#[derive(Debug, Clone)]
pub struct PricePanel {
    /// The common time axis (sorted ascending).
    pub timestamps: Vec<NaiveDateTime>,
    /// Equity prices in universe order. Each has the same length as `timestamps`.
    pub columns: IndexMap<String, Vec<f64>>,
    pub benchmark_symbol: String,
    pub benchmark: Vec<f64>,
}

/// Align equities and the benchmark to the union of their timestamps.
pub fn align_prices(prices: &FetchedPrices) -> PricePanel {
    let mut all_times = BTreeSet::new();
    for series in prices.equities.iter().chain(std::iter::once(&prices.benchmark)) {
        all_times.extend(series.points.iter().map(|(ts, _)| *ts));
    }
    let timestamps: Vec<NaiveDateTime> = all_times.into_iter().collect();

    let columns = prices
        .equities
        .iter()
        .map(|s| (s.symbol.clone(), on_axis(s, &timestamps)))
        .collect();

    PricePanel {
        benchmark_symbol: prices.benchmark.symbol.clone(),
        benchmark: on_axis(&prices.benchmark, &timestamps),
        timestamps,
        columns,
    }
}

fn on_axis(series: &PriceSeries, axis: &[NaiveDateTime]) -> Vec<f64> {
    let lookup: HashMap<NaiveDateTime, f64> = series.points.iter().copied().collect();
    axis.iter()
        .map(|ts| lookup.get(ts).copied().unwrap_or(f64::NAN))
        .collect()
}

/// A ticker removed by the all-or-nothing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedColumn {
    pub symbol: String,
    /// Number of missing returns in the window.
    pub missing: usize,
}

/// Complete return columns on a shared index. This is the regression input.
#[derive(Debug, Clone)]
pub struct ReturnPanel {
    /// Row timestamps (the first price timestamp has no return).
    pub timestamps: Vec<NaiveDateTime>,
    /// Surviving equity returns, in universe order.
    pub columns: IndexMap<String, Vec<f64>>,
    pub benchmark_symbol: String,
    pub benchmark: Vec<f64>,
    /// Equities dropped for missing data, in universe order.
    pub dropped: Vec<DroppedColumn>,
}

impl ReturnPanel {
    /// Derive returns and apply the strict column-drop rule.
    ///
    /// Fails only if the benchmark itself has a gap: every fit would then be
    /// against an incomplete regressor.
    pub fn from_prices(panel: &PricePanel) -> Result<Self, AlignError> {
        let benchmark = log_returns(&panel.benchmark);
        let missing = count_missing(&benchmark);
        if missing > 0 {
            return Err(AlignError::BenchmarkIncomplete {
                symbol: panel.benchmark_symbol.clone(),
                missing,
            });
        }

        let mut columns = IndexMap::with_capacity(panel.columns.len());
        let mut dropped = Vec::new();
        for (symbol, prices) in &panel.columns {
            let returns = log_returns(prices);
            match count_missing(&returns) {
                0 => {
                    columns.insert(symbol.clone(), returns);
                }
                missing => {
                    tracing::warn!(symbol = %symbol, missing, "dropping ticker with incomplete data");
                    dropped.push(DroppedColumn {
                        symbol: symbol.clone(),
                        missing,
                    });
                }
            }
        }

        Ok(Self {
            timestamps: panel.timestamps.iter().skip(1).copied().collect(),
            columns,
            benchmark_symbol: panel.benchmark_symbol.clone(),
            benchmark,
            dropped,
        })
    }

    /// Rows in the aligned panel; identical for every surviving column.
    pub fn nobs(&self) -> usize {
        self.benchmark.len()
    }

    /// Surviving tickers in order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn count_missing(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}
