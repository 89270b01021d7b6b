//! Shared fixtures: an in-memory provider with a request counter.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use betalab_core::data::{
    DataError, DataProvider, DataSource, FetchResult, FetchWindow, RawBar,
};
use betalab_runner::RunConfig;
use chrono::NaiveDate;

pub struct MemoryProvider {
    series: HashMap<String, Vec<(NaiveDate, f64)>>,
    calls: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, symbol: &str, points: Vec<(NaiveDate, f64)>) -> Self {
        self.series.insert(symbol.to_string(), points);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, symbol: &str, _window: &FetchWindow) -> Result<FetchResult, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let points = self.series.get(symbol).ok_or_else(|| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
        let bars = points
            .iter()
            .map(|(date, px)| RawBar {
                timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
                open: *px,
                high: *px,
                low: *px,
                close: *px,
                volume: 1_000,
                adj_close: *px,
            })
            .collect();
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::InMemory,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// First of the month, `i` months after January 2022.
pub fn month(i: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022 + (i / 12) as i32, i % 12 + 1, 1).unwrap()
}

pub fn index_path(n: u32) -> Vec<(NaiveDate, f64)> {
    (0..n)
        .map(|i| (month(i), 100.0 * (1.0 + 0.05 * (i as f64 * 1.7).sin())))
        .collect()
}

/// Loosely tracks the index with exponent `k` plus idiosyncratic wobble.
pub fn stock_path(n: u32, k: f64, wobble: f64) -> Vec<(NaiveDate, f64)> {
    index_path(n)
        .into_iter()
        .enumerate()
        .map(|(i, (d, idx))| {
            (
                d,
                (idx / 100.0).powf(k) * 50.0 * (1.0 + wobble * (i as f64 * 2.3).cos()),
            )
        })
        .collect()
}

/// AAA, BBB, CCC (missing one month) and IDX over 24 months.
pub fn standard_provider() -> MemoryProvider {
    let mut ccc = stock_path(24, 0.7, 0.03);
    ccc.remove(10);
    MemoryProvider::new()
        .with("IDX", index_path(24))
        .with("AAA", stock_path(24, 1.3, 0.02))
        .with("BBB", stock_path(24, 0.8, 0.04))
        .with("CCC", ccc)
}

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn config(tickers: &[&str]) -> RunConfig {
    RunConfig {
        tickers: Some(toml::Value::Array(
            tickers
                .iter()
                .map(|t| toml::Value::String(t.to_string()))
                .collect(),
        )),
        benchmark: Some("IDX".into()),
        start: Some("2022-01-01".into()),
        end: Some("2024-01-01".into()),
        interval: Some("1mo".into()),
        output_mode: Some("T".into()),
        ..RunConfig::default()
    }
}
