//! Beta report: rows in survival order plus the diagnostics behind them.

use crate::engine::{Estimates, FitFailure};
use betalab_core::data::ReturnPanel;
use betalab_core::stats::OlsFit;
use chrono::NaiveDate;
use indexmap::IndexMap;
use polars::prelude::{Column, DataFrame, PolarsResult};
use serde::{Deserialize, Serialize};

pub const BETA_COLUMNS: [&str; 5] = ["Ticker", "Beta", "R-squared", "P-value", "Obs."];

/// One cell of an exported table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    /// Plain-text rendering; `f64` Display never uses exponent notation.
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// Anything the sinks can write: a header plus rows of cells.
pub trait Tabular {
    fn columns(&self) -> &[&'static str];
    fn cells(&self) -> Vec<Vec<Cell>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub ticker: String,
    /// Rounded to 3 dp.
    pub beta: f64,
    /// Rounded to 3 dp.
    pub r_squared: f64,
    /// Full-precision fixed-point text.
    pub p_value: String,
    pub observations: u64,
}

impl ReportRow {
    pub fn from_fit(ticker: &str, fit: &OlsFit) -> Self {
        Self {
            ticker: ticker.to_string(),
            beta: round3(fit.beta),
            r_squared: round3(fit.r_squared),
            p_value: fixed_point(fit.p_value),
            observations: fit.nobs as u64,
        }
    }
}

/// Window metadata carried alongside the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub benchmark: String,
    pub interval: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaReport {
    pub meta: ReportMeta,
    pub rows: Vec<ReportRow>,
    pub fits: IndexMap<String, OlsFit>,
    pub failures: Vec<FitFailure>,
    /// Tickers removed for missing data.
    pub dropped: Vec<String>,
    /// Rows in the aligned panel.
    pub nobs: usize,
    /// BLAKE3 hash of the aligned returns that fed the fits.
    pub dataset_hash: String,
}

impl BetaReport {
    pub fn compile(meta: ReportMeta, panel: &ReturnPanel, estimates: Estimates) -> Self {
        let rows = estimates
            .fits
            .iter()
            .map(|(ticker, fit)| ReportRow::from_fit(ticker, fit))
            .collect();
        Self {
            meta,
            rows,
            fits: estimates.fits,
            failures: estimates.failures,
            dropped: panel.dropped.iter().map(|d| d.symbol.clone()).collect(),
            nobs: panel.nobs(),
            dataset_hash: dataset_hash(panel),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The five report columns as a polars frame.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let tickers: Vec<&str> = self.rows.iter().map(|r| r.ticker.as_str()).collect();
        let betas: Vec<f64> = self.rows.iter().map(|r| r.beta).collect();
        let r2: Vec<f64> = self.rows.iter().map(|r| r.r_squared).collect();
        let p: Vec<&str> = self.rows.iter().map(|r| r.p_value.as_str()).collect();
        let obs: Vec<u64> = self.rows.iter().map(|r| r.observations).collect();

        DataFrame::new(vec![
            Column::new(BETA_COLUMNS[0].into(), tickers),
            Column::new(BETA_COLUMNS[1].into(), betas),
            Column::new(BETA_COLUMNS[2].into(), r2),
            Column::new(BETA_COLUMNS[3].into(), p),
            Column::new(BETA_COLUMNS[4].into(), obs),
        ])
    }
}

impl Tabular for BetaReport {
    fn columns(&self) -> &[&'static str] {
        &BETA_COLUMNS
    }

    fn cells(&self) -> Vec<Vec<Cell>> {
        self.rows
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.ticker.clone()),
                    Cell::Number(r.beta),
                    Cell::Number(r.r_squared),
                    Cell::Text(r.p_value.clone()),
                    Cell::Number(r.observations as f64),
                ]
            })
            .collect()
    }
}

pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Decimal text without exponent and without rounding.
pub fn fixed_point(x: f64) -> String {
    format!("{x}")
}

/// Hash of the aligned panel, column order included.
pub fn dataset_hash(panel: &ReturnPanel) -> String {
    let mut hasher = blake3::Hasher::new();
    for ts in &panel.timestamps {
        hasher.update(ts.to_string().as_bytes());
    }
    hasher.update(panel.benchmark_symbol.as_bytes());
    for r in &panel.benchmark {
        hasher.update(&r.to_le_bytes());
    }
    for (symbol, returns) in &panel.columns {
        hasher.update(symbol.as_bytes());
        for r in returns {
            hasher.update(&r.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
