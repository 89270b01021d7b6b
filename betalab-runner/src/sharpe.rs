//! Annualised Sharpe ranking over the aligned return panel.
//!
//! `sharpe = (mean * P - rf) / (std * sqrt(P))` with `P` periods per year and
//! the population standard deviation of the per-bar log returns.

use betalab_core::data::ReturnPanel;
use betalab_core::stats::mean_std;
use serde::{Deserialize, Serialize};

use crate::report::{Cell, ReportMeta, Tabular};

pub const SHARPE_COLUMNS: [&str; 2] = ["Ticker", "Sharpe"];

const ZERO_VARIANCE_TOL: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpeRow {
    pub ticker: String,
    pub sharpe: f64,
}

/// A surviving ticker whose ratio is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpeFailure {
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpeReport {
    pub meta: ReportMeta,
    /// Best first, at most `top` rows.
    pub rows: Vec<SharpeRow>,
    pub failures: Vec<SharpeFailure>,
    pub dropped: Vec<String>,
    pub periods_per_year: f64,
    pub risk_free_rate: f64,
    pub nobs: usize,
}

impl Tabular for SharpeReport {
    fn columns(&self) -> &[&'static str] {
        &SHARPE_COLUMNS
    }

    fn cells(&self) -> Vec<Vec<Cell>> {
        self.rows
            .iter()
            .map(|r| vec![Cell::Text(r.ticker.clone()), Cell::Number(r.sharpe)])
            .collect()
    }
}

/// Annualised Sharpe ratio of one return column.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> Option<f64> {
    let (mean, std) = mean_std(returns)?;
    // Rounding noise on a constant series is not variance.
    if std.is_nan() || std <= ZERO_VARIANCE_TOL * mean.abs() || std == 0.0 {
        return None;
    }
    Some((mean * periods_per_year - risk_free_rate) / (std * periods_per_year.sqrt()))
}

/// Rank every surviving ticker, highest ratio first, keep the top `top`.
///
/// Ties keep panel order.
pub fn rank_sharpe(
    meta: ReportMeta,
    panel: &ReturnPanel,
    periods_per_year: f64,
    risk_free_rate: f64,
    top: usize,
) -> SharpeReport {
    let mut rows = Vec::with_capacity(panel.columns.len());
    let mut failures = Vec::new();
    for (ticker, returns) in &panel.columns {
        match sharpe_ratio(returns, periods_per_year, risk_free_rate) {
            Some(sharpe) => rows.push(SharpeRow {
                ticker: ticker.clone(),
                sharpe,
            }),
            None => {
                tracing::warn!(ticker = %ticker, "zero return variance, Sharpe undefined");
                failures.push(SharpeFailure {
                    ticker: ticker.clone(),
                    reason: "zero return variance".into(),
                });
            }
        }
    }
    rows.sort_by(|a, b| b.sharpe.total_cmp(&a.sharpe));
    rows.truncate(top);

    SharpeReport {
        meta,
        rows,
        failures,
        dropped: panel.dropped.iter().map(|d| d.symbol.clone()).collect(),
        periods_per_year,
        risk_free_rate,
        nobs: panel.nobs(),
    }
}
