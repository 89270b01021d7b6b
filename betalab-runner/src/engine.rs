//! Per-ticker beta estimation over an aligned return panel.

use betalab_core::data::ReturnPanel;
use betalab_core::stats::{fit, FitError, OlsFit};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A ticker that survived alignment but could not be fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    pub ticker: String,
    pub reason: FitError,
}

/// Fits in canonical (universe) order plus the tickers that failed.
#[derive(Debug, Clone, Default)]
pub struct Estimates {
    pub fits: IndexMap<String, OlsFit>,
    pub failures: Vec<FitFailure>,
}

/// Regress every surviving column on the benchmark.
///
/// Fits run on the rayon pool; the indexed collect keeps panel order.
pub fn estimate_betas(panel: &ReturnPanel) -> Estimates {
    let columns: Vec<(&String, &Vec<f64>)> = panel.columns.iter().collect();
    let results: Vec<(String, Result<OlsFit, FitError>)> = columns
        .par_iter()
        .map(|(ticker, returns)| ((*ticker).clone(), fit(returns, &panel.benchmark)))
        .collect();

    let mut estimates = Estimates::default();
    for (ticker, result) in results {
        match result {
            Ok(ols) => {
                tracing::debug!(ticker = %ticker, beta = ols.beta, r2 = ols.r_squared, "fitted");
                estimates.fits.insert(ticker, ols);
            }
            Err(reason) => {
                tracing::warn!(ticker = %ticker, %reason, "skipping ticker");
                estimates.failures.push(FitFailure { ticker, reason });
            }
        }
    }
    estimates
}
