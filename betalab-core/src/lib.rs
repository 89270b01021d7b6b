//! betalab core: market data retrieval, return alignment, and OLS beta
//! estimation.
//!
//! - Ticker universe resolution from lists or spreadsheet/CSV files
//! - `DataProvider` trait with Yahoo Finance and CSV-directory providers
//! - Strict multi-symbol alignment of log returns
//! - Closed-form single-regressor OLS with Student-t p-values

pub mod data;
pub mod stats;
