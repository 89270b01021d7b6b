//! Return arithmetic and regression statistics.

pub mod distribution;
pub mod ols;
pub mod returns;

pub use ols::{fit, FitError, OlsFit};
pub use returns::{log_returns, mean_std};
