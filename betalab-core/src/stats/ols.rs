//! Single-regressor ordinary least squares with an intercept.
//!
//! Fits `y = alpha + beta * x + e` in closed form and reports the slope's
//! standard error, t-statistic and two-sided p-value (Student-t, `n - 2`
//! degrees of freedom).

use super::distribution::t_two_sided_p;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest sample with one residual degree of freedom after slope and intercept.
pub const MIN_OBSERVATIONS: usize = 3;

/// Relative tolerance below which a sum of squares counts as zero.
const DEGENERATE_TOL: f64 = 1e-14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    pub alpha: f64,
    pub beta: f64,
    pub r_squared: f64,
    /// Standard error of `beta`.
    pub std_err: f64,
    pub t_stat: f64,
    /// Two-sided p-value for H0: beta = 0.
    pub p_value: f64,
    pub nobs: usize,
}

impl OlsFit {
    pub fn df_resid(&self) -> usize {
        self.nobs - 2
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitError {
    #[error("need at least {} observations, got {nobs}", MIN_OBSERVATIONS)]
    InsufficientObservations { nobs: usize },

    #[error("regressor and response lengths differ ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },

    #[error("benchmark returns are constant over the window; slope is undefined")]
    DegenerateRegressor,

    #[error("returns are constant over the window; R-squared is undefined")]
    DegenerateResponse,

    #[error("non-finite value in the regression input")]
    NonFinite,
}

/// Fit `y` on `x` with an intercept.
pub fn fit(y: &[f64], x: &[f64]) -> Result<OlsFit, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    let n = y.len();
    if n < MIN_OBSERVATIONS {
        return Err(FitError::InsufficientObservations { nobs: n });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let nf = n as f64;
    let x_mean = x.iter().sum::<f64>() / nf;
    let y_mean = y.iter().sum::<f64>() / nf;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let x_scale = x.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    if sxx <= DEGENERATE_TOL * x_scale {
        return Err(FitError::DegenerateRegressor);
    }
    let y_scale = y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    if syy <= DEGENERATE_TOL * y_scale {
        return Err(FitError::DegenerateResponse);
    }

    let beta = sxy / sxx;
    let alpha = y_mean - beta * x_mean;

    let ssr = y
        .iter()
        .zip(x)
        .map(|(yi, xi)| {
            let e = yi - alpha - beta * xi;
            e * e
        })
        .sum::<f64>();
    let r_squared = (1.0 - ssr / syy).clamp(0.0, 1.0);

    let df = (n - 2) as f64;
    let sigma2 = ssr / df;
    let std_err = (sigma2 / sxx).sqrt();

    // Residuals vanish: slope is exact.
    let (t_stat, p_value) = if ssr <= DEGENERATE_TOL * syy {
        (f64::INFINITY.copysign(beta), 0.0)
    } else {
        let t = beta / std_err;
        (t, t_two_sided_p(t, df))
    };

    Ok(OlsFit {
        alpha,
        beta,
        r_squared,
        std_err,
        t_stat,
        p_value,
        nobs: n,
    })
}
