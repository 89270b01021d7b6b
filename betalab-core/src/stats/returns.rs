//! Logarithmic returns.

/// `ln(P_t / P_{t-1})` for each consecutive pair.
///
/// The output is one element shorter than the input. A pair with a missing
/// (`NaN`) or non-positive price yields `NaN`, which the alignment stage
/// treats as a missing observation.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| log_return(w[0], w[1]))
        .collect()
}

/// Single-step log return, `NaN` when undefined.
pub fn log_return(prev: f64, next: f64) -> f64 {
    let r = (next / prev).ln();
    if r.is_finite() {
        r
    } else {
        f64::NAN
    }
}

/// Mean and population standard deviation (ddof = 0).
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
