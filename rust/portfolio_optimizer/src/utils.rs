// src/utils.rs

use crate::models::{Performance, Weights};
use ndarray::{Array1, Array2, ArrayView1};

pub fn portfolio_return(x: &[f64], expected_returns: &Array1<f64>) -> f64 {
    x.iter()
        .zip(expected_returns.iter())
        .map(|(xi, mu)| xi * mu)
        .sum()
}

pub fn portfolio_variance(x: &[f64], covariance: &Array2<f64>) -> f64 {
    let w = ArrayView1::from(x);
    w.dot(&covariance.dot(&w))
}

pub fn portfolio_volatility(x: &[f64], covariance: &Array2<f64>) -> f64 {
    portfolio_variance(x, covariance).max(0.0).sqrt()
}

pub fn portfolio_performance(
    x: &[f64],
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    risk_free_rate: f64,
) -> Performance {
    let expected_annual_return = portfolio_return(x, expected_returns);
    let annual_volatility = portfolio_volatility(x, covariance);
    let sharpe_ratio = if annual_volatility > 0.0 {
        (expected_annual_return - risk_free_rate) / annual_volatility
    } else {
        0.0
    };

    Performance {
        expected_annual_return,
        annual_volatility,
        sharpe_ratio,
    }
}

/// Zeroes weights whose magnitude is below `cutoff`, then rounds to
/// `rounding` decimal places.
pub fn clean_weights(
    tickers: &[String],
    x: &[f64],
    cutoff: f64,
    rounding: Option<u32>,
) -> Weights {
    tickers
        .iter()
        .zip(x.iter())
        .map(|(ticker, &weight)| {
            let mut weight = if weight.abs() < cutoff { 0.0 } else { weight };
            if let Some(places) = rounding {
                let scale = 10f64.powi(places as i32);
                weight = (weight * scale).round() / scale;
            }
            // -0.0 prints badly
            (ticker.clone(), weight + 0.0)
        })
        .collect()
}
