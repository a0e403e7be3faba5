// src/estimators.rs

use ndarray::{Array1, Array2, Axis};
use price_service::PriceTable;
use thiserror::Error;

/// Trading days per year.
pub const FREQUENCY: usize = 252;

#[derive(Debug, Error, PartialEq)]
pub enum EstimationError {
    #[error("Need at least {needed} complete price rows, got {found}")]
    InsufficientData { needed: usize, found: usize },
    #[error("Price table still has missing cells")]
    MissingPrices,
    #[error("Estimate for {0} is not a finite number")]
    NonFinite(String),
}

/// Annualized expected returns and covariance for a set of tickers, in
/// price table column order.
#[derive(Debug, Clone)]
pub struct Estimates {
    pub tickers: Vec<String>,
    pub expected_returns: Array1<f64>,
    pub covariance: Array2<f64>,
    pub shrinkage: f64,
}

pub fn prices_to_matrix(table: &PriceTable) -> Result<Array2<f64>, EstimationError> {
    let rows = table.to_matrix().ok_or(EstimationError::MissingPrices)?;
    let n_cols = table.tickers().len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((flat.len() / n_cols, n_cols), flat)
        .map_err(|_| EstimationError::MissingPrices)
}

// Simple daily returns, one row per consecutive pair of price rows
pub fn returns_from_prices(prices: &Array2<f64>) -> Array2<f64> {
    let n = prices.nrows();
    if n < 2 {
        return Array2::zeros((0, prices.ncols()));
    }
    let current = prices.slice(ndarray::s![1.., ..]);
    let previous = prices.slice(ndarray::s![..n - 1, ..]);
    &current / &previous - 1.0
}

/// Compounded annual growth rate of each column:
/// `prod(1 + r)^(frequency / count) - 1`.
pub fn mean_historical_return(
    prices: &Array2<f64>,
    frequency: usize,
) -> Result<Array1<f64>, EstimationError> {
    let returns = returns_from_prices(prices);
    let count = returns.nrows();
    if count < 2 {
        return Err(EstimationError::InsufficientData {
            needed: 3,
            found: prices.nrows(),
        });
    }

    let growth = (returns + 1.0).map_axis(Axis(0), |column| column.product());
    Ok(growth.mapv(|g| g.powf(frequency as f64 / count as f64) - 1.0))
}

/// Covariance of `returns` (biased, divides by n) after removing column means.
pub fn sample_covariance(returns: &Array2<f64>) -> Array2<f64> {
    let n = returns.nrows() as f64;
    let centered = returns - &returns.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(returns.ncols()));
    centered.t().dot(&centered) / n
}

/// Ledoit-Wolf shrinkage of the return covariance towards a scaled identity.
///
/// Returns the annualized shrunk covariance and the shrinkage intensity in
/// `[0, 1]`. The target is `mu * I` where `mu` is the average sample variance.
pub fn ledoit_wolf(
    prices: &Array2<f64>,
    frequency: usize,
) -> Result<(Array2<f64>, f64), EstimationError> {
    let returns = returns_from_prices(prices);
    let n_samples = returns.nrows();
    let n_features = returns.ncols();
    if n_samples < 2 {
        return Err(EstimationError::InsufficientData {
            needed: 3,
            found: prices.nrows(),
        });
    }

    let means = returns
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_features));
    let x = &returns - &means;
    let emp_cov = sample_covariance(&returns);

    if n_features == 1 {
        return Ok((emp_cov * frequency as f64, 0.0));
    }

    let shrinkage = ledoit_wolf_shrinkage(&x);
    let mu = emp_cov.diag().sum() / n_features as f64;

    let mut shrunk = emp_cov * (1.0 - shrinkage);
    for i in 0..n_features {
        shrunk[[i, i]] += shrinkage * mu;
    }

    Ok((shrunk * frequency as f64, shrinkage))
}

// Optimal shrinkage intensity for centered observations `x` (n_samples x n_features)
fn ledoit_wolf_shrinkage(x: &Array2<f64>) -> f64 {
    let n_samples = x.nrows() as f64;
    let n_features = x.ncols() as f64;

    let x2 = x.mapv(|v| v * v);
    let emp_cov_trace = x2.sum_axis(Axis(0)) / n_samples;
    let mu = emp_cov_trace.sum() / n_features;

    let beta_ = x2.t().dot(&x2).sum();
    let delta_ = x.t().dot(x).mapv(|v| v * v).sum() / (n_samples * n_samples);

    let beta = (beta_ / n_samples - delta_) / (n_features * n_samples);
    let delta =
        (delta_ - 2.0 * mu * emp_cov_trace.sum() + n_features * mu * mu) / n_features;

    if delta <= 0.0 {
        return 0.0;
    }
    let beta = beta.min(delta);
    (beta / delta).clamp(0.0, 1.0)
}

/// Expected returns and shrunk covariance from a complete price table.
pub fn estimate(table: &PriceTable, frequency: usize) -> Result<Estimates, EstimationError> {
    let prices = prices_to_matrix(table)?;
    let expected_returns = mean_historical_return(&prices, frequency)?;
    let (covariance, shrinkage) = ledoit_wolf(&prices, frequency)?;

    for (ticker, value) in table.tickers().iter().zip(expected_returns.iter()) {
        if !value.is_finite() {
            return Err(EstimationError::NonFinite(format!("expected return of {}", ticker)));
        }
    }
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::NonFinite("covariance matrix".to_string()));
    }

    Ok(Estimates {
        tickers: table.tickers().to_vec(),
        expected_returns,
        covariance,
        shrinkage,
    })
}
