// src/efficient_frontier.rs

use crate::estimators::Estimates;
use crate::models::{Performance, Weights};
use crate::objective::{excess_return_constraint, objective_function, SharpeParams};
use crate::utils::{clean_weights, portfolio_performance};
use ndarray::{Array1, Array2};
use nlopt::{Algorithm, FailState, Nlopt, Target};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
pub enum OptimizationError {
    #[error("No assets to optimize")]
    Empty,
    #[error("{tickers} tickers, {returns} expected returns and a {rows}x{cols} covariance matrix do not match")]
    DimensionMismatch {
        tickers: usize,
        returns: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Expected returns or covariance contain non-finite values")]
    NonFinite,
    #[error("Covariance matrix is not symmetric")]
    NotSymmetric,
    #[error("At least one asset must have an expected return above the risk-free rate of {0}")]
    NoPositiveExcessReturn(f64),
    #[error("Optimization infeasible: {0}")]
    Solver(String),
    #[error("Weights have not been optimized yet")]
    NotOptimized,
}

/// Long-only mean-variance optimizer over a fixed set of tickers.
pub struct EfficientFrontier {
    tickers: Vec<String>,
    expected_returns: Array1<f64>,
    covariance: Array2<f64>,
    weights: Option<Vec<f64>>,
}

impl EfficientFrontier {
    pub fn new(
        tickers: Vec<String>,
        expected_returns: Array1<f64>,
        covariance: Array2<f64>,
    ) -> Result<Self, OptimizationError> {
        if tickers.is_empty() {
            return Err(OptimizationError::Empty);
        }
        let n = tickers.len();
        if expected_returns.len() != n || covariance.nrows() != n || covariance.ncols() != n {
            return Err(OptimizationError::DimensionMismatch {
                tickers: n,
                returns: expected_returns.len(),
                rows: covariance.nrows(),
                cols: covariance.ncols(),
            });
        }
        if expected_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(OptimizationError::NonFinite);
        }
        let scale = covariance.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);
        for i in 0..n {
            for j in (i + 1)..n {
                if (covariance[[i, j]] - covariance[[j, i]]).abs() > 1e-10 * scale {
                    return Err(OptimizationError::NotSymmetric);
                }
            }
        }

        Ok(EfficientFrontier {
            tickers,
            expected_returns,
            covariance,
            weights: None,
        })
    }

    pub fn from_estimates(estimates: &Estimates) -> Result<Self, OptimizationError> {
        EfficientFrontier::new(
            estimates.tickers.clone(),
            estimates.expected_returns.clone(),
            estimates.covariance.clone(),
        )
    }

    /// Weights as solved, before any cleaning.
    pub fn raw_weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Solves for the long-only portfolio with the highest Sharpe ratio and
    /// stores the result as this frontier's weights.
    pub fn max_sharpe(&mut self, risk_free_rate: f64) -> Result<Weights, OptimizationError> {
        let params = SharpeParams::new(&self.expected_returns, &self.covariance, risk_free_rate);
        if !params.excess_returns.iter().any(|e| *e > 0.0) {
            return Err(OptimizationError::NoPositiveExcessReturn(risk_free_rate));
        }

        let dimension = self.tickers.len();
        let excess_returns = params.excess_returns.clone();
        let mut y = params.initial_guess();

        let mut opt = Nlopt::new(
            Algorithm::Slsqp,
            dimension,
            objective_function,
            Target::Minimize,
            params,
        );

        // y >= 0 keeps the portfolio long-only
        opt.set_lower_bounds(&vec![0.0; dimension])
            .map_err(|e| OptimizationError::Solver(format!("Failed to set lower bounds: {:?}", e)))?;
        opt.add_equality_constraint(excess_return_constraint, excess_returns.clone(), 1e-10)
            .map_err(|e| {
                OptimizationError::Solver(format!("Failed to add equality constraint: {:?}", e))
            })?;
        opt.set_xtol_rel(1e-10)
            .map_err(|e| OptimizationError::Solver(format!("Failed to set xtol_rel: {:?}", e)))?;
        opt.set_maxeval(5000)
            .map_err(|e| OptimizationError::Solver(format!("Failed to set maxeval: {:?}", e)))?;

        match opt.optimize(&mut y) {
            Ok((state, value)) => {
                debug!("SLSQP finished with {:?}, objective {:.6e}", state, value)
            }
            Err((FailState::RoundoffLimited, value)) => {
                warn!("SLSQP stopped on roundoff, objective {:.6e}", value)
            }
            Err((state, _)) => {
                return Err(OptimizationError::Solver(format!(
                    "Optimization failed: {:?}",
                    state
                )))
            }
        }

        let residual: f64 = y
            .iter()
            .zip(excess_returns.iter())
            .map(|(yi, e)| yi * e)
            .sum::<f64>()
            - 1.0;
        if !residual.is_finite() || residual.abs() > 1e-6 {
            return Err(OptimizationError::Solver(format!(
                "excess return constraint violated by {:e}",
                residual
            )));
        }

        let y: Vec<f64> = y.into_iter().map(|v| v.max(0.0)).collect();
        let total: f64 = y.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(OptimizationError::Solver(
                "solution has no positive weights".to_string(),
            ));
        }

        let weights: Vec<f64> = y.iter().map(|v| v / total).collect();
        let raw = self
            .tickers
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect();
        self.weights = Some(weights);
        Ok(raw)
    }

    /// Solved weights with values below `cutoff` zeroed and the rest rounded.
    pub fn clean_weights(
        &self,
        cutoff: f64,
        rounding: Option<u32>,
    ) -> Result<Weights, OptimizationError> {
        let weights = self.weights.as_ref().ok_or(OptimizationError::NotOptimized)?;
        Ok(clean_weights(&self.tickers, weights, cutoff, rounding))
    }

    /// Expected return, volatility and Sharpe ratio of the solved (uncleaned) weights.
    pub fn portfolio_performance(&self, risk_free_rate: f64) -> Result<Performance, OptimizationError> {
        let weights = self.weights.as_ref().ok_or(OptimizationError::NotOptimized)?;
        Ok(portfolio_performance(
            weights,
            &self.expected_returns,
            &self.covariance,
            risk_free_rate,
        ))
    }
}
