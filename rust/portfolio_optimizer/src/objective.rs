// src/objective.rs

use ndarray::{Array1, Array2, ArrayView1};

/// Data for the max-Sharpe problem in its convex form:
///
///   minimize    y' S y
///   subject to  (mu - rf)' y = 1,  y >= 0
///
/// The optimal weights are `y / sum(y)`.
#[derive(Clone)]
pub struct SharpeParams {
    pub covariance: Array2<f64>,
    pub excess_returns: Array1<f64>,
}

impl SharpeParams {
    pub fn new(expected_returns: &Array1<f64>, covariance: &Array2<f64>, risk_free_rate: f64) -> Self {
        SharpeParams {
            covariance: covariance.clone(),
            excess_returns: expected_returns - risk_free_rate,
        }
    }

    // Feasible starting point: positive excess returns, scaled onto the constraint
    pub fn initial_guess(&self) -> Vec<f64> {
        let positive = self.excess_returns.mapv(|e| e.max(0.0));
        let scale = positive.dot(&self.excess_returns);
        if scale > 0.0 {
            (positive / scale).to_vec()
        } else {
            vec![0.0; self.excess_returns.len()]
        }
    }
}

pub fn objective_function(
    x: &[f64],
    grad: Option<&mut [f64]>,
    params: &mut SharpeParams,
) -> f64 {
    let y = ArrayView1::from(x);
    let sy = params.covariance.dot(&y);

    if let Some(grad) = grad {
        for (g, s) in grad.iter_mut().zip(sy.iter()) {
            *g = 2.0 * s;
        }
    }

    y.dot(&sy)
}

// (mu - rf)' y - 1, which must be zero at a solution
pub fn excess_return_constraint(
    x: &[f64],
    grad: Option<&mut [f64]>,
    excess_returns: &mut Array1<f64>,
) -> f64 {
    if let Some(grad) = grad {
        for (g, e) in grad.iter_mut().zip(excess_returns.iter()) {
            *g = *e;
        }
    }
    ArrayView1::from(x).dot(&*excess_returns) - 1.0
}
