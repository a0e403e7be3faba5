// src/allocation.rs

use crate::models::{Allocation, Weights};
use highs::{HighsModelStatus, RowProblem, Sense};
use ordered_float::NotNan;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("No ticker has a positive weight")]
    NoPositiveWeights,
    #[error("No latest price for {0}")]
    MissingPrice(String),
    #[error("Latest price of {ticker} is not a positive number: {price}")]
    InvalidPrice { ticker: String, price: f64 },
    #[error("Total portfolio value must be a positive number, got {0}")]
    InvalidTotal(f64),
    #[error("Amount ${amount:.2} cannot buy a single share, the cheapest costs ${cheapest:.2}")]
    Unaffordable { amount: f64, cheapest: f64 },
    #[error("Allocation solver failed: {0}")]
    Solver(String),
}

/// Turns continuous weights into whole share counts for a cash amount.
#[derive(Debug)]
pub struct DiscreteAllocation {
    // (ticker, weight, latest price) for every positively weighted ticker
    assets: Vec<(String, f64, f64)>,
    total_value: f64,
}

impl DiscreteAllocation {
    pub fn new(
        weights: &Weights,
        latest_prices: &BTreeMap<String, f64>,
        total_value: f64,
    ) -> Result<Self, AllocationError> {
        if !(total_value.is_finite() && total_value > 0.0) {
            return Err(AllocationError::InvalidTotal(total_value));
        }

        let mut assets = Vec::new();
        for (ticker, &weight) in weights.iter().filter(|(_, w)| **w > 0.0) {
            let price = *latest_prices
                .get(ticker)
                .ok_or_else(|| AllocationError::MissingPrice(ticker.clone()))?;
            if !(price.is_finite() && price > 0.0) {
                return Err(AllocationError::InvalidPrice {
                    ticker: ticker.clone(),
                    price,
                });
            }
            assets.push((ticker.clone(), weight, price));
        }
        if assets.is_empty() {
            return Err(AllocationError::NoPositiveWeights);
        }

        Ok(DiscreteAllocation {
            assets,
            total_value,
        })
    }

    pub fn cheapest_price(&self) -> Option<f64> {
        self.assets
            .iter()
            .filter_map(|(_, _, price)| NotNan::new(*price).ok())
            .min()
            .map(NotNan::into_inner)
    }

    /// Mixed-integer allocation that minimizes the absolute gap between target
    /// and bought value per ticker plus the cash left over. The leftover ends
    /// below the price of the cheapest weighted share.
    pub fn lp_portfolio(&self) -> Result<Allocation, AllocationError> {
        let amount = self.total_value;
        if let Some(cheapest) = self.cheapest_price() {
            if amount < cheapest {
                return Err(AllocationError::Unaffordable { amount, cheapest });
            }
        }

        // sum(u) + (V - p'x) with the constant V dropped
        let mut problem = RowProblem::default();
        let mut shares = Vec::with_capacity(self.assets.len());
        let mut gaps = Vec::with_capacity(self.assets.len());
        for (_, _, price) in &self.assets {
            shares.push(problem.add_integer_column(-price, 0.0..));
            gaps.push(problem.add_column(1.0, 0.0..));
        }

        // Budget: p'x <= V
        let budget: Vec<_> = shares
            .iter()
            .zip(&self.assets)
            .map(|(col, (_, _, price))| (*col, *price))
            .collect();
        problem.add_row(..=amount, &budget);

        // |w_i V - p_i x_i| <= u_i
        for ((share, gap), (_, weight, price)) in shares.iter().zip(&gaps).zip(&self.assets) {
            let target = weight * amount;
            problem.add_row(..=-target, &[(*share, -price), (*gap, -1.0)]);
            problem.add_row(..=target, &[(*share, *price), (*gap, -1.0)]);
        }

        let mut model = problem.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        let solved = model
            .try_solve()
            .map_err(|status| AllocationError::Solver(format!("{:?}", status)))?;
        if solved.status() != HighsModelStatus::Optimal {
            return Err(AllocationError::Solver(format!(
                "model status {:?}",
                solved.status()
            )));
        }

        let solution = solved.get_solution();
        let values = solution.columns();
        // Shares are columns 0, 2, 4, ... interleaved with their gaps
        let mut counts: Vec<u64> = (0..self.assets.len())
            .map(|i| values[2 * i].round().max(0.0) as u64)
            .collect();
        let spent = self.spent(&counts);
        if spent > amount + 1e-6 {
            return Err(AllocationError::Solver(format!(
                "allocation spends ${:.2} of ${:.2}",
                spent, amount
            )));
        }
        self.top_up(&mut counts);

        let leftover = (amount - self.spent(&counts)).max(0.0);
        let allocation: BTreeMap<String, u64> = self
            .assets
            .iter()
            .map(|(ticker, _, _)| ticker.clone())
            .zip(counts)
            .collect();
        debug!("Allocated {:?} with ${:.2} left over", allocation, leftover);

        Ok(Allocation {
            shares: allocation,
            leftover,
        })
    }

    fn spent(&self, counts: &[u64]) -> f64 {
        self.assets
            .iter()
            .zip(counts)
            .map(|((_, _, price), count)| *count as f64 * price)
            .sum()
    }

    // The objective ties between holding cash and buying a share of an asset
    // already at its target. Spend until no weighted asset fits the leftover,
    // always on the affordable asset furthest below its target value.
    fn top_up(&self, counts: &mut [u64]) {
        let mut leftover = self.total_value - self.spent(counts);
        loop {
            let candidate = self
                .assets
                .iter()
                .zip(counts.iter())
                .enumerate()
                .filter(|(_, ((_, _, price), _))| *price <= leftover + 1e-9)
                .filter_map(|(i, ((_, weight, price), count))| {
                    let shortfall = weight * self.total_value - *count as f64 * price;
                    NotNan::new(shortfall).ok().map(|s| (s, i))
                })
                .max();
            let Some((_, i)) = candidate else {
                break;
            };
            counts[i] += 1;
            leftover -= self.assets[i].2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(entries: &[(&str, f64)]) -> Weights {
        entries.iter().map(|(t, w)| (t.to_string(), *w)).collect()
    }

    fn prices(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn test_exact_allocation() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 0.5), ("SUSA", 0.5)]),
            &prices(&[("ESGU", 100.0), ("SUSA", 50.0)]),
            1000.0,
        )
        .unwrap();

        let allocation = da.lp_portfolio().unwrap();
        assert_eq!(allocation.shares["ESGU"], 5);
        assert_eq!(allocation.shares["SUSA"], 10);
        assert!(allocation.leftover.abs() < 1e-9);
    }

    #[test]
    fn test_leftover_accounts_for_amount() {
        let latest = prices(&[("ESGU", 97.3), ("SUSA", 81.12), ("ESG", 33.4)]);
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 0.45), ("SUSA", 0.35), ("ESG", 0.2)]),
            &latest,
            10000.0,
        )
        .unwrap();

        let allocation = da.lp_portfolio().unwrap();
        let spent = allocation.spent(&latest);
        assert!(spent <= 10000.0);
        assert!(allocation.leftover >= 0.0);
        assert!(allocation.leftover < da.cheapest_price().unwrap() + 1e-6);
        assert!((10000.0 - spent - allocation.leftover).abs() < 1e-6);
        // No position drifts further from its target than one share of everything
        let basket: f64 = latest.values().sum();
        for (ticker, weight) in [("ESGU", 0.45), ("SUSA", 0.35), ("ESG", 0.2)] {
            let value = allocation.shares[ticker] as f64 * latest[ticker];
            assert!((value - weight * 10000.0).abs() <= basket);
        }
    }

    #[test]
    fn test_expensive_asset_gets_no_shares() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 0.5), ("VSGX", 0.5)]),
            &prices(&[("ESGU", 50.0), ("VSGX", 1500.0)]),
            1000.0,
        )
        .unwrap();

        let allocation = da.lp_portfolio().unwrap();
        assert_eq!(allocation.shares["VSGX"], 0);
        assert!(allocation.shares["ESGU"] > 0);
        assert!(allocation.leftover >= 0.0);
        // Cash that could still buy ESGU is spent on it
        assert!(allocation.leftover < 50.0);
        assert_eq!(allocation.shares["ESGU"], 20);
    }

    #[test]
    fn test_top_up_spends_tied_cash() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 0.5), ("VSGX", 0.5)]),
            &prices(&[("ESGU", 50.0), ("VSGX", 1500.0)]),
            1000.0,
        )
        .unwrap();

        // Ten ESGU shares meet the target exactly and score the same as twenty
        let mut counts = vec![10, 0];
        da.top_up(&mut counts);
        assert_eq!(counts, vec![20, 0]);
        assert_eq!(da.spent(&counts), 1000.0);
    }

    #[test]
    fn test_top_up_spends_down_to_cheapest_share() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESG", 0.3), ("ESGU", 0.7)]),
            &prices(&[("ESG", 40.0), ("ESGU", 60.0)]),
            1000.0,
        )
        .unwrap();

        // ESGU ($100 short) is bought first, then ESG ($60 short), then ESGU again
        let mut counts = vec![6, 10];
        da.top_up(&mut counts);
        assert_eq!(counts, vec![7, 12]);

        let leftover = 1000.0 - da.spent(&counts);
        assert!(leftover >= 0.0);
        assert!(leftover < da.cheapest_price().unwrap());
    }

    #[test]
    fn test_nothing_affordable() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 0.5), ("VSGX", 0.5)]),
            &prices(&[("ESGU", 1200.0), ("VSGX", 1500.0)]),
            1000.0,
        )
        .unwrap();

        assert_eq!(da.cheapest_price(), Some(1200.0));
        assert_eq!(
            da.lp_portfolio(),
            Err(AllocationError::Unaffordable {
                amount: 1000.0,
                cheapest: 1200.0
            })
        );
    }

    #[test]
    fn test_zero_weights_are_ignored() {
        let da = DiscreteAllocation::new(
            &weights(&[("ESGU", 1.0), ("SUSA", 0.0)]),
            &prices(&[("ESGU", 100.0)]),
            1000.0,
        )
        .unwrap();

        let allocation = da.lp_portfolio().unwrap();
        assert_eq!(allocation.shares.len(), 1);
        assert_eq!(allocation.shares["ESGU"], 10);
    }

    #[test]
    fn test_invalid_inputs() {
        let w = weights(&[("ESGU", 1.0)]);
        assert_eq!(
            DiscreteAllocation::new(&w, &prices(&[]), 1000.0).err(),
            Some(AllocationError::MissingPrice("ESGU".to_string()))
        );
        assert!(matches!(
            DiscreteAllocation::new(&w, &prices(&[("ESGU", -1.0)]), 1000.0),
            Err(AllocationError::InvalidPrice { .. })
        ));
        assert_eq!(
            DiscreteAllocation::new(&w, &prices(&[("ESGU", 10.0)]), f64::NAN).err().map(|e| e.to_string()),
            Some("Total portfolio value must be a positive number, got NaN".to_string())
        );
        assert_eq!(
            DiscreteAllocation::new(&weights(&[("ESGU", 0.0)]), &prices(&[]), 1000.0).err(),
            Some(AllocationError::NoPositiveWeights)
        );
    }
}
