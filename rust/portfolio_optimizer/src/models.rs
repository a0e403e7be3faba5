// src/models.rs

use chrono::NaiveDate;
use price_service::PriceRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::{Validate, ValidationError};

/// ESG funds offered by the ticker picker.
pub const CANDIDATE_TICKERS: [&str; 4] = ["ESGU", "SUSA", "ESG", "VSGX"];

pub const MIN_INVESTMENT: f64 = 1000.0;
pub const DEFAULT_INVESTMENT: f64 = 10000.0;
pub const INVESTMENT_STEP: f64 = 1000.0;

pub type Weights = BTreeMap<String, f64>;

pub fn default_tickers() -> Vec<String> {
    CANDIDATE_TICKERS.iter().map(|t| t.to_string()).collect()
}

pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn default_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or(NaiveDate::MAX)
}

fn default_investment() -> f64 {
    DEFAULT_INVESTMENT
}

/// One "fetch & optimize" action. Every field falls back to the form defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_candidates"))]
pub struct OptimizeRequest {
    #[serde(default = "default_tickers")]
    #[validate(length(min = 1, message = "select at least one ticker"))]
    pub tickers: Vec<String>,
    #[serde(default = "default_start")]
    pub start: NaiveDate,
    #[serde(default = "default_end")]
    pub end: NaiveDate,
    #[serde(default = "default_investment")]
    #[validate(range(min = 1000.0, message = "investment amount must be at least 1000"))]
    pub investment_amount: f64,
}

impl Default for OptimizeRequest {
    fn default() -> Self {
        OptimizeRequest {
            tickers: default_tickers(),
            start: default_start(),
            end: default_end(),
            investment_amount: DEFAULT_INVESTMENT,
        }
    }
}

impl OptimizeRequest {
    pub fn price_request(&self) -> PriceRequest {
        PriceRequest::new(self.tickers.clone(), self.start, self.end)
    }
}

fn validate_candidates(request: &OptimizeRequest) -> Result<(), ValidationError> {
    if let Some(unknown) = request
        .tickers
        .iter()
        .find(|t| !CANDIDATE_TICKERS.contains(&t.as_str()))
    {
        let mut err = ValidationError::new("unknown_ticker");
        err.message = Some(format!("'{}' is not one of {:?}", unknown, CANDIDATE_TICKERS).into());
        return Err(err);
    }
    if !request.investment_amount.is_finite() {
        let mut err = ValidationError::new("investment_amount");
        err.message = Some("investment amount must be a finite number".into());
        return Err(err);
    }
    Ok(())
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Fetching,
    Estimating,
    Optimizing,
    Allocating,
    Rendered,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "input",
            Stage::Fetching => "data fetch",
            Stage::Estimating => "estimation",
            Stage::Optimizing => "optimization",
            Stage::Allocating => "allocation",
            Stage::Rendered => "rendered",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub expected_annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub shares: BTreeMap<String, u64>,
    pub leftover: f64,
}

impl Allocation {
    // Cash spent on shares at the given prices
    pub fn spent(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.shares
            .iter()
            .map(|(ticker, count)| *count as f64 * prices.get(ticker).copied().unwrap_or(0.0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: OptimizeRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(request, OptimizeRequest::default());
        assert_eq!(request.tickers, vec!["ESGU", "SUSA", "ESG", "VSGX"]);
        assert_eq!(request.start, NaiveDate::from_ymd_opt(2020, 1, 1).expect("REASON"));
        assert_eq!(request.end, NaiveDate::from_ymd_opt(2025, 1, 1).expect("REASON"));
        assert_eq!(request.investment_amount, 10000.0);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_request() {
        // Empty ticker set
        let request = OptimizeRequest {
            tickers: vec![],
            ..OptimizeRequest::default()
        };
        assert!(request.validate().is_err());

        // Ticker outside the candidate list
        let request = OptimizeRequest {
            tickers: vec!["AAPL".to_string()],
            ..OptimizeRequest::default()
        };
        assert!(request.validate().is_err());

        // Below the minimum investment
        let request = OptimizeRequest {
            investment_amount: 999.0,
            ..OptimizeRequest::default()
        };
        assert!(request.validate().is_err());

        // Exactly the minimum is allowed
        let request = OptimizeRequest {
            investment_amount: MIN_INVESTMENT,
            ..OptimizeRequest::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_allocation_spent() {
        let allocation = Allocation {
            shares: BTreeMap::from([("ESGU".to_string(), 3), ("SUSA".to_string(), 0)]),
            leftover: 12.5,
        };
        let prices = BTreeMap::from([("ESGU".to_string(), 100.0), ("SUSA".to_string(), 50.0)]);
        assert_eq!(allocation.spent(&prices), 300.0);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Idle.to_string(), "input");
        assert_eq!(Stage::Optimizing.to_string(), "optimization");
        assert_eq!(serde_json::to_string(&Stage::Allocating).unwrap(), "\"allocating\"");
    }
}
