// src/pipeline.rs

use crate::allocation::DiscreteAllocation;
use crate::efficient_frontier::EfficientFrontier;
use crate::errors::PipelineError;
use crate::estimators::{estimate, EstimationError, FREQUENCY};
use crate::models::{Allocation, OptimizeRequest, Performance, Stage, Weights};
use price_service::{PriceSource, PriceTable};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

pub const PREVIEW_ROWS: usize = 5;
pub const WEIGHT_CUTOFF: f64 = 1e-4;
pub const WEIGHT_ROUNDING: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub risk_free_rate: f64,
    pub frequency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            risk_free_rate: 0.0,
            frequency: FREQUENCY,
        }
    }
}

/// Everything one run produced, up to the stage where it stopped.
#[derive(Debug)]
pub struct PortfolioRun {
    pub request: OptimizeRequest,
    pub state: Stage,
    pub preview: Option<PriceTable>,
    pub dropped_rows: usize,
    pub shrinkage: Option<f64>,
    pub weights: Option<Weights>,
    pub performance: Option<Performance>,
    pub allocation: Option<Allocation>,
    pub error: Option<PipelineError>,
}

impl PortfolioRun {
    fn new(request: OptimizeRequest) -> Self {
        PortfolioRun {
            request,
            state: Stage::Idle,
            preview: None,
            dropped_rows: 0,
            shrinkage: None,
            weights: None,
            performance: None,
            allocation: None,
            error: None,
        }
    }

    fn advance(&mut self, stage: Stage) {
        info!(tickers = ?self.request.tickers, "{:?} -> {:?}", self.state, stage);
        self.state = stage;
    }

    pub fn succeeded(&self) -> bool {
        self.state == Stage::Rendered
    }
}

/// Fetch, estimate, optimize and allocate for one request.
pub struct Pipeline {
    source: Arc<dyn PriceSource>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(source: Arc<dyn PriceSource>, settings: PipelineSettings) -> Self {
        Pipeline { source, settings }
    }

    pub async fn run(&self, request: OptimizeRequest) -> PortfolioRun {
        let mut run = PortfolioRun::new(request);
        if let Err(err) = self.run_stages(&mut run).await {
            warn!(
                tickers = ?run.request.tickers,
                "Run failed during {}: {}",
                err.stage(),
                err
            );
            run.advance(Stage::Failed);
            run.error = Some(err);
        }
        run
    }

    async fn run_stages(&self, run: &mut PortfolioRun) -> Result<(), PipelineError> {
        run.request.validate()?;
        let price_request = run.request.price_request();
        price_request.validate()?;

        run.advance(Stage::Fetching);
        let table = self.source.fetch(&price_request).await?;
        info!(
            "Fetched {} rows for {} tickers, {} missing cells",
            table.len(),
            table.tickers().len(),
            table.missing_cells()
        );
        run.preview = Some(table.head(PREVIEW_ROWS));

        run.advance(Stage::Estimating);
        let (complete, dropped) = table.complete_rows();
        if dropped > 0 {
            warn!("Dropped {} rows with missing prices before estimation", dropped);
        }
        run.dropped_rows = dropped;
        if complete.len() < 3 {
            return Err(EstimationError::InsufficientData {
                needed: 3,
                found: complete.len(),
            }
            .into());
        }
        let estimates = estimate(&complete, self.settings.frequency)?;
        run.shrinkage = Some(estimates.shrinkage);

        run.advance(Stage::Optimizing);
        let mut frontier = EfficientFrontier::from_estimates(&estimates)?;
        frontier.max_sharpe(self.settings.risk_free_rate)?;
        let weights = frontier.clean_weights(WEIGHT_CUTOFF, Some(WEIGHT_ROUNDING))?;
        let performance = frontier.portfolio_performance(self.settings.risk_free_rate)?;
        info!(?weights, "Sharpe ratio {:.2}", performance.sharpe_ratio);
        run.weights = Some(weights.clone());
        run.performance = Some(performance);

        run.advance(Stage::Allocating);
        let latest_prices = complete
            .latest_prices()
            .ok_or(EstimationError::MissingPrices)?;
        let allocator =
            DiscreteAllocation::new(&weights, &latest_prices, run.request.investment_amount)?;
        run.allocation = Some(allocator.lp_portfolio()?);

        run.advance(Stage::Rendered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use price_service::{FetchError, PriceRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        rows: Vec<Vec<Option<f64>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn fetch(&self, request: &PriceRequest) -> Result<PriceTable, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rows = self
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| (request.start + Duration::days(i as i64), row.clone()))
                .collect();
            Ok(PriceTable::new(request.tickers.clone(), rows)?)
        }
    }

    fn pipeline(rows: Vec<Vec<Option<f64>>>) -> (Pipeline, Arc<FixedSource>) {
        let source = Arc::new(FixedSource {
            rows,
            calls: AtomicUsize::new(0),
        });
        (
            Pipeline::new(source.clone(), PipelineSettings::default()),
            source,
        )
    }

    fn request(tickers: &[&str], amount: f64) -> OptimizeRequest {
        OptimizeRequest {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            start: NaiveDate::from_ymd_opt(2020, 1, 1).expect("REASON"),
            end: NaiveDate::from_ymd_opt(2021, 1, 1).expect("REASON"),
            investment_amount: amount,
        }
    }

    fn trending_rows() -> Vec<Vec<Option<f64>>> {
        (0..40)
            .map(|i| {
                let t = i as f64;
                vec![
                    Some(100.0 * (1.0 + 0.002 * t) + (t * 1.3).sin()),
                    Some(50.0 * (1.0 + 0.001 * t) + 0.5 * (t * 0.7).cos()),
                ]
            })
            .collect()
    }

    #[actix_rt::test]
    async fn test_full_run() {
        let (pipeline, _) = pipeline(trending_rows());
        let run = pipeline.run(request(&["ESGU", "SUSA"], 10000.0)).await;

        assert!(run.succeeded(), "{:?}", run.error);
        assert_eq!(run.preview.as_ref().map(|p| p.len()), Some(5));
        let weights = run.weights.as_ref().unwrap();
        let total: f64 = weights.values().sum();
        assert!((total - 1.0).abs() < 1e-3);
        let allocation = run.allocation.as_ref().unwrap();
        assert!(allocation.leftover >= 0.0);
        assert!(allocation.leftover <= 10000.0);
    }

    #[actix_rt::test]
    async fn test_invalid_request_never_fetches() {
        let (pipeline, source) = pipeline(trending_rows());
        let run = pipeline.run(request(&[], 10000.0)).await;

        assert_eq!(run.state, Stage::Failed);
        assert_eq!(run.error.as_ref().map(|e| e.stage()), Some(Stage::Idle));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(run.preview.is_none());
    }

    #[actix_rt::test]
    async fn test_missing_rows_are_dropped() {
        let mut rows = trending_rows();
        rows[3][1] = None;
        rows[10][0] = None;
        let (pipeline, _) = pipeline(rows);
        let run = pipeline.run(request(&["ESGU", "SUSA"], 10000.0)).await;

        assert!(run.succeeded(), "{:?}", run.error);
        assert_eq!(run.dropped_rows, 2);
        // The preview still shows the gap
        assert_eq!(run.preview.as_ref().map(|p| p.missing_cells()), Some(1));
    }

    #[actix_rt::test]
    async fn test_too_few_complete_rows() {
        let rows = vec![
            vec![Some(100.0), Some(50.0)],
            vec![None, Some(51.0)],
            vec![Some(101.0), Some(50.5)],
        ];
        let (pipeline, _) = pipeline(rows);
        let run = pipeline.run(request(&["ESGU", "SUSA"], 10000.0)).await;

        assert_eq!(run.state, Stage::Failed);
        assert_eq!(run.error.as_ref().map(|e| e.stage()), Some(Stage::Estimating));
        assert!(run.preview.is_some());
        assert!(run.weights.is_none());
    }

    #[actix_rt::test]
    async fn test_unaffordable_keeps_weights() {
        let rows = (0..30)
            .map(|i| {
                let t = i as f64;
                vec![
                    Some(1500.0 * (1.0 + 0.003 * t) + (t * 0.9).sin()),
                    Some(1200.0 * (1.0 + 0.002 * t) + (t * 1.1).cos()),
                ]
            })
            .collect();
        let (pipeline, _) = pipeline(rows);
        let run = pipeline.run(request(&["ESGU", "SUSA"], 1000.0)).await;

        assert_eq!(run.error.as_ref().map(|e| e.stage()), Some(Stage::Allocating));
        assert!(run.weights.is_some());
        assert!(run.performance.is_some());
        assert!(run.allocation.is_none());
    }
}
