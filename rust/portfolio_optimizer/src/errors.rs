// src/errors.rs

use crate::allocation::AllocationError;
use crate::efficient_frontier::OptimizationError;
use crate::estimators::EstimationError;
use crate::models::Stage;
use actix_web::http::StatusCode;
use price_service::FetchError;
use thiserror::Error;
use validator::ValidationErrors;

/// Why a run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationErrors),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Optimization(#[from] OptimizationError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidInput(_) => Stage::Idle,
            // A request the fetcher refuses never reached the network
            PipelineError::Fetch(FetchError::InvalidRequest(_)) => Stage::Idle,
            PipelineError::Fetch(_) => Stage::Fetching,
            PipelineError::Estimation(_) => Stage::Estimating,
            PipelineError::Optimization(_) => Stage::Optimizing,
            PipelineError::Allocation(_) => Stage::Allocating,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.stage() {
            Stage::Idle => StatusCode::BAD_REQUEST,
            Stage::Fetching => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}
