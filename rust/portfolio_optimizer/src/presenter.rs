// src/presenter.rs

use crate::models::{
    default_end, default_start, Performance, Stage, Weights, CANDIDATE_TICKERS,
    DEFAULT_INVESTMENT, INVESTMENT_STEP, MIN_INVESTMENT,
};
use crate::pipeline::PortfolioRun;
use chrono::NaiveDate;
use price_service::PriceTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const INDEX_TEMPLATE: &str = include_str!("../static/index.html");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportError {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub date: NaiveDate,
    pub prices: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePreview {
    pub tickers: Vec<String>,
    pub rows: Vec<PreviewRow>,
}

impl From<&PriceTable> for PricePreview {
    fn from(table: &PriceTable) -> Self {
        PricePreview {
            tickers: table.tickers().to_vec(),
            rows: table
                .rows()
                .map(|(date, prices)| PreviewRow {
                    date,
                    prices: prices.to_vec(),
                })
                .collect(),
        }
    }
}

/// Metrics as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub expected_annual_return: String,
    pub annual_volatility: String,
    pub sharpe_ratio: String,
}

impl From<&Performance> for PerformanceSummary {
    fn from(performance: &Performance) -> Self {
        PerformanceSummary {
            expected_annual_return: format_percent(performance.expected_annual_return),
            annual_volatility: format_percent(performance.annual_volatility),
            sharpe_ratio: format!("{:.2}", performance.sharpe_ratio),
        }
    }
}

/// Response body of `POST /optimize`. Sections a run never reached are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub success: bool,
    pub state: Stage,
    pub error: Option<ReportError>,
    pub price_preview: Option<PricePreview>,
    pub weights: Option<Weights>,
    pub performance: Option<PerformanceSummary>,
    pub allocation: Option<BTreeMap<String, u64>>,
    pub leftover: Option<String>,
    pub shrinkage: Option<f64>,
    pub dropped_rows: usize,
}

impl From<&PortfolioRun> for Report {
    fn from(run: &PortfolioRun) -> Self {
        Report {
            success: run.succeeded(),
            state: run.state,
            error: run.error.as_ref().map(|err| ReportError {
                stage: err.stage(),
                message: format!("Error in {}: {}", err.stage(), err),
            }),
            price_preview: run.preview.as_ref().map(PricePreview::from),
            weights: run.weights.clone(),
            performance: run.performance.as_ref().map(PerformanceSummary::from),
            allocation: run.allocation.as_ref().map(|a| a.shares.clone()),
            leftover: run.allocation.as_ref().map(|a| format_currency(a.leftover)),
            shrinkage: run.shrinkage,
            dropped_rows: run.dropped_rows,
        }
    }
}

/// Candidate tickers and form defaults, served at `GET /tickers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefaults {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub investment_amount: f64,
    pub min_investment: f64,
    pub investment_step: f64,
}

impl Default for FormDefaults {
    fn default() -> Self {
        FormDefaults {
            tickers: CANDIDATE_TICKERS.iter().map(|t| t.to_string()).collect(),
            start: default_start(),
            end: default_end(),
            investment_amount: DEFAULT_INVESTMENT,
            min_investment: MIN_INVESTMENT,
            investment_step: INVESTMENT_STEP,
        }
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

pub fn format_currency(value: f64) -> String {
    format!("${:.2}", value)
}

// Ticker options come pre-selected
pub fn render_index(defaults: &FormDefaults) -> String {
    let options: String = defaults
        .tickers
        .iter()
        .map(|t| format!("<option value=\"{0}\" selected>{0}</option>", t))
        .collect::<Vec<_>>()
        .join("\n          ");

    INDEX_TEMPLATE
        .replace("{{TICKER_OPTIONS}}", &options)
        .replace("{{START}}", &defaults.start.to_string())
        .replace("{{END}}", &defaults.end.to_string())
        .replace("{{AMOUNT}}", &defaults.investment_amount.to_string())
        .replace("{{MIN_AMOUNT}}", &defaults.min_investment.to_string())
        .replace("{{STEP}}", &defaults.investment_step.to_string())
}
