// src/loader.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, info, warn};
use validator::{Validate, ValidationErrors};

use crate::models::{PriceRequest, PriceTable, PriceTableError};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid price request: {0}")]
    InvalidRequest(#[from] ValidationErrors),
    #[error("Symbol not found: {symbol} ({message})")]
    SymbolNotFound { symbol: String, message: String },
    #[error("No prices for {symbol} between {start} and {end}")]
    NoDataForRange {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("Price provider returned HTTP {status} for {symbol}")]
    Http { symbol: String, status: u16 },
    #[error("Malformed price response for {symbol}: {message}")]
    Malformed { symbol: String, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Table(#[from] PriceTableError),
}

/// Anything that can turn a [`PriceRequest`] into a [`PriceTable`].
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, request: &PriceRequest) -> Result<PriceTable, FetchError>;
}

// Define the chart API structure
#[derive(Deserialize, Debug)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Deserialize, Debug)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
pub struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Deserialize, Debug)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub symbol: String,
    pub currency: Option<String>,
    #[serde(default)]
    pub gmtoffset: i64,
    pub exchange_timezone_name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteIndicator>,
    #[serde(default)]
    pub adjclose: Vec<AdjCloseIndicator>,
}

#[derive(Deserialize, Debug)]
pub struct QuoteIndicator {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
pub struct AdjCloseIndicator {
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}

impl ChartResult {
    /// Daily closes keyed by exchange-local trading date.
    ///
    /// Null, NaN and non-positive closes are skipped. When `adjusted` is set
    /// the adjusted close is used if the response carries one.
    pub fn closes(&self, adjusted: bool) -> BTreeMap<NaiveDate, f64> {
        let adjusted_series = self
            .indicators
            .adjclose
            .first()
            .map(|a| &a.adjclose)
            .filter(|series| adjusted && !series.is_empty());
        let series = match adjusted_series {
            Some(series) => series,
            None => match self.indicators.quote.first() {
                Some(quote) => &quote.close,
                None => return BTreeMap::new(),
            },
        };

        let mut closes = BTreeMap::new();
        for (timestamp, close) in self.timestamp.iter().zip(series.iter()) {
            let Some(close) = (*close).filter(|c| c.is_finite() && *c > 0.0) else {
                continue;
            };
            match DateTime::from_timestamp(timestamp + self.meta.gmtoffset, 0) {
                Some(dt) => {
                    closes.insert(dt.date_naive(), close);
                }
                None => warn!("Skipping bar with invalid timestamp {}", timestamp),
            }
        }
        closes
    }
}

/// Fetches daily closes from the Yahoo Finance chart endpoint, one request
/// per ticker.
pub struct YahooChartClient {
    client: reqwest::Client,
    base_url: String,
    adjusted: bool,
}

impl YahooChartClient {
    pub fn new(base_url: &str, timeout: StdDuration, adjusted: bool) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(YahooChartClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            adjusted,
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, symbol)
    }

    pub async fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, FetchError> {
        // period2 is exclusive upstream, so ask for the day after `end`
        let period1 = start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
        let period2 = end
            .succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp());
        let (Some(period1), Some(period2)) = (period1, period2) else {
            return Err(FetchError::Malformed {
                symbol: symbol.to_string(),
                message: "date range cannot be expressed as timestamps".to_string(),
            });
        };

        debug!("Fetching daily closes for {} from {} to {}", symbol, start, end);

        let response = self
            .client
            .get(self.chart_url(symbol))
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Unknown symbols come back as 404 with a chart error payload
        let parsed: Result<ChartResponse, _> = serde_json::from_str(&body);
        let chart = match parsed {
            Ok(parsed) => parsed.chart,
            Err(e) if status.is_success() => {
                return Err(FetchError::Malformed {
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::Http {
                    symbol: symbol.to_string(),
                    status: status.as_u16(),
                })
            }
        };

        if let Some(error) = chart.error {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
                message: format!("{}: {}", error.code, error.description),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let result = chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
                message: "empty chart result".to_string(),
            })?;

        let closes: BTreeMap<NaiveDate, f64> = result
            .closes(self.adjusted)
            .into_iter()
            .filter(|(date, _)| *date >= start && *date <= end)
            .collect();

        if closes.is_empty() {
            return Err(FetchError::NoDataForRange {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }

        debug!("Received {} closes for {}", closes.len(), symbol);
        Ok(closes)
    }
}

#[async_trait]
impl PriceSource for YahooChartClient {
    async fn fetch(&self, request: &PriceRequest) -> Result<PriceTable, FetchError> {
        request.validate()?;

        let mut series = BTreeMap::new();
        for ticker in &request.tickers {
            let closes = self.fetch_closes(ticker, request.start, request.end).await?;
            series.insert(ticker.clone(), closes);
        }

        let table = PriceTable::from_series(request.tickers.clone(), &series)?;
        info!(
            "Fetched {} rows for {:?} ({} missing cells)",
            table.len(),
            request.tickers,
            table.missing_cells()
        );
        Ok(table)
    }
}
