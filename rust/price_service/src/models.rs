// src/models.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use validator::{Validate, ValidationError};

#[derive(Debug, Error, PartialEq)]
pub enum PriceTableError {
    #[error("Price table needs at least one ticker")]
    NoTickers,
    #[error("Duplicate ticker in price table: {0}")]
    DuplicateTicker(String),
    #[error("Row {date} has {found} cells, expected {expected}")]
    RowWidth {
        date: NaiveDate,
        found: usize,
        expected: usize,
    },
    #[error("Dates must be strictly ascending, found {0} out of order")]
    UnorderedDate(NaiveDate),
    #[error("Invalid close price {price} for {ticker} on {date}")]
    InvalidPrice {
        ticker: String,
        date: NaiveDate,
        price: f64,
    },
}

// A request for daily closes of a set of tickers over an inclusive date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_date_range"))]
pub struct PriceRequest {
    #[validate(
        length(min = 1, message = "select at least one ticker"),
        custom(function = "validate_symbols")
    )]
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceRequest {
    pub fn new(tickers: Vec<String>, start: NaiveDate, end: NaiveDate) -> Self {
        PriceRequest { tickers, start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

fn validate_symbols(tickers: &[String]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for ticker in tickers {
        let well_formed = !ticker.is_empty()
            && ticker.len() <= 12
            && ticker
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        if !well_formed {
            let mut err = ValidationError::new("malformed_symbol");
            err.message = Some(format!("malformed ticker symbol '{}'", ticker).into());
            return Err(err);
        }
        if !seen.insert(ticker.as_str()) {
            let mut err = ValidationError::new("duplicate_symbol");
            err.message = Some(format!("ticker '{}' selected twice", ticker).into());
            return Err(err);
        }
    }
    Ok(())
}

fn validate_date_range(request: &PriceRequest) -> Result<(), ValidationError> {
    if request.start > request.end {
        let mut err = ValidationError::new("date_range");
        err.message = Some(
            format!(
                "start date {} is after end date {}",
                request.start, request.end
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Daily closing prices: one row per trading date, one column per ticker.
///
/// Cells are `None` where a ticker has no close for that date. Present
/// cells are always finite and strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    pub fn new(
        tickers: Vec<String>,
        rows: Vec<(NaiveDate, Vec<Option<f64>>)>,
    ) -> Result<Self, PriceTableError> {
        if tickers.is_empty() {
            return Err(PriceTableError::NoTickers);
        }
        let mut seen = HashSet::new();
        for ticker in &tickers {
            if !seen.insert(ticker.as_str()) {
                return Err(PriceTableError::DuplicateTicker(ticker.clone()));
            }
        }

        let mut dates = Vec::with_capacity(rows.len());
        let mut cells = Vec::with_capacity(rows.len());
        for (date, row) in rows {
            if row.len() != tickers.len() {
                return Err(PriceTableError::RowWidth {
                    date,
                    found: row.len(),
                    expected: tickers.len(),
                });
            }
            if let Some(previous) = dates.last() {
                if date <= *previous {
                    return Err(PriceTableError::UnorderedDate(date));
                }
            }
            for (ticker, cell) in tickers.iter().zip(row.iter()) {
                if let Some(price) = cell {
                    if !price.is_finite() || *price <= 0.0 {
                        return Err(PriceTableError::InvalidPrice {
                            ticker: ticker.clone(),
                            date,
                            price: *price,
                        });
                    }
                }
            }
            dates.push(date);
            cells.push(row);
        }

        Ok(PriceTable {
            tickers,
            dates,
            rows: cells,
        })
    }

    // Outer join of per-ticker series on date, columns kept in `tickers` order
    pub fn from_series(
        tickers: Vec<String>,
        series: &BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    ) -> Result<Self, PriceTableError> {
        let mut all_dates: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (column, ticker) in tickers.iter().enumerate() {
            let Some(closes) = series.get(ticker) else {
                continue;
            };
            for (date, close) in closes {
                let row = all_dates
                    .entry(*date)
                    .or_insert_with(|| vec![None; tickers.len()]);
                row[column] = Some(*close);
            }
        }
        PriceTable::new(tickers, all_dates.into_iter().collect())
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, &[Option<f64>])> + '_ {
        self.dates
            .iter()
            .copied()
            .zip(self.rows.iter().map(|row| row.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, ticker: &str) -> Option<Vec<Option<f64>>> {
        let index = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    /// The first `n` rows, for previews.
    pub fn head(&self, n: usize) -> PriceTable {
        let n = n.min(self.len());
        PriceTable {
            tickers: self.tickers.clone(),
            dates: self.dates[..n].to_vec(),
            rows: self.rows[..n].to_vec(),
        }
    }

    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|cell| cell.is_none()).count())
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_cells() == 0
    }

    // Keeps only rows where every ticker has a price; returns the number dropped
    pub fn complete_rows(&self) -> (PriceTable, usize) {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for (date, row) in self.dates.iter().zip(self.rows.iter()) {
            if row.iter().all(Option::is_some) {
                dates.push(*date);
                rows.push(row.clone());
            }
        }
        let dropped = self.len() - dates.len();
        (
            PriceTable {
                tickers: self.tickers.clone(),
                dates,
                rows,
            },
            dropped,
        )
    }

    /// Dense copy of a complete table, row-major. `None` if any cell is missing.
    pub fn to_matrix(&self) -> Option<Vec<Vec<f64>>> {
        self.rows
            .iter()
            .map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }

    // Last row in which every ticker has a price
    pub fn latest_prices(&self) -> Option<BTreeMap<String, f64>> {
        self.rows
            .iter()
            .rev()
            .find(|row| row.iter().all(Option::is_some))
            .map(|row| {
                self.tickers
                    .iter()
                    .cloned()
                    .zip(row.iter().flatten().copied())
                    .collect()
            })
    }
}
