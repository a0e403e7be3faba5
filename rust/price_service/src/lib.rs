// src/lib.rs

pub mod loader;
pub mod models;

pub use loader::{FetchError, PriceSource, YahooChartClient, DEFAULT_BASE_URL};
pub use models::{PriceRequest, PriceTable, PriceTableError};
