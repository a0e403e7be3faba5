// src/lib.rs

pub mod allocation;
pub mod config;
pub mod efficient_frontier;
pub mod errors;
pub mod estimators;
pub mod handlers;
pub mod models;
pub mod objective;
pub mod pipeline;
pub mod presenter;
pub mod utils;

use crate::config::Config;
use crate::handlers::AppState;
use crate::pipeline::{Pipeline, PipelineSettings};
use actix_web::{middleware::Logger, web, App, HttpServer};
use price_service::{FetchError, YahooChartClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` filters (default `info`),
/// `PO_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PO_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("Tracing already initialized: {}", err);
    }
}

pub fn app_state(config: &Config) -> Result<AppState, FetchError> {
    let client = YahooChartClient::new(
        &config.yahoo_base_url,
        config.fetch_timeout,
        config.adjusted_close,
    )?;
    let settings = PipelineSettings {
        risk_free_rate: config.risk_free_rate,
        ..PipelineSettings::default()
    };
    Ok(AppState::new(Pipeline::new(Arc::new(client), settings)))
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    use handlers::{health_check, index, optimize, tickers};

    let state = web::Data::new(app_state(&config)?);
    info!("Starting portfolio optimizer at http://{}", config.listen_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .service(index)
            .service(tickers)
            .service(optimize)
            .service(health_check)
    })
    .bind(config.listen_addr)?
    .run()
    .await?;
    Ok(())
}
