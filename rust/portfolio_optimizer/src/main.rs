// src/main.rs

use anyhow::Context;
use portfolio_optimizer::config::Config;
use portfolio_optimizer::{init_tracing, run_server};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env().context("Invalid configuration")?;
    run_server(config).await
}
