//! FinLedger Binary
//!
//! Serves the ledger over HTTP on top of a Postgres store.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use finledger_ledger::{LedgerEngine, LedgerService, PgLedgerStore, TracingObserver};
use finledger_server::{logging, router, AppState, LedgerMetrics, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    logging::init(&config.log_level, config.log_format);

    info!("Starting FinLedger");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    // Connect to PostgreSQL
    let store = PgLedgerStore::connect(&config.store)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
    }

    // Wire engine, metrics and routes
    let metrics = Arc::new(LedgerMetrics::new(Arc::new(TracingObserver)));
    let engine = LedgerEngine::new(store, config.engine.clone()).with_observer(metrics.clone());
    let app = router(AppState::new(LedgerService::new(engine), metrics));

    let bind_addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = config.listen_port,
        operation_timeout_ms = finledger_common::millis(config.engine.operation_timeout),
        max_retries = config.engine.max_retries,
        "FinLedger running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("FinLedger shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
