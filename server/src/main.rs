//! tabsync server binary.

use std::sync::Arc;
use tabsync_server::adapter::{PostgresAdapter, SheetsAdapter};
use tabsync_server::config::Config;
use tabsync_server::sync::{CycleRunner, Scheduler};
use tabsync_server::{app, db, AppState};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabsync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting tabsync server on {}:{}", config.host, config.port);

    // Store B
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    let postgres = Arc::new(PostgresAdapter::new(pool.clone()));

    // Store A
    let sheets = Arc::new(SheetsAdapter::new(config.sheets.clone())?);
    tracing::info!(
        spreadsheet = %config.sheets.spreadsheet_id,
        range = %config.sheets.range,
        "Syncing sheet"
    );

    let runner = Arc::new(CycleRunner::new(sheets, postgres, &config.sync));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(Scheduler::new(runner.clone(), config.sync.interval).run(shutdown_rx));

    let state = AppState::new(pool, runner, config.api_token.clone());
    if state.api_token.is_none() {
        tracing::warn!("API_TOKEN not set; the HTTP API is unauthenticated");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped; stopping scheduler");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received terminate signal, initiating graceful shutdown"),
    }
}
