//! ScentGraph Engine
//!
//! A fragrance catalog and preference-based recommendation service.
//!
//! # Architecture
//!
//! - **Recommendation Engine**: Personalized fragrance recommendations from
//!   reviewer ratings
//! - **Explanation Service**: Natural-language rationales with rule-based
//!   fallback
//! - **API Server**: REST endpoints for frontend consumption
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Database connections are closed cleanly

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scentgraph::api::{self, AppState};
use scentgraph::config::Config;
use scentgraph::database::{self, Database, PgStore};
use scentgraph::error::Result;
use scentgraph::recommendation::engine::RecommendationEngine;
use scentgraph::recommendation::explain::ExplanationService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("ScentGraph Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    let config = Arc::new(config);
    info!("Configuration loaded and validated");

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Open the database pool and bring the schema up to date
    let db = Database::connect(&config.database).await?;
    database::run_migrations(db.pool()).await?;

    // Wire up the engine over the Postgres repositories
    let store = Arc::new(PgStore::new(db.pool().clone()));
    let engine = RecommendationEngine::new(store.clone(), store, config.scoring.clone());
    let explainer = Arc::new(ExplanationService::new(config.llm.clone()));
    if explainer.is_available() {
        info!("Explanation service enabled (model: {})", config.llm.model);
    } else {
        info!("Explanation service disabled, rule-based fallback only");
    }

    let state = Arc::new(AppState {
        db: db.clone(),
        engine,
        explainer,
    });

    // Spawn API server
    let mut handles = Vec::new();
    handles.push(spawn_api_server(state, config.clone(), shutdown_tx.clone()));

    info!(
        "API listening on http://{}:{}",
        config.api.host, config.api.port
    );

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("A service failed, initiating shutdown");
        }
    }

    // Graceful shutdown
    info!("Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("Shutdown timeout exceeded, forcing exit");
    }

    db.close().await;

    info!("ScentGraph Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("scentgraph_engine=debug,scentgraph=debug,tower_http=debug,sqlx=warn,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

/// Spawn the API server
fn spawn_api_server(
    state: Arc<AppState>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn(async move {
        tokio::select! {
            result = api::start_server(state, &config.api) => {
                if let Err(e) = result {
                    error!("API server error: {:?}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("API server shutting down");
            }
        }
    })
}

/// Wait for any task to fail
async fn wait_for_any_failure(handles: &mut [tokio::task::JoinHandle<()>]) {
    loop {
        for handle in handles.iter_mut() {
            if handle.is_finished() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
