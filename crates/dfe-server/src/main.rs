//! DFE Server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dfe_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use dfe_server::{
    api_router,
    config::Config,
    ingest::{IngestionCoordinator, UploadIntake, WorkerPool},
    middleware,
    store::PgStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("dfe-server")
        .filter_directives("dfe_server=debug,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting DFE Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let coordinator = Arc::new(IngestionCoordinator::new(Arc::clone(&store), config.ingest.clone()));
    let (queue, workers) = WorkerPool::spawn(coordinator, &config.ingest);
    let intake = Arc::new(UploadIntake::new(store, queue, config.ingest.max_batch_files));

    let app = create_router(db_pool, Arc::clone(&intake), &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // Closing the last queue sender lets workers drain what is queued and stop.
    drop(intake);
    info!("Draining ingestion queue");
    let drain = workers.shutdown();
    if tokio::time::timeout(Duration::from_secs(config.server.shutdown_timeout_secs), drain)
        .await
        .is_err()
    {
        tracing::warn!("Ingestion workers did not stop in time; pending uploads stay PENDING");
    }

    info!("Server shut down gracefully");

    Ok(())
}

fn create_router(db: sqlx::PgPool, intake: Arc<UploadIntake<PgStore>>, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(db)
        .merge(api_router(intake))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn health_check(State(db): State<sqlx::PgPool>) -> Result<Response, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
}
