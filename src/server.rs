//! Server startup, shutdown, and worker spawning logic.
//!
//! This module contains the `run_server` function which handles:
//! - Database and cache initialization
//! - Migration running
//! - Event bus and enrichment wiring
//! - Application state creation
//! - Router creation
//! - Server binding and graceful shutdown
//! - Background worker spawning and cleanup
//!
//! Adapters start in dependency order (store, cache, bus, services) and
//! stop in reverse on shutdown.

use crate::analytics::enrich::{NoopGeoLookup, WootheeAgentParser};
use crate::analytics::{AnalyticsQuery, AnalyticsStore};
use crate::cache::Cache;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::events::EventBus;
use crate::jobs::{create_job_channel, Worker};
use crate::metrics;
use crate::routes;
use crate::services::redirect::RedirectDispatcher;
use crate::services::reputation;
use crate::services::url_service::UrlService;
use crate::state;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Run the web server with the given configuration.
///
/// # Errors
///
/// This function will return an error if:
/// - Database connection fails
/// - Cache pool construction fails
/// - Migration fails
/// - Event bus producer creation fails
/// - Server binding fails
/// - Server runtime error occurs
pub async fn run_server(config: Config, addr: String, should_migrate: bool) -> AppResult<()> {
    info!("Starting snaplink server...");

    // Metrics registry, created once and never reassigned.
    let registry = prometheus::Registry::new();
    let app_metrics = metrics::init(&registry);

    // Initialize database connection pool
    info!("Connecting to database...");
    let repository = crate::db::Repository::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
        config.database.acquire_timeout_seconds,
    )
    .await?;

    // Run migrations if requested
    if should_migrate {
        info!("Running database migrations...");
        repository.run_migrations().await?;
        info!("Migrations completed successfully");
    }

    // Initialize cache
    info!("Connecting to cache...");
    let cache = Cache::new(
        &config.cache.url,
        config.cache.max_connections,
        config.cache.default_ttl_seconds,
    )
    .await?;

    // Ping cache to verify connection
    match cache.ping().await {
        Ok(_) => info!("Cache connection verified"),
        Err(e) => {
            tracing::warn!("Cache ping failed: {}. Continuing without cache.", e);
        }
    }

    // Event bus producer
    info!("Connecting to event bus...");
    let events = EventBus::new(
        &config.kafka.bootstrap_servers,
        &config.kafka.topic_hits,
        app_metrics,
    )?;

    // Reputation probe (fail-open collaborator)
    let reputation = reputation::from_config(&config.scanning)?;

    // Core services
    let urls = UrlService::new(
        repository.clone(),
        cache.clone(),
        reputation,
        config.url.clone(),
        app_metrics,
    );

    // Create background job worker
    let (job_sender, job_receiver) = create_job_channel();
    let worker = Worker::new(repository.clone(), cache.clone(), job_receiver);
    let worker_handle = tokio::spawn(worker.run());

    let dispatcher = RedirectDispatcher::new(
        urls.clone(),
        job_sender,
        events,
        Arc::new(NoopGeoLookup),
        Arc::new(WootheeAgentParser::new()),
        app_metrics,
    );

    // Analytics query layer shares the primary pool.
    let analytics = AnalyticsQuery::new(AnalyticsStore::new(repository.pool().clone()));

    let state = Arc::new(state::AppState {
        urls,
        dispatcher,
        analytics,
        repository,
        cache,
        registry,
        rate_limit: config.rate_limit.clone(),
        admin_api_key: config.admin.api_key.clone(),
        admin_api_key_header: config.admin.api_key_header.clone(),
    });

    // Create router
    let app = routes::create_router(state, config.cors.allowed_origins)?;

    // Start server
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    info!("Server listening on {}", addr);
    info!("Base URL: {}", config.url.base_url);

    // Set up graceful shutdown
    let shutdown_signal = create_shutdown_signal();

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    // Wait for background worker to finish
    worker_handle.await.unwrap_or_else(|e| {
        error!("Worker task failed: {:?}", e);
    });

    info!("Server shutdown complete");
    Ok(())
}

/// Run the analytics consumer until a shutdown signal arrives.
pub async fn run_consumer(config: Config) -> AppResult<()> {
    info!("Starting snaplink analytics consumer...");

    let registry = prometheus::Registry::new();
    let app_metrics = metrics::init(&registry);

    let repository = crate::db::Repository::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
        config.database.acquire_timeout_seconds,
    )
    .await?;
    repository.run_migrations().await?;

    let store = AnalyticsStore::new(repository.pool().clone());
    let bus = EventBus::new(
        &config.kafka.bootstrap_servers,
        &config.kafka.topic_hits,
        app_metrics,
    )?;

    let sweeper = crate::analytics::consumer::spawn_ttl_sweeper(store.clone());

    let consumer =
        crate::analytics::AnalyticsConsumer::new(&config.kafka, store, bus, app_metrics)?;
    consumer.run(create_shutdown_signal()).await;

    sweeper.abort();
    info!("Consumer shutdown complete");
    Ok(())
}

/// Create a future that resolves when a shutdown signal is received.
///
/// On Unix-like systems, this listens for both Ctrl+C (SIGINT) and SIGTERM.
/// On other platforms, it only listens for Ctrl+C.
///
/// # Panics
///
/// Panics if signal handler installation fails. This is intentional because
/// signal handler failures are unrecoverable system-level errors that indicate
/// the OS cannot deliver shutdown signals, making graceful shutdown impossible.
async fn create_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
