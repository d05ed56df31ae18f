//! Administrative command handlers.
//!
//! This module contains CLI command handlers for administrative tasks
//! such as cleaning expired URLs, running migrations, viewing statistics,
//! sweeping analytics TTLs, and pinging the cache server.

use crate::analytics::AnalyticsStore;
use crate::cache::Cache;
use crate::config::Config;
use crate::db::Repository;
use crate::error::AppResult;
use clap::Subcommand;
use tracing::info;

/// Administrative commands available via CLI.
#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Clean expired URLs from the database
    CleanExpired,

    /// Run database migrations
    Migrate,

    /// Show statistics
    Stats,

    /// Ping the cache server
    PingCache,

    /// Remove analytics rows past their retention window
    SweepAnalytics,
}

/// Run an administrative command with the given configuration.
pub async fn run(config: Config, admin_command: AdminCommands) -> AppResult<()> {
    match admin_command {
        AdminCommands::CleanExpired => clean_expired(config).await,
        AdminCommands::Migrate => migrate(config).await,
        AdminCommands::Stats => stats(config).await,
        AdminCommands::PingCache => ping_cache(config).await,
        AdminCommands::SweepAnalytics => sweep_analytics(config).await,
    }
}

async fn repository(config: &Config) -> AppResult<Repository> {
    Repository::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
        config.database.acquire_timeout_seconds,
    )
    .await
}

/// Clean expired URLs from the database.
async fn clean_expired(config: Config) -> AppResult<()> {
    info!("Cleaning expired URLs...");
    let repository = repository(&config).await?;
    let removed = repository.delete_expired().await?;
    info!("Removed {} expired URLs", removed);
    Ok(())
}

/// Run database migrations.
async fn migrate(config: Config) -> AppResult<()> {
    info!("Running migrations...");
    let repository = repository(&config).await?;
    repository.run_migrations().await?;
    info!("Migrations completed");
    Ok(())
}

/// Show record statistics.
async fn stats(config: Config) -> AppResult<()> {
    let repository = repository(&config).await?;
    let stats = repository.get_stats().await?;
    info!(
        total = stats.total,
        active = stats.active,
        expired = stats.expired,
        "URL statistics"
    );
    Ok(())
}

/// Ping the cache server.
async fn ping_cache(config: Config) -> AppResult<()> {
    let cache = Cache::new(
        &config.cache.url,
        config.cache.max_connections,
        config.cache.default_ttl_seconds,
    )
    .await?;
    let response = cache.ping().await?;
    info!("Cache responded: {}", response);
    Ok(())
}

/// Sweep analytics rows past their retention windows.
async fn sweep_analytics(config: Config) -> AppResult<()> {
    let repository = repository(&config).await?;
    let store = AnalyticsStore::new(repository.pool().clone());
    let (minutes, visitors) = store.sweep_expired().await?;
    info!(
        minute_rows = minutes,
        visitor_rows = visitors,
        "analytics sweep complete"
    );
    Ok(())
}
