use crate::error::{AppError, AppResult};
use crate::middleware_impls::{require_admin_key, ClientIpKeyExtractor};
use axum::middleware;
use axum::routing::{delete, get, post};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};

use super::admin_handlers;
use super::analytics_handlers;
use super::health;
use super::redirect_handlers;
use super::url_handlers;
use super::AppState;

/// Create application router
///
/// # Errors
///
/// Returns an error if rate limiter configuration fails to build.
pub fn create_router(
    state: Arc<AppState>,
    allowed_origins: Vec<String>,
) -> AppResult<axum::Router> {
    use crate::middleware_impls::{request_context_middleware, request_id_middleware};

    // Governor pre-filter for the public read path. Ingestion additionally
    // carries the counted Redis budget inside its handler.
    let window_ms = state.rate_limit.window_seconds * 1000;
    let replenish_ms = (window_ms / u64::from(state.rate_limit.limit)).max(1);
    let lenient_config = tower_governor::governor::GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms)
        .burst_size(state.rate_limit.limit)
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .ok_or_else(|| {
            AppError::Configuration("Failed to build rate limit config".to_string())
        })?;
    let governor_layer_lenient = GovernorLayer::new(lenient_config);

    // Configure CORS with specific origins
    let cors = if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|s| s.parse::<http::HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Public API: ingestion, listing, stats, analytics dashboards
    let api_routes = axum::Router::new()
        .route(
            "/api/urls",
            post(url_handlers::create_url).get(url_handlers::list_urls),
        )
        .route("/api/urls/stats", get(url_handlers::get_stats))
        .route(
            "/api/analytics/{code}",
            get(analytics_handlers::get_analytics),
        )
        .route(
            "/api/analytics/{code}/summary",
            get(analytics_handlers::get_summary),
        )
        .route(
            "/api/analytics/{code}/export",
            get(analytics_handlers::export_analytics),
        );

    // Admin-only surface behind the API-key check
    let admin_routes = axum::Router::new()
        .route("/api/urls/{code}", delete(admin_handlers::delete_url))
        .route("/api/urls/batch", post(admin_handlers::batch_create))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    // Redirect hot path and preview, behind the lenient pre-filter
    let public_routes = axum::Router::new()
        .route("/{code}", get(redirect_handlers::resolve))
        .route("/{code}/preview", get(redirect_handlers::preview))
        .layer(governor_layer_lenient);

    // Health and metrics endpoints (no rate limiting)
    let health_routes = axum::Router::new()
        .route("/health", get(health::health_check))
        .route("/health/liveness", get(health::liveness))
        .route("/health/readiness", get(health::readiness))
        .route("/metrics", get(health::metrics_text))
        .route("/metrics/json", get(health::metrics_json));

    // Merge routers and apply middleware layers. Metrics go on a
    // route_layer so they observe the matched route template.
    Ok(api_routes
        .merge(admin_routes)
        .merge(public_routes)
        .merge(health_routes)
        .route_layer(middleware::from_fn(
            crate::middleware_impls::http_metrics_middleware,
        ))
        .layer(cors)
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state))
}
