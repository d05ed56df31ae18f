use crate::error::AppResult;
use crate::metrics;
use crate::routes::types::{HealthCheckResponse, HealthStatus};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use super::AppState;

/// Health check endpoint: process plus dependency status
pub async fn health_check(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let start = std::time::Instant::now();

    // Check database connectivity
    let db_health = match tokio::time::timeout(StdDuration::from_secs(5), state.repository.ping())
        .await
    {
        Ok(Ok(())) => {
            let latency = start.elapsed().as_millis() as u64;
            HealthStatus {
                status: "healthy".to_string(),
                latency_ms: Some(latency),
            }
        }
        Ok(Err(_)) | Err(_) => HealthStatus {
            status: "unhealthy".to_string(),
            latency_ms: None,
        },
    };

    // Check cache connectivity
    let cache_start = std::time::Instant::now();
    let cache_health = match tokio::time::timeout(StdDuration::from_secs(5), state.cache.ping())
        .await
    {
        Ok(Ok(_)) => {
            let latency = cache_start.elapsed().as_millis() as u64;
            HealthStatus {
                status: "healthy".to_string(),
                latency_ms: Some(latency),
            }
        }
        Ok(Err(_)) | Err(_) => HealthStatus {
            status: "unhealthy".to_string(),
            latency_ms: None,
        },
    };

    // The cache degrades to miss-through, so only the database gates
    // overall health.
    let overall_status = if db_health.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthCheckResponse {
        status: overall_status.to_string(),
        database: db_health,
        cache: cache_health,
        timestamp: chrono::Utc::now(),
    };

    Ok(Json(response))
}

/// Liveness: a process-only check, no dependency probes
pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness: the primary store must answer before traffic is admitted
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match tokio::time::timeout(StdDuration::from_secs(5), state.repository.ping()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready" })),
        ),
        Ok(Err(_)) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not ready" })),
        ),
    }
}

/// Prometheus text exposition
pub async fn metrics_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::gather(&state.registry)
}

/// JSON mirror of the metrics registry
pub async fn metrics_json(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(metrics::gather_json(&state.registry))
}
