use crate::error::{AppError, AppResult};
use crate::middleware_impls::RequestContext;
use crate::models::PreviewResponse;
use crate::services::redirect::{self, RedirectContext};
use axum::body::Body;
use axum::extract::{Extension, Path, State};
use axum::http::{header, HeaderValue, Response};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;

use super::AppState;

/// Resolve a short code and redirect to its target
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let redirect_context = RedirectContext {
        ip: context.client_ip,
        user_agent: context.user_agent.unwrap_or_default(),
        referrer: context.referrer,
    };

    let outcome = state
        .dispatcher
        .resolve_and_redirect(&code, redirect_context)
        .await?;

    let location = HeaderValue::try_from(outcome.location.as_str()).map_err(|_| {
        tracing::error!(code = %code, "target contains characters invalid in a Location header");
        AppError::Internal("redirect target is not header-safe".to_string())
    })?;

    // Redirects must never be cached or indexed: a deleted or expired code
    // has to stop resolving at the edge too.
    let response = Response::builder()
        .status(outcome.status)
        .header(header::LOCATION, location)
        .header(
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate",
        )
        .header(header::PRAGMA, "no-cache")
        .header("X-Robots-Tag", "noindex, nofollow")
        .body(Body::empty())
        .map_err(|e| AppError::Internal(format!("response build failed: {}", e)))?;

    Ok(response)
}

/// Non-redirecting view of a short code
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !redirect::is_valid_code(&code) {
        return Err(AppError::InvalidCode);
    }

    let record = state
        .urls
        .find_record(&code)
        .await?
        .ok_or_else(|| AppError::NotFound(code.clone()))?;

    let response = PreviewResponse {
        is_expired: !record.is_resolvable(Utc::now()),
        code: record.code,
        original: record.original,
        created_at: record.created_at,
        expires_at: record.expires_at,
        hit_count: record.hit_count,
        metadata: record.metadata,
    };

    Ok(Json(response))
}
