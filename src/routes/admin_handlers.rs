use crate::error::{AppError, AppResult};
use crate::middleware_impls::RequestContext;
use crate::models::{BatchCreateError, BatchCreateRequest, BatchCreateResponse};
use crate::services::redirect;
use crate::services::url_service::CreateContext;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

use super::AppState;

/// Largest accepted batch.
const MAX_BATCH_SIZE: usize = 100;

/// Delete a short URL (admin-only; the key check runs in middleware)
pub async fn delete_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !redirect::is_valid_code(&code) {
        return Err(AppError::InvalidCode);
    }

    let deleted = state.urls.delete_by_code(&code).await?;
    if !deleted {
        return Err(AppError::NotFound(code));
    }

    // Counter rows for a deleted code are dead weight; clear them off the
    // response path.
    let analytics = state.analytics.clone();
    tokio::spawn(async move {
        if let Err(e) = analytics.purge_code(&code).await {
            tracing::warn!(code = %code, "analytics purge failed: {e}");
        }
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Create up to 100 short URLs in one call (admin-only)
pub async fn batch_create(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<BatchCreateRequest>,
) -> AppResult<impl IntoResponse> {
    if payload.urls.is_empty() {
        return Err(AppError::Validation("urls must not be empty".to_string()));
    }
    if payload.urls.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "batch size exceeds the maximum of {}",
            MAX_BATCH_SIZE
        )));
    }

    let create_context = CreateContext {
        ip: Some(context.client_ip),
        user_agent: context.user_agent,
    };

    let mut success = Vec::new();
    let mut errors = Vec::new();

    for request in payload.urls {
        let url = request.url.clone();
        let result = match request.validate() {
            Ok(()) => {
                state
                    .urls
                    .create_short(request, create_context.clone())
                    .await
            }
            Err(e) => Err(AppError::Validation(format!("{}", e))),
        };

        match result {
            Ok(response) => success.push(response),
            Err(e) => errors.push(BatchCreateError {
                url,
                error: e.to_string(),
            }),
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(BatchCreateResponse { success, errors }),
    ))
}
