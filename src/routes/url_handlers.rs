use crate::error::{AppError, AppResult};
use crate::middleware_impls::RequestContext;
use crate::models::{
    CreateUrlRequest, ListUrlsResponse, SortKey, SortOrder, StatsResponse, StatusFilter,
    UrlSummary,
};
use crate::services::url_service::CreateContext;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use super::types::ListUrlsQuery;
use super::AppState;

/// Default and maximum page sizes for listing.
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Create a short URL
pub async fn create_url(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<CreateUrlRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("{}", e)))?;

    enforce_create_budget(&state, &context.client_ip).await?;

    let create_context = CreateContext {
        ip: Some(context.client_ip),
        user_agent: context.user_agent,
    };

    let response = state.urls.create_short(payload, create_context).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Counted per-IP creation budget on the cache adapter. The limiter
/// itself degrades open: an unreachable cache never blocks ingestion.
async fn enforce_create_budget(state: &AppState, client_ip: &str) -> AppResult<()> {
    let window = Duration::from_secs(state.rate_limit.window_seconds);
    let key = format!("create:{}", client_ip);
    match state.cache.incr_rate_limit(&key, window).await {
        Ok(count) if count > u64::from(state.rate_limit.limit) => Err(AppError::RateLimited),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!("rate-limit counter unavailable, allowing: {e}");
            Ok(())
        }
    }
}

/// List URLs with search, status filter, sorting, and pagination
pub async fn list_urls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUrlsQuery>,
) -> AppResult<impl IntoResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let params = crate::db::ListParams {
        search: query.search.filter(|s| !s.is_empty()),
        status: query.status.unwrap_or(StatusFilter::All),
        sort: query.sort.unwrap_or(SortKey::CreatedAt),
        order: query.order.unwrap_or(SortOrder::Desc),
        offset: (page - 1) * limit,
        limit,
    };

    let (records, total) = state.urls.list(&params).await?;
    let base_url = state.urls.base_url();
    let summaries: Vec<UrlSummary> = records
        .into_iter()
        .map(|record| UrlSummary::from_record(record, base_url))
        .collect();

    Ok(Json(ListUrlsResponse::new(summaries, total, page, limit)))
}

/// Get global statistics
pub async fn get_stats(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let stats = state.urls.stats().await?;

    let response = StatsResponse {
        total: stats.total,
        active: stats.active,
        expired: stats.expired,
    };

    Ok(Json(response))
}
