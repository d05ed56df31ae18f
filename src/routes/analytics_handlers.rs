use crate::analytics::query::{Granularity, DEFAULT_TOP_LIMIT};
use crate::analytics::AnalyticsQuery;
use crate::error::{AppError, AppResult};
use crate::services::redirect;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use super::types::{AnalyticsParams, ExportParams};
use super::AppState;

/// Largest accepted topLimit.
const MAX_TOP_LIMIT: usize = 100;

/// Full analytics dashboard for a code
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<AnalyticsParams>,
) -> AppResult<impl IntoResponse> {
    if !redirect::is_valid_code(&code) {
        return Err(AppError::InvalidCode);
    }
    ensure_exists(&state, &code).await?;

    let (start, end) = AnalyticsQuery::resolve_range(
        parse_date_param(params.start_date.as_deref())?,
        parse_date_param(params.end_date.as_deref())?,
    )?;
    let granularity = params.granularity.unwrap_or(Granularity::Hour);
    let top_limit = params
        .top_limit
        .unwrap_or(DEFAULT_TOP_LIMIT)
        .clamp(1, MAX_TOP_LIMIT);

    let response = state
        .analytics
        .get_analytics(&code, start, end, granularity, top_limit)
        .await?;

    Ok(Json(response))
}

/// Condensed per-code analytics view
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !redirect::is_valid_code(&code) {
        return Err(AppError::InvalidCode);
    }
    ensure_exists(&state, &code).await?;

    let response = state.analytics.get_summary(&code).await?;
    Ok(Json(response))
}

/// Export the hit time series as CSV or a JSON envelope
pub async fn export_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<ExportParams>,
) -> AppResult<Response> {
    if !redirect::is_valid_code(&code) {
        return Err(AppError::InvalidCode);
    }
    ensure_exists(&state, &code).await?;

    let (start, end) = AnalyticsQuery::resolve_range(
        parse_date_param(params.start_date.as_deref())?,
        parse_date_param(params.end_date.as_deref())?,
    )?;
    let granularity = params.granularity.unwrap_or(Granularity::Hour);

    let series = state
        .analytics
        .time_series(&code, start, end, granularity)
        .await?;

    match params.format.as_deref().unwrap_or("csv") {
        "csv" => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(["timestamp", "hits"])
                .map_err(|e| AppError::Internal(format!("csv write failed: {}", e)))?;
            for point in &series {
                writer
                    .write_record([point.timestamp.to_rfc3339(), point.hits.to_string()])
                    .map_err(|e| AppError::Internal(format!("csv write failed: {}", e)))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| AppError::Internal(format!("csv flush failed: {}", e)))?;

            let filename = format!("analytics-{}.csv", code);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                bytes,
            )
                .into_response())
        }
        "json" => Ok(Json(serde_json::json!({
            "code": code,
            "startDate": start,
            "endDate": end,
            "granularity": granularity,
            "series": series,
        }))
        .into_response()),
        other => Err(AppError::Validation(format!(
            "unsupported export format: {}",
            other
        ))),
    }
}

/// Analytics endpoints 404 for codes that were never registered.
async fn ensure_exists(state: &AppState, code: &str) -> AppResult<()> {
    state
        .urls
        .find_record(code)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(code.to_string()))
}

/// Accept RFC 3339 instants or bare dates (midnight UTC).
fn parse_date_param(raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(DateTime::from_naive_utc_and_offset(midnight, Utc)));
        }
    }

    Err(AppError::Validation(format!(
        "invalid date: {} (expected RFC 3339 or YYYY-MM-DD)",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_instant() {
        let parsed = parse_date_param(Some("2024-01-01T12:00:00Z")).unwrap();
        assert!(parsed.is_some());
    }

    #[test]
    fn test_parse_bare_date() {
        let parsed = parse_date_param(Some("2024-01-01")).unwrap().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_absent_is_none() {
        assert!(parse_date_param(None).unwrap().is_none());
        assert!(parse_date_param(Some("")).unwrap().is_none());
    }

    #[test]
    fn test_parse_garbage_is_rejected() {
        assert!(parse_date_param(Some("yesterday")).is_err());
        assert!(parse_date_param(Some("01/02/2024")).is_err());
    }
}
