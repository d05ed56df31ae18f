use crate::analytics::query::Granularity;
use crate::models::{SortKey, SortOrder, StatusFilter};
use serde::{Deserialize, Serialize};

/// Query parameters for listing URLs
#[derive(Debug, Deserialize)]
pub struct ListUrlsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<SortKey>,
    pub order: Option<SortOrder>,
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
}

/// Query parameters for the analytics dashboard
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: Option<Granularity>,
    pub top_limit: Option<usize>,
}

/// Query parameters for the analytics export
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub format: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: Option<Granularity>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub database: HealthStatus,
    pub cache: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Individual health status
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub latency_ms: Option<u64>,
}
