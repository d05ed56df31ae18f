//! Data models for the snaplink API.
//!
//! This module contains the persisted record types, the hit event carried
//! over the event bus, and all request and response types used by the API,
//! with validation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// URL record in the primary store
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Stable record identifier
    pub id: Uuid,
    /// Short code for the URL (e.g., "abc123")
    pub code: String,
    /// Original long URL, verbatim as submitted
    pub original: String,
    /// Canonical form used solely for deduplication
    pub normalized: String,
    /// Best-effort number of redirects served
    pub hit_count: i64,
    /// Set when the creator chose the code; always equals `code` then
    pub custom_alias: Option<String>,
    /// Absolute expiry instant; None means the record never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Provenance for audit
    pub creator_ip: Option<String>,
    pub creator_user_agent: Option<String>,
    /// Opaque creator-supplied key/value data
    pub metadata: Option<serde_json::Value>,
}

impl UrlRecord {
    /// A record is resolvable iff it has no expiry or the expiry is in the future.
    pub fn is_resolvable(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

/// Snapshot of a record held in the redirect cache.
///
/// Derived from `UrlRecord`, TTL-bounded, eventually consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTarget {
    pub code: String,
    pub original: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: i64,
}

impl From<&UrlRecord> for CachedTarget {
    fn from(record: &UrlRecord) -> Self {
        CachedTarget {
            code: record.code.clone(),
            original: record.original.clone(),
            expires_at: record.expires_at,
            hit_count: record.hit_count,
        }
    }
}

/// One redirect observation, immutable once emitted onto the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitEvent {
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Request to create a short URL
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUrlRequest {
    /// The URL to shorten (must be a valid HTTP/HTTPS URL)
    #[validate(length(min = 1, message = "URL must not be empty"))]
    pub url: String,

    /// Optional custom short code
    pub custom_alias: Option<String>,

    /// Optional absolute expiry instant (ISO-8601)
    pub expires_at: Option<DateTime<Utc>>,

    /// Opaque key/value data stored with the record
    pub metadata: Option<serde_json::Value>,
}

/// Response after creating a short URL
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUrlResponse {
    pub code: String,
    /// Full short URL for sharing
    pub short_url: String,
    pub original: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// False when an existing record for the same normalized URL was returned
    pub is_new: bool,
}

/// Summary of one record in list responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSummary {
    pub code: String,
    pub short_url: String,
    pub original: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_alias: Option<String>,
}

impl UrlSummary {
    pub fn from_record(record: UrlRecord, base_url: &str) -> Self {
        UrlSummary {
            short_url: format!("{}/{}", base_url, record.code),
            code: record.code,
            original: record.original,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
            hit_count: record.hit_count,
            custom_alias: record.custom_alias,
        }
    }
}

/// Paginated list payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUrlsResponse {
    pub urls: Vec<UrlSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl ListUrlsResponse {
    pub fn new(urls: Vec<UrlSummary>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        ListUrlsResponse {
            urls,
            total,
            page,
            limit,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Non-redirecting view of a record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub code: String,
    pub original: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub hit_count: i64,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Statistics summary
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: i64,
    pub active: i64,
    pub expired: i64,
}

/// Batch creation request (admin-only)
#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub urls: Vec<CreateUrlRequest>,
}

#[derive(Debug, Serialize)]
pub struct BatchCreateError {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchCreateResponse {
    pub success: Vec<CreateUrlResponse>,
    pub errors: Vec<BatchCreateError>,
}

/// Sort keys accepted by the list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    HitCount,
    Original,
    Code,
}

impl SortKey {
    /// Column name backing this sort key
    pub fn column(self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::HitCount => "hit_count",
            SortKey::Original => "original",
            SortKey::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    All,
    Active,
    Expired,
}

/// Error response format
#[derive(Debug, Serialize)]
#[allow(dead_code)]
pub struct ErrorResponse {
    /// Error code (e.g., "NOT_FOUND", "INVALID_URL")
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: Option<DateTime<Utc>>) -> UrlRecord {
        let now = Utc::now();
        UrlRecord {
            id: Uuid::new_v4(),
            code: "abc123X".to_string(),
            original: "https://example.com/page".to_string(),
            normalized: "https://example.com/page".to_string(),
            hit_count: 0,
            custom_alias: None,
            expires_at,
            created_at: now,
            updated_at: now,
            creator_ip: None,
            creator_user_agent: None,
            metadata: None,
        }
    }

    #[test]
    fn test_record_without_expiry_is_resolvable() {
        assert!(record(None).is_resolvable(Utc::now()));
    }

    #[test]
    fn test_record_with_future_expiry_is_resolvable() {
        let r = record(Some(Utc::now() + Duration::hours(1)));
        assert!(r.is_resolvable(Utc::now()));
    }

    #[test]
    fn test_record_with_past_expiry_is_not_resolvable() {
        let r = record(Some(Utc::now() - Duration::seconds(1)));
        assert!(!r.is_resolvable(Utc::now()));
    }

    #[test]
    fn test_cached_target_snapshot() {
        let r = record(None);
        let target = CachedTarget::from(&r);
        assert_eq!(target.code, r.code);
        assert_eq!(target.original, r.original);
        assert_eq!(target.hit_count, r.hit_count);
    }

    #[test]
    fn test_list_response_pagination_math() {
        let response = ListUrlsResponse::new(Vec::new(), 45, 2, 20);
        assert_eq!(response.total_pages, 3);
        assert!(response.has_next);
        assert!(response.has_prev);

        let response = ListUrlsResponse::new(Vec::new(), 0, 1, 20);
        assert_eq!(response.total_pages, 0);
        assert!(!response.has_next);
        assert!(!response.has_prev);
    }

    #[test]
    fn test_hit_event_round_trip() {
        let event = HitEvent {
            code: "abc123X".to_string(),
            timestamp: Utc::now(),
            ip: "203.0.113.9".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            referrer: Some("https://news.ycombinator.com/".to_string()),
            country: None,
            city: None,
            device_type: Some("pc".to_string()),
            browser: Some("Chrome".to_string()),
            os: Some("Linux".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: HitEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.code, event.code);
        assert_eq!(decoded.referrer, event.referrer);
        assert!(!json.contains("country"));
    }

    #[test]
    fn test_sort_key_columns() {
        assert_eq!(SortKey::CreatedAt.column(), "created_at");
        assert_eq!(SortKey::HitCount.column(), "hit_count");
        assert_eq!(SortOrder::Desc.keyword(), "DESC");
    }
}
