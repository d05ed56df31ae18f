use crate::analytics::AnalyticsQuery;
use crate::cache::Cache;
use crate::config::RateLimitConfig;
use crate::db::Repository;
use crate::services::redirect::RedirectDispatcher;
use crate::services::url_service::UrlService;

/// Application state shared across all HTTP handlers.
///
/// This struct is wrapped in `Arc` and shared across all request handlers
/// via Axum's State extraction. It contains all the necessary dependencies
/// for handling HTTP requests.
#[derive(Clone)]
pub struct AppState {
    /// URL ingestion and lookup service
    pub urls: UrlService,

    /// Redirect resolution with open-redirect defense
    pub dispatcher: RedirectDispatcher,

    /// Dashboard queries over the analytics store
    pub analytics: AnalyticsQuery,

    /// Primary store handle, used directly by health checks
    pub repository: Repository,

    /// Redis cache handle, used by health checks and the rate primitive
    pub cache: Cache,

    /// Process-wide metrics registry
    pub registry: prometheus::Registry,

    /// Ingestion rate-limit window and budget
    pub rate_limit: RateLimitConfig,

    /// Admin API key and the header it arrives in
    pub admin_api_key: String,
    pub admin_api_key_header: String,
}
