use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_governor::key_extractor::KeyExtractor;
use uuid::Uuid;

/// Request ID wrapper for use in request extensions
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Request context containing request metadata
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        client_ip: String,
        user_agent: Option<String>,
        referrer: Option<String>,
    ) -> Self {
        Self {
            request_id,
            client_ip,
            user_agent,
            referrer,
        }
    }
}

/// Extract client IP address from headers
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    // Check for X-Forwarded-For header (proxy/load balancer)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    // Check for X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(real_ip_str) = real_ip.to_str() {
            return real_ip_str.to_string();
        }
    }

    // Fallback to a default
    "unknown".to_string()
}

/// Extract user agent from headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract the referrer from headers
pub fn extract_referrer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("referer")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Request ID middleware - generates a correlation id for each request
/// and echoes it in the X-Request-ID response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    // Honor an existing correlation id from an upstream proxy.
    let request_id: String = req
        .headers()
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    tracing::info!(
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
        "Incoming request"
    );

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}

/// Per-request HTTP metrics. Mounted with `route_layer`, which runs
/// inside the match boundary; `MatchedPath` does not exist in middleware
/// added with a plain `Router::layer`. The route template keeps codes
/// from exploding the label cardinality.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let handler = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    if let Some(metrics) = crate::metrics::get() {
        metrics
            .http_requests_total
            .with_label_values(&[&handler, &method, response.status().as_str()])
            .inc();
    }

    response
}

/// Request context middleware - adds context to each request
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let headers = req.headers();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let client_ip = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);
    let referrer = extract_referrer(headers);

    let context = RequestContext::new(request_id, client_ip, user_agent, referrer);
    req.extensions_mut().insert(context);

    next.run(req).await
}

/// Compare two secrets without leaking where they diverge: both sides are
/// hashed and the fixed-length digests compared.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_digest = Sha256::digest(provided.as_bytes());
    let expected_digest = Sha256::digest(expected.as_bytes());
    provided_digest == expected_digest
}

/// Admin authentication middleware: the configured API-key header must
/// match the configured secret. Missing or wrong keys produce 401.
pub async fn require_admin_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(state.admin_api_key_header.as_str())
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !keys_match(provided, &state.admin_api_key) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Rate limiting key extractor: one budget per client IP.
#[derive(Clone)]
pub struct ClientIpKeyExtractor;

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = String;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, tower_governor::GovernorError> {
        let headers = req.headers();
        let ip = extract_client_ip(headers);
        Ok(format!("ip:{}", ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_new() {
        let id = RequestId::new();
        assert_eq!(id.0.len(), 36); // UUID v4 length
    }

    #[test]
    fn test_request_context_new() {
        let ctx = RequestContext::new(
            "test-123".to_string(),
            "127.0.0.1".to_string(),
            Some("Mozilla/5.0".to_string()),
            None,
        );

        assert_eq!(ctx.request_id, "test-123");
        assert_eq!(ctx.client_ip, "127.0.0.1");
        assert_eq!(ctx.user_agent, Some("Mozilla/5.0".to_string()));
        assert!(ctx.referrer.is_none());
    }

    #[test]
    fn test_extract_client_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "192.168.1.1".parse().unwrap());

        let ip = extract_client_ip(&headers);
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn test_extract_client_ip_from_multiple_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "192.168.1.1, 10.0.0.1".parse().unwrap());

        let ip = extract_client_ip(&headers);
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn test_extract_client_ip_unknown() {
        let headers = HeaderMap::new();
        let ip = extract_client_ip(&headers);
        assert_eq!(ip, "unknown");
    }

    #[test]
    fn test_extract_referrer() {
        let mut headers = HeaderMap::new();
        headers.insert("referer", "https://news.ycombinator.com/".parse().unwrap());
        assert_eq!(
            extract_referrer(&headers).as_deref(),
            Some("https://news.ycombinator.com/")
        );
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "Secret"));
        assert!(!keys_match("", "secret"));
        assert!(!keys_match("secre", "secret"));
    }
}
