use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] rdkafka::error::KafkaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL exceeds maximum length of {0} characters")]
    UrlTooLong(usize),

    #[error("Invalid custom alias: {0}")]
    AliasInvalid(String),

    #[error("Custom alias already in use: {0}")]
    AliasTaken(String),

    #[error("Expiry time must be in the future")]
    ExpiryInPast,

    #[error("URL flagged as malicious")]
    UrlBlocked,

    #[error("Short code not found: {0}")]
    NotFound(String),

    #[error("Short code has expired: {0}")]
    Gone(String),

    #[error("Invalid short code format")]
    InvalidCode,

    #[error("Redirect target failed safety checks")]
    InvalidRedirect,

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Short code generation failed")]
    CodeGenerationFailed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Environment variable missing: {0}")]
    MissingEnvVar(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the store error means the dependency is unreachable
    /// rather than the query being wrong.
    fn is_unavailable(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        )
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), "NOT_FOUND"),
            AppError::Gone(_) => (StatusCode::GONE, self.to_string(), "GONE"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string(), "VALIDATION"),
            AppError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_URL"),
            AppError::UrlTooLong(_) => (StatusCode::BAD_REQUEST, self.to_string(), "URL_TOO_LONG"),
            AppError::AliasInvalid(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), "ALIAS_INVALID")
            }
            AppError::AliasTaken(_) => (StatusCode::BAD_REQUEST, self.to_string(), "ALIAS_TAKEN"),
            AppError::ExpiryInPast => (StatusCode::BAD_REQUEST, self.to_string(), "EXPIRY_IN_PAST"),
            AppError::UrlBlocked => (StatusCode::BAD_REQUEST, self.to_string(), "BLOCKED"),
            AppError::InvalidCode => (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_CODE"),
            AppError::InvalidRedirect => {
                (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_REDIRECT")
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "UNAUTHORIZED"),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                "RATE_LIMITED",
            ),
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                if Self::is_unavailable(e) {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Primary store unavailable".to_string(),
                        "DEPENDENCY_UNAVAILABLE",
                    )
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Database error occurred".to_string(),
                        "INTERNAL",
                    )
                }
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Cache unavailable".to_string(),
                    "DEPENDENCY_UNAVAILABLE",
                )
            }
            AppError::RedisPool(ref e) => {
                tracing::error!("Redis pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Cache unavailable".to_string(),
                    "DEPENDENCY_UNAVAILABLE",
                )
            }
            AppError::EventBus(ref e) => {
                tracing::error!("Event bus error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Event bus error occurred".to_string(),
                    "INTERNAL",
                )
            }
            AppError::Serialization(ref e) => {
                tracing::error!("Serialization error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Data serialization error".to_string(),
                    "INTERNAL",
                )
            }
            _ => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    "INTERNAL",
                )
            }
        };

        let body = json!({
            "error": error_code,
            "message": error_message,
        });

        (status, Json(body)).into_response()
    }
}

/// Result type alias for AppResult
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("abc123".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_gone_maps_to_410() {
        let response = AppError::Gone("abc123".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[test]
    fn test_alias_taken_maps_to_400() {
        let response = AppError::AliasTaken("my-link".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_rate_limited_maps_to_429() {
        let response = AppError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_pool_timeout_maps_to_503() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
