//! Integration tests for snaplink API contracts.
//!
//! Wire-shape checks for the JSON payloads, plus contract tests that call
//! the crate's own validation, normalization, and redirect-policy code.
//! Round trips through the real router live in `http_tests.rs`.

use serde_json::json;

/// Test module for request/response types
mod type_tests {
    use super::*;

    #[test]
    fn test_create_url_request_serialization() {
        let request = json!({
            "url": "https://example.com",
            "customAlias": "my-link",
            "expiresAt": "2026-12-31T00:00:00Z",
            "metadata": { "team": "growth" }
        });

        let parsed: snaplink::models::CreateUrlRequest =
            serde_json::from_value(request).unwrap();
        assert_eq!(parsed.url, "https://example.com");
        assert_eq!(parsed.custom_alias.as_deref(), Some("my-link"));
        assert!(parsed.expires_at.is_some());
        assert_eq!(parsed.metadata.unwrap()["team"], "growth");
    }

    #[test]
    fn test_create_url_request_minimal() {
        let request = json!({
            "url": "https://example.com"
        });

        let parsed: snaplink::models::CreateUrlRequest =
            serde_json::from_value(request).unwrap();
        assert_eq!(parsed.url, "https://example.com");
        assert!(parsed.custom_alias.is_none());
        assert!(parsed.expires_at.is_none());
    }

    #[test]
    fn test_error_response_format() {
        let error = json!({
            "error": "NOT_FOUND",
            "message": "Short code not found: abc123"
        });

        assert_eq!(error["error"], "NOT_FOUND");
        assert!(error["message"].as_str().unwrap().contains("abc123"));
    }

    #[test]
    fn test_list_response_pagination_fields() {
        let page = snaplink::models::ListUrlsResponse::new(Vec::new(), 45, 2, 20);
        let body = serde_json::to_value(&page).unwrap();

        assert_eq!(body["total"], 45);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["hasNext"], true);
        assert_eq!(body["hasPrev"], true);
        assert!(body["urls"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_hit_event_wire_format() {
        let event = json!({
            "code": "abc123X",
            "timestamp": "2024-01-01T12:00:00Z",
            "ip": "203.0.113.9",
            "user_agent": "Mozilla/5.0",
            "referrer": "https://news.ycombinator.com/"
        });

        let parsed: snaplink::models::HitEvent = serde_json::from_value(event).unwrap();
        assert_eq!(parsed.code, "abc123X");
        assert_eq!(parsed.ip, "203.0.113.9");
        assert!(parsed.country.is_none());
    }

    #[test]
    fn test_batch_response_format() {
        let response = json!({
            "success": [
                { "code": "aaa1111", "shortUrl": "http://localhost:3000/aaa1111",
                  "original": "https://a.com", "createdAt": "2026-01-01T00:00:00Z", "isNew": true }
            ],
            "errors": [
                { "url": "ftp://b.com", "error": "Invalid URL: URL must use the http or https scheme" }
            ]
        });

        assert_eq!(response["success"].as_array().unwrap().len(), 1);
        assert_eq!(response["errors"][0]["url"], "ftp://b.com");
    }
}

/// Test module for boundary validation rules, against the real validators
mod validation_tests {
    use snaplink::services::redirect::is_valid_code;
    use snaplink::services::short_code::CodeAllocator;

    #[test]
    fn test_valid_codes() {
        assert!(is_valid_code("abc123X"));
        assert!(is_valid_code("my-link_2"));
        assert!(!is_valid_code("has space"));
        assert!(!is_valid_code("query?x"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_alias_length_rules() {
        assert!(CodeAllocator::validate_alias("abc", 3, 50).is_ok());
        assert!(CodeAllocator::validate_alias(&"a".repeat(50), 3, 50).is_ok());
        assert!(CodeAllocator::validate_alias("ab", 3, 50).is_err());
        assert!(CodeAllocator::validate_alias(&"a".repeat(51), 3, 50).is_err());
    }

    #[test]
    fn test_alias_charset_rules() {
        assert!(CodeAllocator::validate_alias("A_b-9", 3, 50).is_ok());
        assert!(CodeAllocator::validate_alias("has space", 3, 50).is_err());
        assert!(CodeAllocator::validate_alias("slash/evil", 3, 50).is_err());
    }
}

/// Test module for normalization-driven deduplication scenarios
mod normalization_tests {
    use snaplink::normalizer::normalize;

    #[test]
    fn test_dedup_across_tracking_noise() {
        // Two submissions differing only in marketing noise share a key.
        let first = normalize("https://Example.COM/path?utm_source=x&a=1");
        let second = normalize("https://example.com/path/?a=1&utm_medium=y");
        assert_eq!(first, second);
        assert_eq!(first, "https://example.com/path?a=1");
    }

    #[test]
    fn test_port_and_trailing_slash_scenarios() {
        assert_eq!(
            normalize("http://example.com:80/page/"),
            "http://example.com/page"
        );
        assert_eq!(
            normalize("https://example.com:443/"),
            "https://example.com/"
        );
    }
}

/// Test module for redirect policy, against the real guard
mod redirect_tests {
    use http::StatusCode;
    use snaplink::services::redirect::{check_redirect_target, choose_status};

    #[test]
    fn test_open_redirect_guard() {
        assert!(check_redirect_target("https://example.com/page").is_ok());
        assert!(check_redirect_target("http://127.0.0.1/x").is_err());
        assert!(check_redirect_target("http://10.0.0.1/x").is_err());
        assert!(check_redirect_target("ftp://example.com").is_err());
        assert!(check_redirect_target("http://free-money.tk/").is_err());
    }

    #[test]
    fn test_redirect_status_codes() {
        assert_eq!(
            choose_status("https://github.com/rust-lang/rust"),
            StatusCode::MOVED_PERMANENTLY
        );
        assert_eq!(
            choose_status("https://www.youtube.com/watch?v=x"),
            StatusCode::MOVED_PERMANENTLY
        );
        assert_eq!(choose_status("https://example.com/"), StatusCode::FOUND);
    }

    #[test]
    fn test_cache_suppression_headers() {
        let headers = [
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
            ("Pragma", "no-cache"),
            ("X-Robots-Tag", "noindex, nofollow"),
        ];

        assert!(headers
            .iter()
            .any(|(name, value)| *name == "Cache-Control" && value.contains("no-store")));
        assert!(headers
            .iter()
            .any(|(name, value)| *name == "X-Robots-Tag" && value.contains("noindex")));
    }
}
