//! Configuration validation tests.
//!
//! These tests verify the crate's configuration validation logic against
//! the real section validators.

use snaplink::config::{DatabaseConfig, RateLimitConfig, UrlConfig};

fn url_config() -> UrlConfig {
    UrlConfig {
        default_code_length: 7,
        base_url: "http://localhost:3000".to_string(),
        max_url_length: 2048,
        custom_alias_min_length: 3,
        custom_alias_max_length: 50,
    }
}

mod url_config_tests {
    use super::*;

    #[test]
    fn test_defaults_pass() {
        assert!(url_config().validate().is_ok());
    }

    #[test]
    fn test_code_length_bounds() {
        let mut config = url_config();
        config.default_code_length = 3;
        assert!(config.validate().is_err());
        config.default_code_length = 17;
        assert!(config.validate().is_err());
        for length in 4..=16 {
            config.default_code_length = length;
            assert!(config.validate().is_ok(), "rejected length {}", length);
        }
    }

    #[test]
    fn test_alias_bounds() {
        let mut config = url_config();
        config.custom_alias_min_length = 2;
        assert!(config.validate().is_err());

        let mut config = url_config();
        config.custom_alias_max_length = 51;
        assert!(config.validate().is_err());

        let mut config = url_config();
        config.custom_alias_max_length = config.custom_alias_min_length - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_url_length_rejected() {
        let mut config = url_config();
        config.max_url_length = 0;
        assert!(config.validate().is_err());
    }
}

mod database_config_tests {
    use super::*;

    #[test]
    fn test_connection_limits() {
        let config = DatabaseConfig {
            url: "postgresql://localhost/test".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 1,
        };
        assert!(config.validate().is_ok());

        let inverted = DatabaseConfig {
            min_connections: 11,
            ..config.clone()
        };
        assert!(inverted.validate().is_err());

        let no_timeout = DatabaseConfig {
            acquire_timeout_seconds: 0,
            ..config
        };
        assert!(no_timeout.validate().is_err());
    }
}

mod rate_limit_config_tests {
    use super::*;

    #[test]
    fn test_window_and_budget_must_be_positive() {
        assert!(RateLimitConfig {
            window_seconds: 60,
            limit: 60,
        }
        .validate()
        .is_ok());

        assert!(RateLimitConfig {
            window_seconds: 0,
            limit: 60,
        }
        .validate()
        .is_err());

        assert!(RateLimitConfig {
            window_seconds: 60,
            limit: 0,
        }
        .validate()
        .is_err());
    }
}

/// Conventions the configuration relies on
mod convention_tests {
    #[test]
    fn test_base_url_has_no_trailing_slash() {
        let base_url = "http://localhost:3000";
        assert!(!base_url.ends_with('/'));

        let short_url = format!("{}/{}", base_url, "abc123X");
        assert_eq!(short_url, "http://localhost:3000/abc123X");
    }

    #[test]
    fn test_allowed_origins_parsing() {
        let raw = "https://a.example, https://b.example";
        let origins: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();

        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://a.example");
    }

    #[test]
    fn test_dead_letter_topic_naming() {
        let topic = "url.hits";
        assert_eq!(format!("{}.dlq", topic), "url.hits.dlq");
    }
}
