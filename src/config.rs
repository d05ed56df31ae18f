use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub url: UrlConfig,
    pub kafka: KafkaConfig,
    pub admin: AdminConfig,
    pub scanning: ScanningConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    pub max_connections: u32,
    pub default_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlConfig {
    /// Length of randomly generated short codes
    pub default_code_length: usize,
    /// Base URL for constructing short URLs (e.g., "http://localhost:3000")
    pub base_url: String,
    /// Maximum accepted length of the submitted URL
    pub max_url_length: usize,
    /// Custom alias length bounds
    pub custom_alias_min_length: usize,
    pub custom_alias_max_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    /// Topic carrying redirect hit events
    pub topic_hits: String,
    pub consumer_group: String,
    /// Bounded batch size applied per consumer flush
    pub consumer_batch_size: usize,
    /// Maximum concurrent applies per batch
    pub consumer_max_in_flight: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub api_key: String,
    /// Header carrying the admin key, defaults to X-API-Key
    pub api_key_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanningConfig {
    /// Toggle for the external URL reputation probe
    pub enabled: bool,
    /// Endpoint of the reputation service; unset disables the probe
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Rate-limit window in seconds
    pub window_seconds: u64,
    /// Requests allowed per window
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid SERVER_PORT".to_string()))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::MissingEnvVar("DATABASE_URL".to_string()))?;
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid DB_MAX_CONNECTIONS".to_string()))?;
        let db_min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid DB_MIN_CONNECTIONS".to_string()))?;
        let db_acquire_timeout = env::var("DB_ACQUIRE_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| {
                AppError::Configuration("Invalid DB_ACQUIRE_TIMEOUT_SECONDS".to_string())
            })?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let cache_max_connections = env::var("CACHE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid CACHE_MAX_CONNECTIONS".to_string()))?;
        let cache_default_ttl = env::var("REDIS_TTL")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid REDIS_TTL".to_string()))?;

        let default_code_length = env::var("DEFAULT_CODE_LENGTH")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid DEFAULT_CODE_LENGTH".to_string()))?;
        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));
        let max_url_length = env::var("MAX_URL_LENGTH")
            .unwrap_or_else(|_| "2048".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid MAX_URL_LENGTH".to_string()))?;
        let custom_alias_min_length = env::var("CUSTOM_ALIAS_MIN_LENGTH")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid CUSTOM_ALIAS_MIN_LENGTH".to_string()))?;
        let custom_alias_max_length = env::var("CUSTOM_ALIAS_MAX_LENGTH")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid CUSTOM_ALIAS_MAX_LENGTH".to_string()))?;

        // Event bus config
        let kafka_bootstrap_servers =
            env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "127.0.0.1:9092".to_string());
        let kafka_topic_hits =
            env::var("KAFKA_TOPIC_HITS").unwrap_or_else(|_| "url.hits".to_string());
        let kafka_consumer_group =
            env::var("KAFKA_CONSUMER_GROUP").unwrap_or_else(|_| "url-hits-analytics".to_string());
        let consumer_batch_size = env::var("CONSUMER_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid CONSUMER_BATCH_SIZE".to_string()))?;
        let consumer_max_in_flight = env::var("CONSUMER_MAX_IN_FLIGHT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid CONSUMER_MAX_IN_FLIGHT".to_string()))?;

        // Admin config
        let admin_api_key = env::var("ADMIN_API_KEY")
            .map_err(|_| AppError::MissingEnvVar("ADMIN_API_KEY".to_string()))?;
        let admin_api_key_header =
            env::var("ADMIN_API_KEY_HEADER").unwrap_or_else(|_| "X-API-Key".to_string());

        // Reputation scanning config
        let scanning_enabled = env::var("ENABLE_URL_SCANNING")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid ENABLE_URL_SCANNING".to_string()))?;
        let scanning_endpoint = env::var("URL_SCANNING_ENDPOINT").ok();
        let scanning_timeout = env::var("URL_SCANNING_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .map_err(|_| {
                AppError::Configuration("Invalid URL_SCANNING_TIMEOUT_SECONDS".to_string())
            })?;

        // Rate limit config
        let rate_limit_window = env::var("RATE_LIMIT_TTL")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid RATE_LIMIT_TTL".to_string()))?;
        let rate_limit_limit = env::var("RATE_LIMIT_LIMIT")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| AppError::Configuration("Invalid RATE_LIMIT_LIMIT".to_string()))?;

        // CORS config
        let allowed_origins_str = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let allowed_origins: Vec<String> = if allowed_origins_str == "*" {
            vec!["*".to_string()]
        } else {
            allowed_origins_str
                .split(',')
                .map(|s| s.trim().to_string())
                .collect()
        };

        let config = Config {
            server: ServerConfig {
                host: server_host,
                port: server_port,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: db_max_connections,
                min_connections: db_min_connections,
                acquire_timeout_seconds: db_acquire_timeout,
            },
            cache: CacheConfig {
                url: redis_url,
                max_connections: cache_max_connections,
                default_ttl_seconds: cache_default_ttl,
            },
            url: UrlConfig {
                default_code_length,
                base_url,
                max_url_length,
                custom_alias_min_length,
                custom_alias_max_length,
            },
            kafka: KafkaConfig {
                bootstrap_servers: kafka_bootstrap_servers,
                topic_hits: kafka_topic_hits,
                consumer_group: kafka_consumer_group,
                consumer_batch_size,
                consumer_max_in_flight,
            },
            admin: AdminConfig {
                api_key: admin_api_key,
                api_key_header: admin_api_key_header,
            },
            scanning: ScanningConfig {
                enabled: scanning_enabled,
                endpoint: scanning_endpoint,
                timeout_seconds: scanning_timeout,
            },
            rate_limit: RateLimitConfig {
                window_seconds: rate_limit_window,
                limit: rate_limit_limit,
            },
            cors: CorsConfig { allowed_origins },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-section configuration values
    pub fn validate(&self) -> AppResult<()> {
        self.url
            .validate()
            .map_err(AppError::Configuration)?;
        self.database
            .validate()
            .map_err(AppError::Configuration)?;
        self.rate_limit
            .validate()
            .map_err(AppError::Configuration)?;
        Ok(())
    }
}

impl UrlConfig {
    /// Validate URL configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.default_code_length < 4 || self.default_code_length > 16 {
            return Err("DEFAULT_CODE_LENGTH must be between 4 and 16".to_string());
        }

        if self.max_url_length == 0 {
            return Err("MAX_URL_LENGTH must be greater than 0".to_string());
        }

        if self.custom_alias_min_length < 3 {
            return Err("CUSTOM_ALIAS_MIN_LENGTH must be at least 3".to_string());
        }

        if self.custom_alias_max_length > 50
            || self.custom_alias_max_length < self.custom_alias_min_length
        {
            return Err(
                "CUSTOM_ALIAS_MAX_LENGTH must be at most 50 and not below the minimum".to_string(),
            );
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate database configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.min_connections > self.max_connections {
            return Err("DB_MIN_CONNECTIONS cannot be greater than DB_MAX_CONNECTIONS".to_string());
        }

        if self.acquire_timeout_seconds == 0 {
            return Err("DB_ACQUIRE_TIMEOUT_SECONDS must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl RateLimitConfig {
    /// Validate rate limiting configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.window_seconds == 0 {
            return Err("RATE_LIMIT_TTL must be greater than 0".to_string());
        }

        if self.limit == 0 {
            return Err("RATE_LIMIT_LIMIT must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 1,
            },
            cache: CacheConfig {
                url: "redis://127.0.0.1".to_string(),
                max_connections: 10,
                default_ttl_seconds: 3600,
            },
            url: UrlConfig {
                default_code_length: 7,
                base_url: "http://localhost:3000".to_string(),
                max_url_length: 2048,
                custom_alias_min_length: 3,
                custom_alias_max_length: 50,
            },
            kafka: KafkaConfig {
                bootstrap_servers: "127.0.0.1:9092".to_string(),
                topic_hits: "url.hits".to_string(),
                consumer_group: "url-hits-analytics".to_string(),
                consumer_batch_size: 100,
                consumer_max_in_flight: 5,
            },
            admin: AdminConfig {
                api_key: "secret".to_string(),
                api_key_header: "X-API-Key".to_string(),
            },
            scanning: ScanningConfig {
                enabled: false,
                endpoint: None,
                timeout_seconds: 2,
            },
            rate_limit: RateLimitConfig {
                window_seconds: 60,
                limit: 60,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_code_length_bounds() {
        let mut config = sample_config();
        config.url.default_code_length = 3;
        assert!(config.validate().is_err());
        config.url.default_code_length = 17;
        assert!(config.validate().is_err());
        config.url.default_code_length = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_alias_bounds() {
        let mut config = sample_config();
        config.url.custom_alias_max_length = 51;
        assert!(config.validate().is_err());
        config.url.custom_alias_max_length = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_window_nonzero() {
        let mut config = sample_config();
        config.rate_limit.window_seconds = 0;
        assert!(config.validate().is_err());
    }
}
