//! External URL reputation probe.
//!
//! The check is fail-open: only a positive malicious verdict blocks
//! ingestion, and a probe failure is logged and treated as clean.

use crate::config::ScanningConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ReputationChecker: Send + Sync {
    /// True when the service positively flags the URL as malicious.
    async fn is_malicious(&self, url: &str) -> AppResult<bool>;
}

/// Used when scanning is disabled; every URL passes.
pub struct DisabledReputationChecker;

#[async_trait]
impl ReputationChecker for DisabledReputationChecker {
    async fn is_malicious(&self, _url: &str) -> AppResult<bool> {
        Ok(false)
    }
}

#[derive(Debug, Deserialize)]
struct ScanVerdict {
    malicious: bool,
}

/// Probes a scanning endpoint over HTTP.
pub struct HttpReputationChecker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReputationChecker {
    pub fn new(endpoint: String, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("reputation client: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ReputationChecker for HttpReputationChecker {
    async fn is_malicious(&self, url: &str) -> AppResult<bool> {
        let verdict: ScanVerdict = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("reputation probe failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("reputation probe failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("reputation verdict unreadable: {}", e)))?;
        Ok(verdict.malicious)
    }
}

/// Build the checker matching the scanning configuration.
pub fn from_config(config: &ScanningConfig) -> AppResult<Arc<dyn ReputationChecker>> {
    match (&config.enabled, &config.endpoint) {
        (true, Some(endpoint)) => Ok(Arc::new(HttpReputationChecker::new(
            endpoint.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?)),
        (true, None) => {
            tracing::warn!("URL scanning enabled but no endpoint configured; disabling");
            Ok(Arc::new(DisabledReputationChecker))
        }
        (false, _) => Ok(Arc::new(DisabledReputationChecker)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_checker_always_passes() {
        let checker = DisabledReputationChecker;
        assert!(!checker.is_malicious("https://example.com").await.unwrap());
    }

    #[test]
    fn test_from_config_without_endpoint_degrades() {
        let config = ScanningConfig {
            enabled: true,
            endpoint: None,
            timeout_seconds: 2,
        };
        assert!(from_config(&config).is_ok());
    }
}
