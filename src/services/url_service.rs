//! URL service: orchestrates normalization, allocation, persistence, and
//! cache priming for ingestion, and owns the record invariants.

use crate::cache::Cache;
use crate::config::UrlConfig;
use crate::db::{InsertOutcome, ListParams, Repository, Stats, UniqueField};
use crate::error::{AppError, AppResult};
use crate::metrics::AppMetrics;
use crate::models::{CachedTarget, CreateUrlRequest, CreateUrlResponse, UrlRecord};
use crate::normalizer;
use crate::services::reputation::ReputationChecker;
use crate::services::short_code::CodeAllocator;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Provenance captured at the ingestion boundary.
#[derive(Debug, Clone, Default)]
pub struct CreateContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct UrlService {
    repository: Repository,
    cache: Cache,
    reputation: Arc<dyn ReputationChecker>,
    config: UrlConfig,
    metrics: &'static AppMetrics,
}

impl UrlService {
    pub fn new(
        repository: Repository,
        cache: Cache,
        reputation: Arc<dyn ReputationChecker>,
        config: UrlConfig,
        metrics: &'static AppMetrics,
    ) -> Self {
        Self {
            repository,
            cache,
            reputation,
            config,
            metrics,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Create a short URL, or return the existing record when the same
    /// normalized URL is already registered.
    pub async fn create_short(
        &self,
        request: CreateUrlRequest,
        context: CreateContext,
    ) -> AppResult<CreateUrlResponse> {
        validate_create_input(&request, &self.config)?;

        // Fail-open: only a positive verdict blocks.
        match self.reputation.is_malicious(&request.url).await {
            Ok(true) => return Err(AppError::UrlBlocked),
            Ok(false) => {}
            Err(e) => warn!(url = %request.url, "reputation check failed, allowing: {e}"),
        }

        let normalized = normalizer::normalize(&request.url);

        if let Some(existing) = self.repository.find_by_normalized(&normalized).await? {
            if existing.is_resolvable(Utc::now()) {
                return Ok(self.build_response(&existing, false));
            }
        }

        let mut code = match &request.custom_alias {
            Some(alias) => {
                CodeAllocator::validate_alias(
                    alias,
                    self.config.custom_alias_min_length,
                    self.config.custom_alias_max_length,
                )?;
                if self.repository.code_exists(alias).await? {
                    return Err(AppError::AliasTaken(alias.clone()));
                }
                alias.clone()
            }
            None => {
                CodeAllocator::allocate(self.config.default_code_length, &self.repository).await?
            }
        };

        // One retry on generated-code contention; a second collision in a
        // row means something is wrong beyond bad luck.
        for attempt in 0..2 {
            let now = Utc::now();
            let record = UrlRecord {
                id: Uuid::new_v4(),
                code: code.clone(),
                original: request.url.clone(),
                normalized: normalized.clone(),
                hit_count: 0,
                custom_alias: request.custom_alias.clone(),
                expires_at: request.expires_at,
                created_at: now,
                updated_at: now,
                creator_ip: context.ip.clone(),
                creator_user_agent: context.user_agent.clone(),
                metadata: request.metadata.clone(),
            };

            match self.repository.insert(&record).await? {
                InsertOutcome::Inserted(inserted) => {
                    self.prime_cache(&inserted).await;
                    info!(
                        code = %inserted.code,
                        normalized = %inserted.normalized,
                        custom = inserted.custom_alias.is_some(),
                        "short URL created"
                    );
                    return Ok(self.build_response(&inserted, true));
                }
                InsertOutcome::UniqueViolation(UniqueField::Code) => {
                    if request.custom_alias.is_some() {
                        return Err(AppError::AliasTaken(code));
                    }
                    if attempt == 0 {
                        code = CodeAllocator::allocate(
                            self.config.default_code_length,
                            &self.repository,
                        )
                        .await?;
                        continue;
                    }
                    return Err(AppError::CodeGenerationFailed);
                }
                InsertOutcome::UniqueViolation(UniqueField::Normalized) => {
                    // A concurrent create for the same target won the race.
                    let existing = self
                        .repository
                        .find_by_normalized(&normalized)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(
                                "normalized conflict without a matching record".to_string(),
                            )
                        })?;
                    return Ok(self.build_response(&existing, false));
                }
            }
        }

        Err(AppError::CodeGenerationFailed)
    }

    /// Cache-first lookup for the redirect path. A store hit repopulates
    /// the cache.
    pub async fn resolve(&self, code: &str) -> AppResult<Option<CachedTarget>> {
        if let Some(target) = self.cache.get(code).await? {
            self.metrics.cache_hits_total.inc();
            return Ok(Some(target));
        }
        self.metrics.cache_misses_total.inc();

        let record = match self.repository.find_by_code(code).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        self.prime_cache(&record).await;
        Ok(Some(CachedTarget::from(&record)))
    }

    /// Full record lookup for preview and admin surfaces.
    pub async fn find_record(&self, code: &str) -> AppResult<Option<UrlRecord>> {
        self.repository.find_by_code(code).await
    }

    /// Remove a record and authoritatively invalidate its cache entry.
    /// The invalidation is a synchronous dependency here: its failure
    /// surfaces rather than leaving a stale redirect live.
    pub async fn delete_by_code(&self, code: &str) -> AppResult<bool> {
        let deleted = self.repository.delete(code).await?;
        if deleted {
            self.cache.invalidate(code).await?;
            info!(code, "short URL deleted");
        }
        Ok(deleted)
    }

    pub async fn list(&self, params: &ListParams) -> AppResult<(Vec<UrlRecord>, i64)> {
        self.repository.list(params).await
    }

    pub async fn stats(&self) -> AppResult<Stats> {
        self.repository.get_stats().await
    }

    async fn prime_cache(&self, record: &UrlRecord) {
        if let Err(e) = self.cache.set(&CachedTarget::from(record)).await {
            warn!(code = %record.code, "cache priming failed: {e}");
        }
    }

    fn build_response(&self, record: &UrlRecord, is_new: bool) -> CreateUrlResponse {
        CreateUrlResponse {
            code: record.code.clone(),
            short_url: format!("{}/{}", self.config.base_url, record.code),
            original: record.original.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_new,
        }
    }
}

/// Boundary validation for creation input: length, scheme, and expiry.
/// Alias rules are checked at allocation time against the configured
/// bounds.
fn validate_create_input(request: &CreateUrlRequest, config: &UrlConfig) -> AppResult<()> {
    if request.url.is_empty() {
        return Err(AppError::InvalidUrl("URL must not be empty".to_string()));
    }
    if request.url.len() > config.max_url_length {
        return Err(AppError::UrlTooLong(config.max_url_length));
    }
    if !normalizer::is_supported_scheme(&request.url) {
        return Err(AppError::InvalidUrl(
            "URL must use the http or https scheme".to_string(),
        ));
    }
    if let Some(expires_at) = request.expires_at {
        if expires_at <= Utc::now() {
            return Err(AppError::ExpiryInPast);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> UrlConfig {
        UrlConfig {
            default_code_length: 7,
            base_url: "http://localhost:3000".to_string(),
            max_url_length: 2048,
            custom_alias_min_length: 3,
            custom_alias_max_length: 50,
        }
    }

    fn request(url: &str) -> CreateUrlRequest {
        CreateUrlRequest {
            url: url.to_string(),
            custom_alias: None,
            expires_at: None,
            metadata: None,
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(validate_create_input(&request("https://example.com/page"), &config()).is_ok());
    }

    #[test]
    fn test_overlong_url_rejected() {
        let long = format!("https://example.com/{}", "a".repeat(2048));
        let err = validate_create_input(&request(&long), &config()).unwrap_err();
        assert!(matches!(err, AppError::UrlTooLong(_)));
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        for url in ["ftp://example.com", "javascript:alert(1)", "not a url"] {
            let err = validate_create_input(&request(url), &config()).unwrap_err();
            assert!(matches!(err, AppError::InvalidUrl(_)), "accepted {}", url);
        }
    }

    #[test]
    fn test_past_expiry_rejected() {
        let mut req = request("https://example.com");
        req.expires_at = Some(Utc::now() - Duration::seconds(60));
        let err = validate_create_input(&req, &config()).unwrap_err();
        assert!(matches!(err, AppError::ExpiryInPast));
    }

    #[test]
    fn test_future_expiry_accepted() {
        let mut req = request("https://example.com");
        req.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(validate_create_input(&req, &config()).is_ok());
    }
}
