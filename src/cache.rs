use crate::error::{AppError, AppResult};
use crate::models::CachedTarget;
use deadpool_redis::{redis::AsyncCommands, Manager, Pool, Runtime};
use std::time::Duration;

/// Redirect cache: low-latency code to target lookups with TTL.
#[derive(Clone)]
pub struct Cache {
    pool: Pool,
    default_ttl: Duration,
}

impl Cache {
    /// Create a new cache connection pool
    pub async fn new(
        redis_url: &str,
        max_connections: u32,
        default_ttl_seconds: u64,
    ) -> AppResult<Self> {
        let manager = Manager::new(redis_url)
            .map_err(|e| AppError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let pool = Pool::builder(manager)
            .max_size(max_connections as usize)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create Redis pool: {}", e)))?;

        Ok(Self {
            pool,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> AppResult<String> {
        let mut conn = self.pool.get().await?;
        let response: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(response)
    }

    /// Get a cached target by short code.
    /// Returns None if the cache fails or the entry is absent.
    pub async fn get(&self, code: &str) -> AppResult<Option<CachedTarget>> {
        let key = Self::target_key(code);

        // A failed connection is treated as a miss, never a request failure.
        let mut conn = match self.pool.get().await {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };

        let value: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        match value {
            Some(v) => match serde_json::from_str::<CachedTarget>(&v) {
                Ok(target) => Ok(Some(target)),
                // A malformed entry is dropped rather than surfaced.
                Err(_) => {
                    let _: Result<(), _> = conn.del(&key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Cache a target with the default TTL
    pub async fn set(&self, target: &CachedTarget) -> AppResult<()> {
        self.set_with_ttl(target, self.default_ttl).await
    }

    /// Cache a target with an explicit TTL
    pub async fn set_with_ttl(&self, target: &CachedTarget, ttl: Duration) -> AppResult<()> {
        let key = Self::target_key(&target.code);
        let value = serde_json::to_string(target)?;
        let mut conn = self.pool.get().await?;

        let _: () = conn.set_ex(&key, value, ttl.as_secs()).await?;

        Ok(())
    }

    /// Remove a target from the cache. Authoritative on admin delete, so
    /// errors propagate instead of degrading.
    pub async fn invalidate(&self, code: &str) -> AppResult<()> {
        let key = Self::target_key(code);
        let mut conn = self.pool.get().await?;

        let _: () = conn.del(&key).await?;

        Ok(())
    }

    /// Counted rate-limit primitive: increments the per-key counter and
    /// starts the window on first touch. Returns the count within the
    /// current window.
    pub async fn incr_rate_limit(&self, key: &str, window: Duration) -> AppResult<u64> {
        let counter_key = format!("{}:{}", Self::RATE_PREFIX, key);
        let mut conn = self.pool.get().await?;

        let count: u64 = conn.incr(&counter_key, 1u64).await?;
        if count == 1 {
            let _: () = conn.expire(&counter_key, window.as_secs() as i64).await?;
        }

        Ok(count)
    }

    /// Generate the cache key for a short code
    fn target_key(code: &str) -> String {
        format!("{}:{}", Self::KEY_PREFIX, code)
    }

    const KEY_PREFIX: &'static str = "url";
    const RATE_PREFIX: &'static str = "rl";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_generation() {
        assert_eq!(Cache::target_key("abc123"), "url:abc123");
        assert_eq!(Cache::target_key("my-link"), "url:my-link");
    }
}
