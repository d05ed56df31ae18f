use crate::error::{AppError, AppResult};
use crate::models::{SortKey, SortOrder, StatusFilter, UrlRecord};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    ConnectOptions, PgPool, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;

/// Unique constraints enforced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Code,
    Normalized,
}

/// Outcome of an insert attempt.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(UrlRecord),
    UniqueViolation(UniqueField),
}

/// Filter, sort, and page parameters for the list operation.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub search: Option<String>,
    pub status: StatusFilter,
    pub sort: SortKey,
    pub order: SortOrder,
    pub offset: i64,
    pub limit: i64,
}

/// Database repository
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Create a new repository with a connection pool
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout_seconds: u64,
    ) -> AppResult<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Configuration(format!("Invalid database URL: {}", e)))?
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_seconds))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create a repository whose pool connects on first use rather than
    /// at startup. Acquisition failures then surface per-query instead of
    /// failing construction.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout_seconds: u64,
    ) -> AppResult<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Configuration(format!("Invalid database URL: {}", e)))?
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_seconds))
            .connect_lazy_with(options);

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Configuration(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Verify connectivity by acquiring a connection.
    pub async fn ping(&self) -> AppResult<()> {
        let _conn = self.pool.acquire().await?;
        Ok(())
    }

    /// The pool backing this repository; shared with the analytics store.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a record. Unique-constraint enforcement on `code` and
    /// `normalized` lives here, not in the application.
    pub async fn insert(&self, record: &UrlRecord) -> AppResult<InsertOutcome> {
        let result = sqlx::query_as::<_, UrlRecord>(
            r#"
            INSERT INTO urls
                (id, code, original, normalized, hit_count, custom_alias,
                 expires_at, created_at, updated_at, creator_ip,
                 creator_user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(&record.code)
        .bind(&record.original)
        .bind(&record.normalized)
        .bind(record.hit_count)
        .bind(&record.custom_alias)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.creator_ip)
        .bind(&record.creator_user_agent)
        .bind(&record.metadata)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(inserted) => Ok(InsertOutcome::Inserted(inserted)),
            Err(e) => match Self::unique_violation(&e) {
                Some(field) => Ok(InsertOutcome::UniqueViolation(field)),
                None => Err(e.into()),
            },
        }
    }

    /// Get a record by short code
    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<UrlRecord>> {
        let result = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT * FROM urls
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    /// Get a record by its normalized URL
    pub async fn find_by_normalized(&self, normalized: &str) -> AppResult<Option<UrlRecord>> {
        let result = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT * FROM urls
            WHERE normalized = $1
            "#,
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    /// Check if a short code exists
    pub async fn code_exists(&self, code: &str) -> AppResult<bool> {
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM urls WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(result > 0)
    }

    /// Delete a record by short code
    pub async fn delete(&self, code: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM urls WHERE code = $1
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Best-effort commutative hit counter update. Returns the refreshed
    /// record so callers can re-prime the cache snapshot.
    pub async fn increment_hit_count(
        &self,
        code: &str,
        delta: i64,
    ) -> AppResult<Option<UrlRecord>> {
        let result = sqlx::query_as::<_, UrlRecord>(
            r#"
            UPDATE urls
            SET hit_count = hit_count + $1,
                updated_at = now()
            WHERE code = $2
            RETURNING *
            "#,
        )
        .bind(delta)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    /// List records with search, status filter, sort, and pagination.
    /// Returns the page and the total count under the same filter.
    pub async fn list(&self, params: &ListParams) -> AppResult<(Vec<UrlRecord>, i64)> {
        let mut query = QueryBuilder::new("SELECT * FROM urls WHERE 1=1");
        Self::push_filters(&mut query, params);
        // Sort column and direction come from closed enums, never user text.
        query.push(format!(
            " ORDER BY {} {}",
            params.sort.column(),
            params.order.keyword()
        ));
        query.push(" LIMIT ");
        query.push_bind(params.limit);
        query.push(" OFFSET ");
        query.push_bind(params.offset);

        let rows = query
            .build_query_as::<UrlRecord>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM urls WHERE 1=1");
        Self::push_filters(&mut count_query, params);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    fn push_filters(query: &mut QueryBuilder<'_, sqlx::Postgres>, params: &ListParams) {
        if let Some(search) = &params.search {
            let pattern = format!("%{}%", search);
            query.push(" AND (original ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR code ILIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
        match params.status {
            StatusFilter::All => {}
            StatusFilter::Active => {
                query.push(" AND (expires_at IS NULL OR expires_at > now())");
            }
            StatusFilter::Expired => {
                query.push(" AND expires_at IS NOT NULL AND expires_at <= now()");
            }
        }
    }

    /// Get statistics. Expired counts only records whose expiry has
    /// actually passed; active is everything else.
    pub async fn get_stats(&self) -> AppResult<Stats> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= now()) as expired
            FROM urls
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            total: row.0,
            active: row.0 - row.1,
            expired: row.1,
        })
    }

    /// Delete all expired records (admin maintenance)
    pub async fn delete_expired(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM urls WHERE expires_at IS NOT NULL AND expires_at <= now()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    fn unique_violation(err: &sqlx::Error) -> Option<UniqueField> {
        if let sqlx::Error::Database(db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return match db_err.constraint() {
                    Some("urls_code_key") => Some(UniqueField::Code),
                    Some("urls_normalized_key") => Some(UniqueField::Normalized),
                    _ => None,
                };
            }
        }
        None
    }
}

/// Statistics struct
#[derive(Debug)]
pub struct Stats {
    pub total: i64,
    pub active: i64,
    pub expired: i64,
}

/// Clone implementation for Repository
impl Clone for Repository {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_active_is_total_minus_expired() {
        let stats = Stats {
            total: 100,
            active: 80,
            expired: 20,
        };

        assert_eq!(stats.total, stats.active + stats.expired);
    }

    #[test]
    fn test_list_params_defaults_are_well_formed() {
        let params = ListParams {
            search: None,
            status: StatusFilter::All,
            sort: SortKey::CreatedAt,
            order: SortOrder::Desc,
            offset: 0,
            limit: 20,
        };
        assert_eq!(params.sort.column(), "created_at");
        assert_eq!(params.order.keyword(), "DESC");
    }
}
