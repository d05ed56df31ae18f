//! Analytics store adapter: counter tables with per-code partitioning.
//!
//! Counters are bumped with upserts whose increments commute, so retried
//! and reordered applies converge on the same totals. The unique-visitor
//! set is idempotent by construction and corrects duplicate deliveries
//! for uniqueness only.

use crate::error::AppResult;
use crate::models::HitEvent;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

/// Referrer value recorded when the hit had no referrer worth counting.
const DIRECT_REFERRER: &str = "direct";

/// Fill-in for device dimensions the parser could not classify.
const UNKNOWN: &str = "unknown";

/// Minute-level rows live this long before the sweep removes them.
pub const MINUTE_TTL_DAYS: i64 = 30;
/// Unique-visitor rows live this long before the sweep removes them.
pub const VISITOR_TTL_DAYS: i64 = 90;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub hits: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AccessTimes {
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

/// Wide-column-style counter store on Postgres.
#[derive(Clone)]
pub struct AnalyticsStore {
    pool: PgPool,
}

impl AnalyticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// First 16 hex chars of SHA-256 over "{ip}:{userAgent}".
    /// Deliberately not a reversible PII token.
    pub fn visitor_hash(ip: &str, user_agent: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", ip, user_agent).as_bytes());
        hex::encode(&digest[..8])
    }

    /// Apply one hit event as an atomic batch of counter increments.
    ///
    /// Covers the hour and minute series, referrers (when present and not
    /// direct), geography (when the country is known), devices with
    /// unknown fill-ins, first/last access times, and the unique-visitor
    /// set. Safe to retry: every statement commutes or is idempotent.
    pub async fn apply_hit(&self, event: &HitEvent) -> AppResult<()> {
        let day = event.timestamp.date_naive();
        let hour = event.timestamp.hour() as i16;
        let minute = event.timestamp.minute() as i16;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO hits_by_hour (code, day, hour, hits)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (code, day, hour)
            DO UPDATE SET hits = hits_by_hour.hits + 1
            "#,
        )
        .bind(&event.code)
        .bind(day)
        .bind(hour)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO hits_by_minute (code, day, hour, minute, hits)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (code, day, hour, minute)
            DO UPDATE SET hits = hits_by_minute.hits + 1
            "#,
        )
        .bind(&event.code)
        .bind(day)
        .bind(hour)
        .bind(minute)
        .execute(&mut *tx)
        .await?;

        if let Some(referrer) = event
            .referrer
            .as_deref()
            .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case(DIRECT_REFERRER))
        {
            sqlx::query(
                r#"
                INSERT INTO referrers (code, referrer, hits)
                VALUES ($1, $2, 1)
                ON CONFLICT (code, referrer)
                DO UPDATE SET hits = referrers.hits + 1
                "#,
            )
            .bind(&event.code)
            .bind(referrer)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(country) = event.country.as_deref().filter(|c| !c.is_empty()) {
            sqlx::query(
                r#"
                INSERT INTO geographic (code, country, hits)
                VALUES ($1, $2, 1)
                ON CONFLICT (code, country)
                DO UPDATE SET hits = geographic.hits + 1
                "#,
            )
            .bind(&event.code)
            .bind(country)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO devices (code, device_type, browser, os, hits)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (code, device_type, browser, os)
            DO UPDATE SET hits = devices.hits + 1
            "#,
        )
        .bind(&event.code)
        .bind(event.device_type.as_deref().unwrap_or(UNKNOWN))
        .bind(event.browser.as_deref().unwrap_or(UNKNOWN))
        .bind(event.os.as_deref().unwrap_or(UNKNOWN))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO access_times (code, first_at, last_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (code)
            DO UPDATE SET first_at = LEAST(access_times.first_at, excluded.first_at),
                          last_at = GREATEST(access_times.last_at, excluded.last_at)
            "#,
        )
        .bind(&event.code)
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO unique_visitors (code, day, visitor_hash, seen_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code, day, visitor_hash) DO NOTHING
            "#,
        )
        .bind(&event.code)
        .bind(day)
        .bind(Self::visitor_hash(&event.ip, &event.user_agent))
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Hour-resolution hit counts within [start, end].
    pub async fn hits_by_hour_range(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<(DateTime<Utc>, i64)>> {
        let rows = sqlx::query_as::<_, (NaiveDate, i16, i64)>(
            r#"
            SELECT day, hour, hits FROM hits_by_hour
            WHERE code = $1
              AND day >= $2 AND day <= $3
            ORDER BY day, hour
            "#,
        )
        .bind(code)
        .bind(start.date_naive())
        .bind(end.date_naive())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(day, hour, hits)| {
                bucket_instant(day, hour as u32, 0).map(|at| (at, hits))
            })
            .filter(|(at, _)| *at >= truncate_to_hour(start) && *at <= end)
            .collect())
    }

    /// Minute-resolution hit counts within [start, end].
    pub async fn hits_by_minute_range(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<(DateTime<Utc>, i64)>> {
        let rows = sqlx::query_as::<_, (NaiveDate, i16, i16, i64)>(
            r#"
            SELECT day, hour, minute, hits FROM hits_by_minute
            WHERE code = $1
              AND day >= $2 AND day <= $3
            ORDER BY day, hour, minute
            "#,
        )
        .bind(code)
        .bind(start.date_naive())
        .bind(end.date_naive())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(day, hour, minute, hits)| {
                bucket_instant(day, hour as u32, minute as u32).map(|at| (at, hits))
            })
            .filter(|(at, _)| *at >= truncate_to_minute(start) && *at <= end)
            .collect())
    }

    /// All referrer counters for a code, highest first.
    pub async fn referrers(&self, code: &str) -> AppResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT referrer, hits FROM referrers
            WHERE code = $1
            ORDER BY hits DESC, referrer
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All country counters for a code, highest first.
    pub async fn geographic(&self, code: &str) -> AppResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT country, hits FROM geographic
            WHERE code = $1
            ORDER BY hits DESC, country
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All device counters for a code.
    pub async fn devices(&self, code: &str) -> AppResult<Vec<DeviceRow>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_type, browser, os, hits FROM devices
            WHERE code = $1
            ORDER BY hits DESC
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// First and last observed access for a code.
    pub async fn access_times(&self, code: &str) -> AppResult<Option<AccessTimes>> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT first_at, last_at FROM access_times WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(first_at, last_at)| AccessTimes { first_at, last_at }))
    }

    /// Total hits within [start, end] from the hour table.
    pub async fn sum_hits(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<i64> {
        let buckets = self.hits_by_hour_range(code, start, end).await?;
        Ok(buckets.into_iter().map(|(_, hits)| hits).sum())
    }

    /// Approximate unique visitors within [start, end].
    pub async fn unique_visitors(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT visitor_hash) FROM unique_visitors
            WHERE code = $1 AND day >= $2 AND day <= $3
            "#,
        )
        .bind(code)
        .bind(start.date_naive())
        .bind(end.date_naive())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Drop all analytics rows for a code (admin delete).
    pub async fn purge_code(&self, code: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "hits_by_hour",
            "hits_by_minute",
            "referrers",
            "geographic",
            "devices",
            "access_times",
            "unique_visitors",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE code = $1", table))
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Enforce the column-family TTLs: 30 days for minute rows, 90 days
    /// for unique-visitor rows. Returns (minute_rows, visitor_rows) swept.
    pub async fn sweep_expired(&self) -> AppResult<(u64, u64)> {
        let minute_cutoff = (Utc::now() - chrono::Duration::days(MINUTE_TTL_DAYS)).date_naive();
        let visitor_cutoff = (Utc::now() - chrono::Duration::days(VISITOR_TTL_DAYS)).date_naive();

        let minutes = sqlx::query("DELETE FROM hits_by_minute WHERE day < $1")
            .bind(minute_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let visitors = sqlx::query("DELETE FROM unique_visitors WHERE day < $1")
            .bind(visitor_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok((minutes, visitors))
    }
}

fn bucket_instant(day: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    day.and_hms_opt(hour, minute, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

pub fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(at.hour(), 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(at)
}

pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(at.hour(), at.minute(), 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(at)
}

pub fn truncate_to_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_visitor_hash_is_16_hex_chars() {
        let hash = AnalyticsStore::visitor_hash("203.0.113.9", "Mozilla/5.0");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_visitor_hash_is_deterministic() {
        let a = AnalyticsStore::visitor_hash("203.0.113.9", "Mozilla/5.0");
        let b = AnalyticsStore::visitor_hash("203.0.113.9", "Mozilla/5.0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_visitor_hash_differs_across_inputs() {
        let a = AnalyticsStore::visitor_hash("203.0.113.9", "Mozilla/5.0");
        let b = AnalyticsStore::visitor_hash("203.0.113.10", "Mozilla/5.0");
        let c = AnalyticsStore::visitor_hash("203.0.113.9", "curl/8.0");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truncation_helpers() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 56).unwrap();
        assert_eq!(
            truncate_to_hour(at),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            truncate_to_minute(at),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 0).unwrap()
        );
        assert_eq!(
            truncate_to_day(at),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
