//! Analytics query layer: reconstructs per-code dashboards from the
//! counter tables.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::store::{
    truncate_to_day, truncate_to_hour, truncate_to_minute, AnalyticsStore,
};

/// Default window when the caller gives no range.
const DEFAULT_RANGE_DAYS: i64 = 7;
/// Default size of the top-N rankings.
pub const DEFAULT_TOP_LIMIT: usize = 10;
/// Ceiling on materialized zero-filled buckets per response.
const MAX_BUCKETS: i64 = 20_160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub fn step(self) -> Duration {
        match self {
            Granularity::Minute => Duration::minutes(1),
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
        }
    }

    pub fn truncate(self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Minute => truncate_to_minute(at),
            Granularity::Hour => truncate_to_hour(at),
            Granularity::Day => truncate_to_day(at),
        }
    }
}

/// One bucket of the time series, ascending by bucket start.
#[derive(Debug, Clone, Serialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub hits: i64,
}

/// One ranked dimension entry with its share of the dimension total.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    pub name: String,
    pub hits: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTimesView {
    pub first_accessed: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_hits: i64,
    pub unique_visitors: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub code: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub granularity: Granularity,
    pub time_series: Vec<TimePoint>,
    pub top_referrers: Vec<RankedEntry>,
    pub geographic: Vec<RankedEntry>,
    pub devices: Vec<RankedEntry>,
    pub browsers: Vec<RankedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_times: Option<AccessTimesView>,
    pub totals: Totals,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub code: String,
    pub total_hits: i64,
    pub unique_visitors: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_accessed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_country: Option<String>,
}

#[derive(Clone)]
pub struct AnalyticsQuery {
    store: AnalyticsStore,
}

impl AnalyticsQuery {
    pub fn new(store: AnalyticsStore) -> Self {
        Self { store }
    }

    /// Drop all analytics rows for a code after its record is deleted.
    pub async fn purge_code(&self, code: &str) -> AppResult<()> {
        self.store.purge_code(code).await
    }

    /// Resolve the requested range, defaulting to the trailing week.
    pub fn resolve_range(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_RANGE_DAYS));
        if end < start {
            return Err(AppError::Validation(
                "endDate must be on or after startDate".to_string(),
            ));
        }
        Ok((start, end))
    }

    pub async fn get_analytics(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        top_limit: usize,
    ) -> AppResult<AnalyticsResponse> {
        let time_series = self.time_series(code, start, end, granularity).await?;

        let referrers = self.store.referrers(code).await?;
        let geographic = self.store.geographic(code).await?;
        let device_rows = self.store.devices(code).await?;

        let mut by_device: HashMap<String, i64> = HashMap::new();
        let mut by_browser: HashMap<String, i64> = HashMap::new();
        for row in &device_rows {
            *by_device.entry(row.device_type.clone()).or_insert(0) += row.hits;
            *by_browser.entry(row.browser.clone()).or_insert(0) += row.hits;
        }

        let access_times = self.store.access_times(code).await?.map(|at| AccessTimesView {
            first_accessed: at.first_at,
            last_accessed: at.last_at,
        });

        let totals = Totals {
            total_hits: self.store.sum_hits(code, start, end).await?,
            unique_visitors: self.store.unique_visitors(code, start, end).await?,
        };

        Ok(AnalyticsResponse {
            code: code.to_string(),
            start_date: start,
            end_date: end,
            granularity,
            time_series,
            top_referrers: rank(referrers, top_limit),
            geographic: rank(geographic, top_limit),
            devices: rank(by_device.into_iter().collect(), top_limit),
            browsers: rank(by_browser.into_iter().collect(), top_limit),
            access_times,
            totals,
        })
    }

    pub async fn get_summary(&self, code: &str) -> AppResult<SummaryResponse> {
        let (start, end) = Self::resolve_range(None, None)?;
        let access = self.store.access_times(code).await?;
        let top_referrer = self
            .store
            .referrers(code)
            .await?
            .into_iter()
            .next()
            .map(|(name, _)| name);
        let top_country = self
            .store
            .geographic(code)
            .await?
            .into_iter()
            .next()
            .map(|(name, _)| name);

        Ok(SummaryResponse {
            code: code.to_string(),
            total_hits: self.store.sum_hits(code, start, end).await?,
            unique_visitors: self.store.unique_visitors(code, start, end).await?,
            first_accessed: access.map(|a| a.first_at),
            last_accessed: access.map(|a| a.last_at),
            top_referrer,
            top_country,
        })
    }

    /// Bucketed hit counts with zero-filled empty slots, ascending.
    pub async fn time_series(
        &self,
        code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> AppResult<Vec<TimePoint>> {
        let step = granularity.step();
        let first_bucket = granularity.truncate(start);
        let bucket_count = (end - first_bucket).num_seconds() / step.num_seconds() + 1;
        if bucket_count > MAX_BUCKETS {
            return Err(AppError::Validation(format!(
                "range too large for {:?} granularity",
                granularity
            )));
        }

        let raw = match granularity {
            Granularity::Minute => self.store.hits_by_minute_range(code, start, end).await?,
            Granularity::Hour => self.store.hits_by_hour_range(code, start, end).await?,
            // Day buckets aggregate the hour table.
            Granularity::Day => self.store.hits_by_hour_range(code, start, end).await?,
        };

        let mut by_bucket: HashMap<DateTime<Utc>, i64> = HashMap::new();
        for (at, hits) in raw {
            *by_bucket.entry(granularity.truncate(at)).or_insert(0) += hits;
        }

        let mut series = Vec::with_capacity(bucket_count as usize);
        let mut bucket = first_bucket;
        while bucket <= end {
            series.push(TimePoint {
                timestamp: bucket,
                hits: by_bucket.get(&bucket).copied().unwrap_or(0),
            });
            bucket += step;
        }

        Ok(series)
    }
}

/// Sort descending, take the top N, and attach each entry's share of the
/// dimension total (not just the share of the retained rows).
fn rank(entries: Vec<(String, i64)>, limit: usize) -> Vec<RankedEntry> {
    let total: i64 = entries.iter().map(|(_, hits)| *hits).sum();
    let mut sorted = entries;
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .take(limit)
        .map(|(name, hits)| RankedEntry {
            name,
            hits,
            percentage: if total > 0 {
                (hits as f64 * 10_000.0 / total as f64).round() / 100.0
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rank_orders_and_percentages() {
        let ranked = rank(
            vec![
                ("google.com".to_string(), 30),
                ("news.ycombinator.com".to_string(), 60),
                ("bing.com".to_string(), 10),
            ],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "news.ycombinator.com");
        assert_eq!(ranked[0].percentage, 60.0);
        assert_eq!(ranked[1].name, "google.com");
        assert_eq!(ranked[1].percentage, 30.0);
    }

    #[test]
    fn test_rank_empty_is_empty() {
        assert!(rank(Vec::new(), 10).is_empty());
    }

    #[test]
    fn test_rank_percentage_uses_dimension_total() {
        // Entries dropped by the limit still count toward the total.
        let ranked = rank(
            vec![
                ("a".to_string(), 50),
                ("b".to_string(), 25),
                ("c".to_string(), 25),
            ],
            1,
        );
        assert_eq!(ranked[0].percentage, 50.0);
    }

    #[test]
    fn test_granularity_truncation() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 56).unwrap();
        assert_eq!(
            Granularity::Hour.truncate(at),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Granularity::Day.truncate(at),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_range_rejects_inverted() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(AnalyticsQuery::resolve_range(Some(start), Some(end)).is_err());
    }

    #[test]
    fn test_resolve_range_defaults_to_a_week() {
        let (start, end) = AnalyticsQuery::resolve_range(None, None).unwrap();
        assert_eq!((end - start).num_days(), DEFAULT_RANGE_DAYS);
    }
}
