use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::database::{DateRange, DayBucket, RecordStatus, StatsStore};
use crate::error::Result;

/// Default trailing window for uptime queries
pub const DEFAULT_UPTIME_WINDOW_DAYS: u32 = 365;

/// Folds probe outcomes into day buckets and answers uptime queries
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn StatsStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    /// Record one outcome into the UTC day of `at` and refresh the target's
    /// last-check snapshot, atomically.
    ///
    /// A target deleted before the write is not an error: the outcome is
    /// dropped and `RecordStatus::TargetMissing` is returned.
    pub async fn record_outcome(&self, target_id: Uuid, is_up: bool, at: DateTime<Utc>) -> Result<RecordStatus> {
        let date = at.date_naive();
        let status = self.store.record_outcome(target_id, date, is_up, at).await?;

        match &status {
            RecordStatus::Recorded(bucket) => debug!(
                %target_id, %date, is_up, checks = bucket.checks, up = bucket.up,
                "Recorded probe outcome"
            ),
            RecordStatus::TargetMissing => {
                debug!(%target_id, is_up, "Target removed before its outcome was recorded, dropping it")
            }
        }

        Ok(status)
    }

    /// Percentage of successful probes over the `window_days` days before
    /// `as_of` (plus that day), or `None` when nothing was recorded.
    pub async fn query_uptime(&self, target_id: Uuid, window_days: u32, as_of: DateTime<Utc>) -> Result<Option<f64>> {
        let buckets = self.daily_history(target_id, window_days, as_of).await?;
        Ok(uptime_percent(&buckets))
    }

    /// Day buckets in the trailing window, oldest first
    pub async fn daily_history(&self, target_id: Uuid, days: u32, as_of: DateTime<Utc>) -> Result<Vec<DayBucket>> {
        let range = DateRange::trailing(as_of.date_naive(), days);
        self.store.query_day_buckets(target_id, range).await
    }
}

/// `100 * up / checks` over all buckets; `None` when there are no checks
pub fn uptime_percent(buckets: &[DayBucket]) -> Option<f64> {
    let (checks, up) = buckets
        .iter()
        .fold((0u64, 0u64), |(checks, up), bucket| (checks + bucket.checks, up + bucket.up));

    if checks == 0 {
        return None;
    }

    Some(100.0 * up as f64 / checks as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_store, date, test_target};
    use chrono::TimeDelta;

    fn bucket(checks: u64, up: u64) -> DayBucket {
        DayBucket { target_id: Uuid::nil(), date: date("2025-01-01"), checks, up, down: checks - up }
    }

    #[test]
    fn test_uptime_percent_single_bucket() {
        assert_eq!(uptime_percent(&[bucket(10, 7)]), Some(70.0));
    }

    #[test]
    fn test_uptime_percent_absent_cases() {
        assert_eq!(uptime_percent(&[]), None);
        assert_eq!(uptime_percent(&[bucket(0, 0)]), None);
    }

    #[test]
    fn test_uptime_percent_keeps_full_precision() {
        let value = uptime_percent(&[bucket(3, 1), bucket(0, 0)]).unwrap();
        assert!((value - 100.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_record_outcome_is_additive() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let target = test_target("site", "https://site.example.com/", 5);
        store.upsert_target(&target).await?;
        let aggregator = Aggregator::new(store.clone());

        let start = date("2025-05-20").and_hms_opt(0, 0, 1).unwrap().and_utc();
        let outcomes = [true, true, false, true, false];
        for (i, is_up) in outcomes.iter().enumerate() {
            aggregator.record_outcome(target.id, *is_up, start + TimeDelta::hours(i as i64)).await?;
        }

        let bucket = store.get_day_bucket(target.id, start.date_naive()).await?.expect("bucket");
        assert_eq!(bucket.checks, outcomes.len() as u64);
        assert_eq!(bucket.up, 3);
        assert_eq!(bucket.down, 2);
        assert_eq!(bucket.up + bucket.down, bucket.checks);

        let last = store.get_target(target.id).await?.and_then(|t| t.last_check).expect("snapshot");
        assert_eq!(last.at, start + TimeDelta::hours(4));
        assert!(!last.is_up);
        Ok(())
    }

    #[tokio::test]
    async fn test_outcomes_split_on_utc_midnight() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let target = test_target("site", "https://site.example.com/", 5);
        store.upsert_target(&target).await?;
        let aggregator = Aggregator::new(store.clone());

        let before = date("2025-05-20").and_hms_opt(23, 59, 59).unwrap().and_utc();
        aggregator.record_outcome(target.id, true, before).await?;
        aggregator.record_outcome(target.id, false, before + TimeDelta::seconds(2)).await?;

        assert_eq!(store.get_day_bucket(target.id, date("2025-05-20")).await?.map(|b| b.up), Some(1));
        assert_eq!(store.get_day_bucket(target.id, date("2025-05-21")).await?.map(|b| b.down), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_query_uptime_respects_window() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let target = test_target("site", "https://site.example.com/", 5);
        store.upsert_target(&target).await?;
        let aggregator = Aggregator::new(store.clone());
        let as_of = date("2025-03-01").and_hms_opt(12, 0, 0).unwrap().and_utc();

        assert_eq!(aggregator.query_uptime(target.id, DEFAULT_UPTIME_WINDOW_DAYS, as_of).await?, None);

        // Outside the 365-day window: all down, must not count.
        for _ in 0..5 {
            aggregator.record_outcome(target.id, false, as_of - TimeDelta::days(400)).await?;
        }
        assert_eq!(aggregator.query_uptime(target.id, DEFAULT_UPTIME_WINDOW_DAYS, as_of).await?, None);

        for is_up in [true, true, true, true, true, true, true, false, false, false] {
            aggregator.record_outcome(target.id, is_up, as_of - TimeDelta::days(3)).await?;
        }
        assert_eq!(aggregator.query_uptime(target.id, DEFAULT_UPTIME_WINDOW_DAYS, as_of).await?, Some(70.0));

        // A one-day window no longer sees the outcomes from three days ago.
        assert_eq!(aggregator.query_uptime(target.id, 1, as_of).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_outcome_for_removed_target_is_dropped() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let target = test_target("site", "https://site.example.com/", 5);
        store.upsert_target(&target).await?;
        store.delete_target(target.id).await?;
        let aggregator = Aggregator::new(store.clone());

        let status = aggregator.record_outcome(target.id, true, Utc::now()).await?;

        assert_eq!(status, RecordStatus::TargetMissing);
        assert!(aggregator.daily_history(target.id, 30, Utc::now()).await?.is_empty());
        Ok(())
    }
}
