use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::monitoring::types::MonitorStatus;

/// Format of the `date` column and of the date half of a bucket id.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Target model - a monitored address with its check cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    /// Canonical absolute URL, as produced by the address resolver.
    pub url: String,
    pub interval_minutes: u32,
    /// Snapshot of the most recent recorded probe; `None` until the first one.
    pub last_check: Option<LastCheck>,
}

/// Time and outcome of the last recorded probe. Kept as one value so the
/// timestamp and the outcome can only ever be present together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCheck {
    pub at: DateTime<Utc>,
    pub is_up: bool,
}

impl Target {
    /// Create a new, never-probed target
    pub fn new(name: impl Into<String>, url: &Url, interval_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.to_string(),
            interval_minutes,
            last_check: None,
        }
    }

    pub fn interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.interval_minutes))
    }

    /// Whether the configured interval has fully elapsed since the last check.
    /// A never-checked target is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now.signed_duration_since(last.at) >= self.interval(),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        match self.last_check {
            None => MonitorStatus::Unknown,
            Some(LastCheck { is_up: true, .. }) => MonitorStatus::Up,
            Some(LastCheck { is_up: false, .. }) => MonitorStatus::Down,
        }
    }

    /// Convert a stored Unix millisecond timestamp back into a `DateTime`
    pub fn millis_to_timestamp(millis: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
    }
}

/// Per-day probe counters for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub target_id: Uuid,
    pub date: NaiveDate,
    pub checks: u64,
    pub up: u64,
    pub down: u64,
}

impl DayBucket {
    /// Bucket holding a single outcome, created on the first probe of a day
    pub fn first(target_id: Uuid, date: NaiveDate, is_up: bool) -> Self {
        let mut bucket = Self { target_id, date, checks: 0, up: 0, down: 0 };
        bucket.absorb(is_up);
        bucket
    }

    /// Fold one more outcome into the counters
    pub fn absorb(&mut self, is_up: bool) {
        self.checks += 1;
        if is_up {
            self.up += 1;
        } else {
            self.down += 1;
        }
    }

    /// Persisted primary key: `{target_id}:{date}`
    pub fn key(&self) -> String {
        bucket_key(self.target_id, self.date)
    }
}

pub fn bucket_key(target_id: Uuid, date: NaiveDate) -> String {
    format!("{}:{}", target_id, date.format(DATE_FORMAT))
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// The `days` days before `to`, plus `to` itself.
    pub fn trailing(to: NaiveDate, days: u32) -> Self {
        let from = to.checked_sub_days(chrono::Days::new(u64::from(days))).unwrap_or(NaiveDate::MIN);
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// What a transactional outcome write ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// The bucket after the write
    Recorded(DayBucket),
    /// The target row was gone when the transaction ran; nothing was written
    TargetMissing,
}
