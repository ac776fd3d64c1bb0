use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Row, TransactionBehavior, params};
use uuid::Uuid;

use super::models::{DATE_FORMAT, DateRange, DayBucket, LastCheck, RecordStatus, Target, bucket_key};
use crate::error::{Error, Result};
use crate::pool::{LibsqlManager, LibsqlPool};

const TARGET_COLUMNS: &str = "id, name, url, interval_minutes, last_check_at, last_check_is_up";
const BUCKET_COLUMNS: &str = "target_id, date, checks, up, down";

/// Storage for targets and day buckets.
///
/// Every multi-row mutation runs in a single transaction, so readers never
/// observe a target without its buckets being gone too, or a bucket whose
/// `checks` moved without `up`/`down`.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// All targets, oldest registration first
    async fn get_all_targets(&self) -> Result<Vec<Target>>;

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>>;

    /// Insert a target, or update the user-editable fields (name, url,
    /// interval) of an existing one. The last-check snapshot is owned by
    /// [`StatsStore::record_outcome`] and is never overwritten here.
    async fn upsert_target(&self, target: &Target) -> Result<()>;

    /// Delete a target and all of its buckets atomically.
    /// Returns whether the target existed.
    async fn delete_target(&self, id: Uuid) -> Result<bool>;

    async fn get_day_bucket(&self, target_id: Uuid, date: NaiveDate) -> Result<Option<DayBucket>>;

    async fn upsert_day_bucket(&self, bucket: &DayBucket) -> Result<()>;

    /// Buckets of one target whose date falls in `range`, ordered by date
    async fn query_day_buckets(&self, target_id: Uuid, range: DateRange) -> Result<Vec<DayBucket>>;

    /// Transactional read-increment-write of the `(target_id, date)` bucket,
    /// plus the target's last-check snapshot, in one transaction.
    async fn record_outcome(
        &self,
        target_id: Uuid,
        date: NaiveDate,
        is_up: bool,
        at: DateTime<Utc>,
    ) -> Result<RecordStatus>;
}

/// LibSQL implementation of [`StatsStore`]
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool whose schema is already initialized
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Create a store and run migrations on a fresh connection
    pub async fn open(pool: LibsqlPool) -> Result<Self> {
        let conn = pool.get().await?;
        super::initialize_database(&conn).await?;
        drop(conn);
        Ok(Self::new_from_pool(pool))
    }

    pub fn pool(&self) -> &LibsqlPool {
        &self.pool
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl StatsStore for LibsqlStore {
    async fn get_all_targets(&self) -> Result<Vec<Target>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY rowid"), ())
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(target_from_row(&row)?);
        }

        Ok(targets)
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(target_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_target(&self, target: &Target) -> Result<()> {
        let conn = self.get_conn().await?;
        let (last_check_at, last_check_is_up) = match target.last_check {
            Some(last) => (Some(last.at.timestamp_millis()), Some(if last.is_up { 1 } else { 0 })),
            None => (None, None),
        };

        conn.execute(
            "INSERT INTO targets (id, name, url, interval_minutes, last_check_at, last_check_is_up)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                interval_minutes = excluded.interval_minutes",
            params![
                target.id.to_string(),
                target.name.clone(),
                target.url.clone(),
                i64::from(target.interval_minutes),
                last_check_at,
                last_check_is_up
            ],
        )
        .await?;

        Ok(())
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;

        let buckets = tx
            .execute("DELETE FROM day_buckets WHERE target_id = ?", params![id.to_string()])
            .await?;
        let targets = tx.execute("DELETE FROM targets WHERE id = ?", params![id.to_string()]).await?;

        tx.commit().await?;
        tracing::debug!(target_id = %id, buckets, "Deleted target rows");
        Ok(targets > 0)
    }

    async fn get_day_bucket(&self, target_id: Uuid, date: NaiveDate) -> Result<Option<DayBucket>> {
        let conn = self.get_conn().await?;
        read_bucket(&conn, target_id, date).await
    }

    async fn upsert_day_bucket(&self, bucket: &DayBucket) -> Result<()> {
        let conn = self.get_conn().await?;
        write_bucket(&conn, bucket).await
    }

    async fn query_day_buckets(&self, target_id: Uuid, range: DateRange) -> Result<Vec<DayBucket>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {BUCKET_COLUMNS} FROM day_buckets
                     WHERE target_id = ? AND date >= ? AND date <= ?
                     ORDER BY date"
                ),
                params![
                    target_id.to_string(),
                    range.from.format(DATE_FORMAT).to_string(),
                    range.to.format(DATE_FORMAT).to_string()
                ],
            )
            .await?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            buckets.push(bucket_from_row(&row)?);
        }

        Ok(buckets)
    }

    async fn record_outcome(
        &self,
        target_id: Uuid,
        date: NaiveDate,
        is_up: bool,
        at: DateTime<Utc>,
    ) -> Result<RecordStatus> {
        let conn = self.get_conn().await?;
        // IMMEDIATE takes the write lock up front, so two writers can never
        // both read the same counters before either increments them.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;

        let exists = tx
            .query("SELECT 1 FROM targets WHERE id = ?", params![target_id.to_string()])
            .await?
            .next()
            .await?
            .is_some();
        if !exists {
            tx.rollback().await?;
            return Ok(RecordStatus::TargetMissing);
        }

        let bucket = match read_bucket(&tx, target_id, date).await? {
            Some(mut bucket) => {
                bucket.absorb(is_up);
                bucket
            }
            None => DayBucket::first(target_id, date, is_up),
        };
        write_bucket(&tx, &bucket).await?;

        tx.execute(
            "UPDATE targets SET last_check_at = ?, last_check_is_up = ? WHERE id = ?",
            params![at.timestamp_millis(), if is_up { 1 } else { 0 }, target_id.to_string()],
        )
        .await?;

        tx.commit().await?;
        Ok(RecordStatus::Recorded(bucket))
    }
}

async fn read_bucket(conn: &Connection, target_id: Uuid, date: NaiveDate) -> Result<Option<DayBucket>> {
    let mut rows = conn
        .query(
            &format!("SELECT {BUCKET_COLUMNS} FROM day_buckets WHERE id = ?"),
            params![bucket_key(target_id, date)],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(bucket_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn write_bucket(conn: &Connection, bucket: &DayBucket) -> Result<()> {
    conn.execute(
        "INSERT INTO day_buckets (id, target_id, date, checks, up, down)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            checks = excluded.checks,
            up = excluded.up,
            down = excluded.down",
        params![
            bucket.key(),
            bucket.target_id.to_string(),
            bucket.date.format(DATE_FORMAT).to_string(),
            counter_to_i64(bucket.checks)?,
            counter_to_i64(bucket.up)?,
            counter_to_i64(bucket.down)?
        ],
    )
    .await?;

    Ok(())
}

fn counter_to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::corrupt("day_buckets", format!("counter overflow: {value}")))
}

fn counter_from_row(row: &Row, idx: i32) -> Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| Error::corrupt("day_buckets", format!("negative counter: {value}")))
}

fn target_from_row(row: &Row) -> Result<Target> {
    let id_str: String = row.get(0)?;
    let interval: i64 = row.get(3)?;
    let last_check_at: Option<i64> = row.get(4)?;
    let last_check_is_up: Option<i64> = row.get(5)?;

    let last_check = match (last_check_at, last_check_is_up) {
        (Some(millis), Some(is_up)) => {
            let at = Target::millis_to_timestamp(millis)
                .ok_or_else(|| Error::corrupt("targets", format!("timestamp out of range: {millis}")))?;
            Some(LastCheck { at, is_up: is_up != 0 })
        }
        (None, None) => None,
        _ => return Err(Error::corrupt("targets", format!("half-written last check for {id_str}"))),
    };

    Ok(Target {
        id: Uuid::parse_str(&id_str).map_err(|e| Error::corrupt("targets", e.to_string()))?,
        name: row.get(1)?,
        url: row.get(2)?,
        interval_minutes: u32::try_from(interval)
            .map_err(|_| Error::corrupt("targets", format!("bad interval: {interval}")))?,
        last_check,
    })
}

fn bucket_from_row(row: &Row) -> Result<DayBucket> {
    let target_id: String = row.get(0)?;
    let date: String = row.get(1)?;

    Ok(DayBucket {
        target_id: Uuid::parse_str(&target_id).map_err(|e| Error::corrupt("day_buckets", e.to_string()))?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| Error::corrupt("day_buckets", format!("{date}: {e}")))?,
        checks: counter_from_row(row, 2)?,
        up: counter_from_row(row, 3)?,
        down: counter_from_row(row, 4)?,
    })
}
