/// Persistence for targets and their per-day outcome counters
///
/// `repository` defines the transactional `StatsStore` contract and its
/// libsql implementation; `migrations` owns the schema.

pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{DateRange, DayBucket, LastCheck, RecordStatus, Target};
pub use repository::{LibsqlStore, StatsStore};

use crate::error::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
