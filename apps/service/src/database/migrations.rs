use libsql::Connection;

use crate::error::Result;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
///
/// This is the single source of truth for the database schema.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Targets and per-day outcome buckets").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: Initial schema
/// Creates the targets and day_buckets tables
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    // last_check_at / last_check_is_up are written together or not at all
    conn.execute(
        "CREATE TABLE IF NOT EXISTS targets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            interval_minutes INTEGER NOT NULL CHECK (interval_minutes >= 1),
            last_check_at INTEGER,
            last_check_is_up INTEGER,
            CHECK ((last_check_at IS NULL) = (last_check_is_up IS NULL))
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS day_buckets (
            id TEXT PRIMARY KEY,
            target_id TEXT NOT NULL,
            date TEXT NOT NULL,
            checks INTEGER NOT NULL CHECK (checks >= 0),
            up INTEGER NOT NULL CHECK (up >= 0),
            down INTEGER NOT NULL CHECK (down >= 0),
            CHECK (up + down = checks),
            UNIQUE (target_id, date)
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_targets_url ON targets(url)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_day_buckets_target_date ON day_buckets(target_id, date)",
        (),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let db = libsql::Builder::new_local(dir.path().join("migrate.db")).build().await?;
        let conn = db.connect()?;

        run_migrations(&conn).await?;
        run_migrations(&conn).await?;

        assert_eq!(get_current_version(&conn).await?, SCHEMA_VERSION);

        let mut rows = conn.query("SELECT COUNT(*) FROM schema_migrations", ()).await?;
        let count: i64 = rows.next().await?.expect("count row").get(0)?;
        assert_eq!(count, 1);
        Ok(())
    }
}
