use std::str::FromStr;
use std::time::Duration;

use saleslens_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::migrations;

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens the pool, creating the database file when it does not exist yet.
///
/// In-memory databases are private to each connection, so they are pinned to
/// a single connection to keep one schema visible to every caller.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

/// Connects with the configured pool limits and applies pending migrations.
pub async fn open(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool =
        connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await?;
    migrations::run_pending(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use saleslens_core::config::DatabaseConfig;
    use sqlx::Row;

    use super::open;

    #[tokio::test]
    async fn open_migrates_and_enables_foreign_keys() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 4,
            timeout_secs: 5,
        };
        let pool = open(&config).await.expect("open");

        let enabled = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma")
            .get::<i64, _>(0);
        assert_eq!(enabled, 1);

        let orphan = sqlx::query(
            "INSERT INTO sales_record_batch (id, business_id, origin, source_label, received_at)
             VALUES ('batch-1', 'missing', 'upload', 'x.csv', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err(), "batches must reference an existing business");
    }
}
