//! SQLite connection handling for the metadata cache.
//!
//! One pool backs the single `metadata_cache` table. The workload is
//! read-mostly with occasional single-row upserts from concurrent resolver
//! workers, so the pool stays small and WAL mode covers the readers while a
//! write is in flight.
//!
//! # Example
//!
//! ```no_run
//! use bookmeta_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("bookmeta.db")).await?;
//! // Use db for queries...
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Maximum connections in the pool.
///
/// SQLite allows one writer at a time; resolver workers mostly read, so a
/// handful of connections is enough even at the worker-pool ceiling.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
///
/// Upserts from concurrent workers briefly contend for the write lock;
/// waiting beats surfacing SQLITE_BUSY to a resolution attempt.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Pooled connection to the cache database.
///
/// Opening a database configures journaling and runs pending migrations, so
/// a `Database` handle always points at a current-schema cache.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the cache database at the given path.
    ///
    /// Configures WAL journaling with relaxed synchronous mode and a busy
    /// timeout, then runs any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        // WAL keeps readers unblocked while a worker upserts.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Every cache row is re-fetchable from the upstream catalogs, so
        // fsync-per-commit durability buys nothing here.
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// Single connection: an in-memory SQLite database is per-connection, so
    /// a pool of more than one would see different (empty) databases. WAL
    /// mode is skipped as it provides no benefit without a file.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    ///
    /// Use this for executing queries with sqlx.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks if WAL mode is enabled.
    ///
    /// Returns `true` if WAL mode is active, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0.to_lowercase() == "wal")
    }

    /// Gracefully closes all connections in the pool.
    ///
    /// This should be called before the application exits to ensure
    /// all connections are properly closed. After calling this method,
    /// the Database instance should not be used.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_database_migrations_create_cache_table() {
        let db = Database::new_in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO metadata_cache (isbn13, fetched_at) VALUES ('9780134685991', 0)",
        )
        .execute(db.pool())
        .await;

        assert!(
            result.is_ok(),
            "metadata_cache table should exist after migration"
        );
    }

    #[tokio::test]
    async fn test_database_additive_migration_adds_last_error() {
        let db = Database::new_in_memory().await.unwrap();

        // Column appended by the second migration must be writable.
        let result = sqlx::query(
            "INSERT INTO metadata_cache (isbn13, fetched_at, last_error) \
             VALUES ('9780131103627', 0, 'timeout')",
        )
        .execute(db.pool())
        .await;

        assert!(result.is_ok(), "last_error column should exist");
    }

    #[tokio::test]
    async fn test_database_isbn13_unique_constraint() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO metadata_cache (isbn13, fetched_at) VALUES ('9780134685991', 0)")
            .execute(db.pool())
            .await
            .unwrap();
        let duplicate =
            sqlx::query("INSERT INTO metadata_cache (isbn13, fetched_at) VALUES ('9780134685991', 0)")
                .execute(db.pool())
                .await;

        assert!(duplicate.is_err(), "duplicate isbn13 should be rejected");
    }

    #[tokio::test]
    async fn test_database_with_tempfile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await;
        assert!(db.is_ok(), "Failed to create database at temp path");

        // Verify WAL mode is enabled for file-based databases
        let db = db.unwrap();
        let is_wal = db.is_wal_enabled().await.unwrap();
        assert!(is_wal, "WAL mode should be enabled for file-based database");

        // Relaxed synchronous mode (NORMAL = 1) goes with WAL.
        let mode: (i64,) = sqlx::query_as("PRAGMA synchronous")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.0, 1);
    }

    #[tokio::test]
    async fn test_database_pool_returns_valid_pool() {
        let db = Database::new_in_memory().await.unwrap();
        let pool = db.pool();

        // Verify pool works by running a simple query
        let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool).await.unwrap();

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_database_close_works() {
        let db = Database::new_in_memory().await.unwrap();
        db.close().await;
        // If we get here without panic, close worked
    }
}
