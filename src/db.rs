//! Database connection and schema management.
//!
//! This module provides SQLite database connectivity with:
//! - Connection pool management
//! - WAL mode for concurrent reads
//! - Foreign key enforcement on every pooled connection
//! - Automatic migration execution (catalog tables and indexes)
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("data.db")).await?;
//! // Hand `db` to a writer or the query layer...
//! db.close().await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
/// Connections will wait this long before returning SQLITE_BUSY.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

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

/// Tunables for the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Database connection wrapper with connection pool.
///
/// One `Database` is opened per job invocation and passed explicitly to the
/// writers and the query layer. Call [`Database::close`] when the job is done.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection to the specified path with default options.
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode and foreign keys
    /// 3. Run any pending migrations
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        Self::new_with_options(db_path, DatabaseOptions::default()).await
    }

    /// Creates a new database connection with explicit pool options.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new_with_options(
        db_path: &Path,
        options: DatabaseOptions,
    ) -> Result<Self, DbError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(u64::from(options.busy_timeout_ms)))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// The database exists only for the lifetime of the single pooled
    /// connection, so the pool never retires it.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let connect_options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks if WAL mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0.eq_ignore_ascii_case("wal"))
    }

    /// Checks whether foreign key enforcement is active on a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[instrument(skip(self))]
    pub async fn foreign_keys_enabled(&self) -> Result<bool, DbError> {
        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 == 1)
    }

    /// Gracefully closes all connections in the pool.
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
    async fn test_database_catalog_tables_exist() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO authors (id, name) VALUES ('1', 'Ursula K. Le Guin')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO books (title, title_tsv) VALUES ('Earthsea', 'Earthsea')")
            .execute(db.pool())
            .await
            .unwrap();
        let result = sqlx::query("INSERT INTO book_to_author (book_id, author_id) VALUES (1, '1')")
            .execute(db.pool())
            .await;

        assert!(result.is_ok(), "book_to_author should accept a valid link");
    }

    #[tokio::test]
    async fn test_database_rejects_dangling_link() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.foreign_keys_enabled().await.unwrap());

        let result =
            sqlx::query("INSERT INTO book_to_author (book_id, author_id) VALUES (42, 'missing')")
                .execute(db.pool())
                .await;

        assert!(result.is_err(), "foreign keys should reject dangling links");
    }

    #[tokio::test]
    async fn test_database_isbn_unique_but_nullable() {
        let db = Database::new_in_memory().await.unwrap();

        for _ in 0..2 {
            sqlx::query("INSERT INTO books (isbn, title, title_tsv) VALUES (NULL, 't', 't')")
                .execute(db.pool())
                .await
                .unwrap();
        }
        sqlx::query("INSERT INTO books (isbn, title, title_tsv) VALUES ('123', 't', 't')")
            .execute(db.pool())
            .await
            .unwrap();
        let duplicate =
            sqlx::query("INSERT INTO books (isbn, title, title_tsv) VALUES ('123', 't', 't')")
                .execute(db.pool())
                .await;

        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_database_with_tempfile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await;
        assert!(db.is_ok(), "Failed to create database at temp path");

        let db = db.unwrap();
        assert!(db.is_wal_enabled().await.unwrap());
        assert!(db.foreign_keys_enabled().await.unwrap());
        db.close().await;
    }

    #[tokio::test]
    async fn test_database_reopen_keeps_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();
        sqlx::query("INSERT INTO authors (id, name) VALUES ('7', 'N. K. Jemisin')")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        let db = Database::new(&db_path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM authors")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
