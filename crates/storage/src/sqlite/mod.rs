use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;

use crate::repository::{AttemptRepository, AttemptWriter, ModuleRepository, Storage};

mod attempt_repo;
mod mapping;
mod migrate;
mod module_repo;

/// Every open frame runs its own sync worker, and a reloaded frame briefly
/// has two writing to the same attempt row. `SQLite` allows one writer at a
/// time, so a writer waits this long for the lock before failing with
/// `SQLITE_BUSY` and falling back to the sync retry policy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot upserts are short; a handful of connections covers the host's
/// reads plus one writer per frame without queueing on the pool.
const MAX_CONNECTIONS: u32 = 4;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// Connections run in WAL mode so host reads of an attempt are not
    /// blocked while a sync worker holds the write lock. With WAL,
    /// `synchronous = NORMAL` is still durable across application crashes
    /// and saves an fsync on every snapshot commit. One connection is kept
    /// open so a shared-cache in-memory database outlives idle periods.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the connection
    /// cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(1)
            .acquire_timeout(BUSY_TIMEOUT * 2)
            .connect_with(options)
            .await?;
        log::debug!("sqlite pool ready ({MAX_CONNECTIONS} connections, WAL)");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let modules: Arc<dyn ModuleRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let attempt_writes: Arc<dyn AttemptWriter> = Arc::new(repo);
        Ok(Self {
            modules,
            attempts,
            attempt_writes,
        })
    }
}
