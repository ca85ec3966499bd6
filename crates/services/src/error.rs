//! Shared error types for the services crate.

use thiserror::Error;

use rte_core::model::{AttemptId, CourseId, ModuleError, ModuleId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `PlayerService` while launching or closing a frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error("attempt belongs to course {attempt}, module belongs to course {module}")]
    ModuleMismatch { attempt: CourseId, module: CourseId },
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the sync task when it cannot reach a conclusion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("write of revision {revision} abandoned after {attempts} attempts: {source}")]
    Exhausted {
        revision: u64,
        attempts: u32,
        #[source]
        source: StorageError,
    },
    #[error("sync task stopped unexpectedly")]
    TaskFailed,
}

/// Errors emitted by `RemoteAttemptStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteStoreError {
    #[error("invalid remote store url: {0}")]
    InvalidUrl(String),
    #[error("remote store request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("remote store returned an unusable attempt: {0}")]
    InvalidAttempt(String),
}

impl From<RemoteStoreError> for StorageError {
    fn from(err: RemoteStoreError) -> Self {
        match err {
            RemoteStoreError::HttpStatus(status) if status == reqwest::StatusCode::NOT_FOUND => {
                StorageError::NotFound
            }
            RemoteStoreError::HttpStatus(status) if status == reqwest::StatusCode::CONFLICT => {
                StorageError::Conflict
            }
            RemoteStoreError::InvalidAttempt(msg) => StorageError::Serialization(msg),
            other => StorageError::Connection(other.to_string()),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Remote(#[from] RemoteStoreError),
}
