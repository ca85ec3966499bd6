use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rte_core::CmiData;
use rte_core::events::Snapshot;
use rte_core::model::{Attempt, AttemptId, CourseId, Module, ModuleId, SnapshotOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Input for creating an attempt; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttemptRecord {
    pub course_id: CourseId,
    pub module_id: ModuleId,
    pub data: CmiData,
}

impl NewAttemptRecord {
    #[must_use]
    pub fn empty(course_id: CourseId, module_id: ModuleId) -> Self {
        Self {
            course_id,
            module_id,
            data: CmiData::new(),
        }
    }
}

/// Full-snapshot upsert of an attempt's CMI data.
///
/// Addressed by `(course_id, module_id, attempt_id)`; the store rejects a
/// mismatch between the address and the stored attempt with `Conflict`.
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub course_id: CourseId,
    pub module_id: ModuleId,
    pub attempt_id: AttemptId,
    pub snapshot: Snapshot,
    pub at: DateTime<Utc>,
}

/// Result of an [`AttemptWriter::update_attempt`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptWrite {
    /// The attempt as stored after the call.
    pub attempt: Attempt,
    pub outcome: SnapshotOutcome,
}

impl AttemptWrite {
    /// The snapshot was older than the stored revision and changed nothing.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.outcome == SnapshotOutcome::Stale
    }
}

/// The write side of the attempt store, as consumed by the sync path.
#[async_trait]
pub trait AttemptWriter: Send + Sync {
    /// Apply a CMI snapshot and return the attempt as stored afterwards,
    /// including `completed_at` and the derived progress.
    ///
    /// Stale or regressing snapshots are not errors; the returned outcome
    /// says which happened.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if the attempt or its module is missing,
    /// `StorageError::Conflict` if the address does not match.
    async fn update_attempt(&self, update: AttemptUpdate) -> Result<AttemptWrite, StorageError>;
}

/// Repository contract for attempts.
#[async_trait]
pub trait AttemptRepository: AttemptWriter {
    /// Create an attempt for a module.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if the module is unknown, or other storage errors.
    async fn create_attempt(&self, attempt: NewAttemptRecord) -> Result<Attempt, StorageError>;

    /// Fetch an attempt by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError>;

    /// Open a new player session on an attempt. The returned attempt's
    /// revision is the base the session counts from; snapshots from earlier
    /// sessions are stale from now on.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if the attempt is missing.
    async fn begin_session(&self, id: AttemptId) -> Result<Attempt, StorageError>;
}

/// Repository contract for module descriptors.
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Persist or update a module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;

    /// Fetch a module by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError>;
}

pub(crate) fn log_outcome(attempt: &Attempt, outcome: SnapshotOutcome) {
    match outcome {
        SnapshotOutcome::Applied => {}
        SnapshotOutcome::Stale => log::debug!(
            "attempt {}: ignored stale snapshot (stored session {}, revision {})",
            attempt.id(),
            attempt.session(),
            attempt.revision()
        ),
        SnapshotOutcome::ProgressPinned => log::info!(
            "attempt {}: kept terminal progress {} against regressing snapshot",
            attempt.id(),
            attempt.progress().status
        ),
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    modules: Arc<Mutex<HashMap<ModuleId, Module>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    next_attempt_id: Arc<Mutex<u64>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn module(&self, id: ModuleId) -> Result<Option<Module>, StorageError> {
        let guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl ModuleRepository for InMemoryRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let mut guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(module.id(), module.clone());
        Ok(())
    }

    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError> {
        self.module(id)
    }
}

#[async_trait]
impl AttemptWriter for InMemoryRepository {
    async fn update_attempt(&self, update: AttemptUpdate) -> Result<AttemptWrite, StorageError> {
        let module = self.module(update.module_id)?.ok_or(StorageError::NotFound)?;
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let attempt = guard
            .get_mut(&update.attempt_id)
            .ok_or(StorageError::NotFound)?;
        if attempt.course_id() != update.course_id || attempt.module_id() != update.module_id {
            return Err(StorageError::Conflict);
        }

        let outcome = attempt.apply_snapshot(module.version(), update.snapshot, update.at);
        log_outcome(attempt, outcome);
        Ok(AttemptWrite {
            attempt: attempt.clone(),
            outcome,
        })
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn create_attempt(&self, record: NewAttemptRecord) -> Result<Attempt, StorageError> {
        let module = self.module(record.module_id)?.ok_or(StorageError::NotFound)?;
        if module.course_id() != record.course_id {
            return Err(StorageError::Conflict);
        }

        let id = {
            let mut next = self
                .next_attempt_id
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            *next += 1;
            AttemptId::new(*next)
        };

        let attempt = Attempt::from_persisted(
            id,
            record.course_id,
            record.module_id,
            record.data,
            None,
            None,
            Default::default(),
            0,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn begin_session(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let attempt = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        attempt.begin_session();
        Ok(attempt.clone())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub modules: Arc<dyn ModuleRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    /// Same backend as `attempts`, as seen by the sync path.
    pub attempt_writes: Arc<dyn AttemptWriter>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let modules: Arc<dyn ModuleRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let attempt_writes: Arc<dyn AttemptWriter> = Arc::new(repo);
        Self {
            modules,
            attempts,
            attempt_writes,
        }
    }
}
