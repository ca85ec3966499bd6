use std::sync::Arc;

use rte_core::model::{Attempt, AttemptId, Module};
use storage::repository::{AttemptWriter, NewAttemptRecord, Storage};

use crate::Clock;
use crate::error::AppServicesError;
use crate::player::PlayerService;
use crate::registry::FrameRegistry;
use crate::remote::{MirroredAttemptWriter, RemoteAttemptStore, RemoteStoreConfig};
use crate::sync::SyncConfig;

/// Assembles host-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    registry: FrameRegistry,
    player: Arc<PlayerService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: SyncConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, config))
    }

    #[must_use]
    pub fn in_memory(clock: Clock, config: SyncConfig) -> Self {
        Self::from_storage(Storage::in_memory(), clock, config)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, config: SyncConfig) -> Self {
        let registry = FrameRegistry::new();
        let player = PlayerService::new(clock, &storage, registry.clone()).with_sync_config(config);
        Self {
            storage,
            registry,
            player: Arc::new(player),
        }
    }

    /// Send snapshot writes to the remote attempt store described by
    /// `config`, mirroring accepted writes into local storage.
    ///
    /// # Errors
    ///
    /// `AppServicesError::Remote` if the remote base URL is invalid.
    pub fn with_remote(self, config: RemoteStoreConfig) -> Result<Self, AppServicesError> {
        let remote = RemoteAttemptStore::new(config)?;
        log::info!("sending attempt writes to the remote store");
        Ok(self.with_primary_writer(Arc::new(remote)))
    }

    /// Make `primary` the store of record for snapshot writes. Local storage
    /// keeps a mirrored copy so launches and reads see the same attempt.
    #[must_use]
    pub fn with_primary_writer(mut self, primary: Arc<dyn AttemptWriter>) -> Self {
        let writer = MirroredAttemptWriter::new(primary, Arc::clone(&self.storage.attempt_writes));
        let player = PlayerService::clone(&self.player).with_writer(Arc::new(writer));
        self.player = Arc::new(player);
        self
    }

    #[must_use]
    pub fn player(&self) -> Arc<PlayerService> {
        Arc::clone(&self.player)
    }

    #[must_use]
    pub fn registry(&self) -> FrameRegistry {
        self.registry.clone()
    }

    /// Register `module` and open a fresh attempt on it.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the module or attempt cannot be stored.
    pub async fn seed_attempt(&self, module: &Module) -> Result<Attempt, AppServicesError> {
        self.storage.modules.upsert_module(module).await?;
        let attempt = self
            .storage
            .attempts
            .create_attempt(NewAttemptRecord::empty(module.course_id(), module.id()))
            .await?;
        log::info!(
            "seeded attempt {} for module {} (course {})",
            attempt.id(),
            module.id(),
            module.course_id()
        );
        Ok(attempt)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError` on storage failures.
    pub async fn attempt(&self, id: AttemptId) -> Result<Option<Attempt>, AppServicesError> {
        Ok(self.storage.attempts.get_attempt(id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError` on storage failures.
    pub async fn module_of(&self, attempt: &Attempt) -> Result<Option<Module>, AppServicesError> {
        Ok(self.storage.modules.get_module(attempt.module_id()).await?)
    }
}
