use std::sync::Arc;

use rte_core::datamodel::LaunchContext;
use rte_core::model::{AttemptId, DerivedProgress, FrameId, Module};
use rte_core::{Clock, CmiStore, RteSession, adapter_for};
use storage::repository::{AttemptRepository, AttemptWriter, ModuleRepository, Storage};

use crate::error::{PlayerError, SyncError};
use crate::handshake::Readiness;
use crate::registry::FrameRegistry;
use crate::sync::{
    ProgressEvent, ProgressReceiver, ProgressSink, SyncConfig, SyncDispatcher, SyncReport,
    progress_channel,
};

/// Loads attempts into frames: builds the RTE session for the module's
/// edition, wires it to a sync dispatcher and installs it in the registry.
#[derive(Clone)]
pub struct PlayerService {
    clock: Clock,
    modules: Arc<dyn ModuleRepository>,
    attempts: Arc<dyn AttemptRepository>,
    writer: Arc<dyn AttemptWriter>,
    registry: FrameRegistry,
    config: SyncConfig,
}

impl PlayerService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, registry: FrameRegistry) -> Self {
        Self {
            clock,
            modules: Arc::clone(&storage.modules),
            attempts: Arc::clone(&storage.attempts),
            writer: Arc::clone(&storage.attempt_writes),
            registry,
            config: SyncConfig::default(),
        }
    }

    /// Send snapshot writes through `writer` instead of local storage.
    ///
    /// Attempts are still loaded from local storage, so `writer` must keep
    /// it current (see `MirroredAttemptWriter`).
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn AttemptWriter>) -> Self {
        self.writer = writer;
        self
    }

    #[must_use]
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    /// Start an RTE session for `attempt_id` in `frame`.
    ///
    /// A session already installed in `frame` is replaced; its own
    /// `PlayerSession` can still be closed to flush it.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the attempt or its module cannot be loaded,
    /// or if they disagree on the course.
    pub async fn launch(
        &self,
        frame: FrameId,
        attempt_id: AttemptId,
        launch: &LaunchContext,
    ) -> Result<PlayerSession, PlayerError> {
        let attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(PlayerError::AttemptNotFound(attempt_id))?;
        let module = self
            .modules
            .get_module(attempt.module_id())
            .await?
            .ok_or(PlayerError::ModuleNotFound(attempt.module_id()))?;
        if module.course_id() != attempt.course_id() {
            return Err(PlayerError::ModuleMismatch {
                attempt: attempt.course_id(),
                module: module.course_id(),
            });
        }
        // Snapshots still queued by a session this one replaces are
        // refused by the store from here on.
        let attempt = self.attempts.begin_session(attempt_id).await?;

        let version = module.version();
        let initial = if attempt.progress().is_terminal() {
            attempt.progress()
        } else {
            attempt.derive(version)
        };

        let (tx, progress) = progress_channel();
        let dispatcher = SyncDispatcher::spawn(
            &attempt,
            Arc::clone(&self.writer),
            self.clock,
            self.config.clone(),
            ProgressSink::with_sender(tx),
        );

        let mut store = CmiStore::seeded(attempt.data().clone(), attempt.revision());
        launch.apply(version, &mut store);
        store.set_observer(dispatcher.mutation_observer());

        let readiness = Readiness::new();
        let session = RteSession::new(version, store)
            .with_lifecycle_observer(Arc::new(readiness.clone()))
            .with_lifecycle_observer(dispatcher.lifecycle_observer());
        let generation = self
            .registry
            .install(frame, adapter_for(session), readiness.clone());

        log::info!(
            "attempt {attempt_id}: launched module {} (SCORM {version}) in frame {frame} as {}, session {}",
            module.id(),
            initial.status,
            attempt.session()
        );

        Ok(PlayerSession {
            frame,
            generation,
            attempt_id,
            module,
            initial,
            readiness,
            progress,
            dispatcher,
        })
    }

    /// Unmount a session: remove its adapter (unless a reload already
    /// replaced it) and flush pending writes once.
    ///
    /// # Errors
    ///
    /// `SyncError::TaskFailed` if the dispatcher task died.
    pub async fn close(&self, session: PlayerSession) -> Result<ClosedSession, SyncError> {
        let PlayerSession {
            frame,
            generation,
            mut progress,
            dispatcher,
            ..
        } = session;

        // Dropping the adapter releases its observer handles.
        drop(self.registry.uninstall_if(frame, generation));
        let report = dispatcher.shutdown().await?;

        let mut events = Vec::new();
        while let Ok(event) = progress.try_recv() {
            events.push(event);
        }
        Ok(ClosedSession { report, events })
    }
}

/// One launched attempt, as seen by the host.
pub struct PlayerSession {
    frame: FrameId,
    generation: u64,
    attempt_id: AttemptId,
    module: Module,
    initial: DerivedProgress,
    readiness: Readiness,
    progress: ProgressReceiver,
    dispatcher: SyncDispatcher,
}

impl PlayerSession {
    #[must_use]
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Progress derived from the attempt as loaded.
    #[must_use]
    pub fn initial_progress(&self) -> DerivedProgress {
        self.initial
    }

    #[must_use]
    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Progress events from the sync dispatcher, in write order.
    pub fn progress_mut(&mut self) -> &mut ProgressReceiver {
        &mut self.progress
    }
}

/// What remained of a session after `PlayerService::close`.
#[derive(Debug)]
pub struct ClosedSession {
    pub report: SyncReport,
    /// Progress events not yet consumed through `progress_mut`.
    pub events: Vec<ProgressEvent>,
}

impl ClosedSession {
    #[must_use]
    pub fn completions(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, ProgressEvent::Completed(_)))
            .count()
    }
}
