use std::sync::Arc;

use rte_core::events::{
    CmiMutation, LifecycleEvent, LifecycleObserver, MutationObserver, SharedLifecycleObserver,
    SharedMutationObserver, Snapshot,
};
use rte_core::model::{Attempt, AttemptId, CourseId, ModuleId};
use rte_core::Clock;
use storage::repository::{AttemptUpdate, AttemptWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::{ProgressEvent, ProgressSink, ProgressUpdate};
use super::retry::{RetryPolicy, SyncConfig};
use crate::error::SyncError;

/// Address of the attempt a dispatcher writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTarget {
    pub course_id: CourseId,
    pub module_id: ModuleId,
    pub attempt_id: AttemptId,
}

impl SyncTarget {
    #[must_use]
    pub fn of(attempt: &Attempt) -> Self {
        Self {
            course_id: attempt.course_id(),
            module_id: attempt.module_id(),
            attempt_id: attempt.id(),
        }
    }
}

#[derive(Debug)]
enum SyncMessage {
    Changed(Snapshot),
    Committed(Snapshot),
    Terminated(Snapshot),
    Close,
}

/// The synchronous side of a dispatcher: installed as both the CMI Store's
/// mutation observer and the session's lifecycle observer.
///
/// Every callback only enqueues and returns.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncMessage>,
}

impl SyncHandle {
    fn send(&self, message: SyncMessage) {
        if self.tx.send(message).is_err() {
            log::debug!("sync task already stopped; dropping message");
        }
    }
}

impl MutationObserver for SyncHandle {
    fn on_mutation(&self, mutation: &CmiMutation) {
        self.send(SyncMessage::Changed(mutation.snapshot.clone()));
    }
}

impl LifecycleObserver for SyncHandle {
    fn on_lifecycle(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Invoked { .. } => {}
            LifecycleEvent::Committed(snapshot) => {
                self.send(SyncMessage::Committed(snapshot.clone()));
            }
            LifecycleEvent::Terminated(snapshot) => {
                self.send(SyncMessage::Terminated(snapshot.clone()));
            }
        }
    }
}

/// What a dispatcher did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Writes the attempt store accepted.
    pub writes: u32,
    /// Snapshots given up on after the retry policy ran out.
    pub failures: u32,
    /// Snapshots the store refused because a later session on the same
    /// attempt had already been opened.
    pub superseded: u32,
    /// Progress as last reported by the store.
    pub last: Option<ProgressUpdate>,
}

/// Moves CMI snapshots from a running RTE session to the attempt store.
///
/// Queued snapshots are coalesced so a burst of Set calls results in a
/// single write of the newest one. Snapshots at or below the last written
/// revision are skipped. Once the store reports that a later session owns
/// the attempt, nothing more is written.
pub struct SyncDispatcher {
    handle: Arc<SyncHandle>,
    task: JoinHandle<SyncReport>,
}

impl SyncDispatcher {
    /// Start the background writer for `loaded`.
    ///
    /// Must be called from inside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        loaded: &Attempt,
        writer: Arc<dyn AttemptWriter>,
        clock: Clock,
        config: SyncConfig,
        sink: ProgressSink,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SyncWorker {
            target: SyncTarget::of(loaded),
            writer,
            clock,
            retry: config.retry,
            sink,
            last_written: loaded.revision(),
            superseded: false,
            completion_announced: loaded.completed_at().is_some(),
            report: SyncReport::default(),
        };
        log::debug!(
            "attempt {}: sync dispatcher started at revision {}",
            loaded.id(),
            loaded.revision()
        );
        Self {
            handle: Arc::new(SyncHandle { tx }),
            task: tokio::spawn(worker.run(rx)),
        }
    }

    #[must_use]
    pub fn handle(&self) -> Arc<SyncHandle> {
        Arc::clone(&self.handle)
    }

    #[must_use]
    pub fn mutation_observer(&self) -> SharedMutationObserver {
        self.handle()
    }

    #[must_use]
    pub fn lifecycle_observer(&self) -> SharedLifecycleObserver {
        self.handle()
    }

    /// Flush whatever is queued, then stop.
    ///
    /// Snapshots produced after this call are dropped.
    ///
    /// # Errors
    ///
    /// `SyncError::TaskFailed` if the background task panicked or was
    /// cancelled.
    pub async fn shutdown(self) -> Result<SyncReport, SyncError> {
        self.handle.send(SyncMessage::Close);
        self.task.await.map_err(|_| SyncError::TaskFailed)
    }
}

#[derive(Default)]
struct Batch {
    latest: Option<Snapshot>,
    is_final: bool,
    close: bool,
}

impl Batch {
    fn absorb(&mut self, message: SyncMessage) {
        let snapshot = match message {
            SyncMessage::Changed(s) | SyncMessage::Committed(s) => s,
            SyncMessage::Terminated(s) => {
                self.is_final = true;
                s
            }
            SyncMessage::Close => {
                self.close = true;
                return;
            }
        };
        match &self.latest {
            Some(current) if current.revision >= snapshot.revision => {}
            _ => self.latest = Some(snapshot),
        }
    }
}

struct SyncWorker {
    target: SyncTarget,
    writer: Arc<dyn AttemptWriter>,
    clock: Clock,
    retry: RetryPolicy,
    sink: ProgressSink,
    last_written: u64,
    superseded: bool,
    completion_announced: bool,
    report: SyncReport,
}

impl SyncWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncMessage>) -> SyncReport {
        while let Some(first) = rx.recv().await {
            let mut batch = Batch::default();
            batch.absorb(first);
            while let Ok(next) = rx.try_recv() {
                batch.absorb(next);
            }

            if let Some(snapshot) = batch.latest {
                self.write(snapshot, batch.is_final).await;
            }
            if batch.close {
                break;
            }
        }
        log::debug!(
            "attempt {}: sync dispatcher stopped after {} writes",
            self.target.attempt_id,
            self.report.writes
        );
        self.report
    }

    async fn write(&mut self, snapshot: Snapshot, is_final: bool) {
        let revision = snapshot.revision;
        if self.superseded {
            log::debug!(
                "attempt {}: dropping revision {revision} of a superseded session",
                self.target.attempt_id
            );
            return;
        }
        if revision <= self.last_written {
            log::debug!(
                "attempt {}: revision {revision} already written",
                self.target.attempt_id
            );
            return;
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut tries = 1;
        loop {
            let update = AttemptUpdate {
                course_id: self.target.course_id,
                module_id: self.target.module_id,
                attempt_id: self.target.attempt_id,
                snapshot: snapshot.clone(),
                at: self.clock.now(),
            };
            match self.writer.update_attempt(update).await {
                Ok(write) if write.is_stale() => {
                    self.superseded = true;
                    self.report.superseded += 1;
                    log::warn!(
                        "attempt {}: revision {revision} refused, session {} now owns the attempt",
                        self.target.attempt_id,
                        write.attempt.session()
                    );
                    return;
                }
                Ok(write) => {
                    self.last_written = revision;
                    self.report.writes += 1;
                    self.publish(&write.attempt);
                    return;
                }
                Err(err) if tries < max_attempts => {
                    let delay = self.retry.delay_after(tries);
                    log::warn!(
                        "attempt {}: write of revision {revision} failed ({tries}/{max_attempts}): {err}; retrying in {delay:?}",
                        self.target.attempt_id
                    );
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                Err(err) => {
                    self.report.failures += 1;
                    let err = SyncError::Exhausted {
                        revision,
                        attempts: tries,
                        source: err,
                    };
                    if is_final {
                        log::error!(
                            "attempt {}: final write lost: {err}",
                            self.target.attempt_id
                        );
                    } else {
                        log::warn!("attempt {}: {err}", self.target.attempt_id);
                    }
                    return;
                }
            }
        }
    }

    fn publish(&mut self, stored: &Attempt) {
        let update = ProgressUpdate::from_attempt(stored);
        self.report.last = Some(update.clone());
        self.sink.emit(ProgressEvent::Updated(update.clone()));

        if update.completed_at.is_some() && !self.completion_announced {
            self.completion_announced = true;
            log::info!(
                "attempt {}: completed as {}",
                update.attempt_id,
                update.progress.status
            );
            self.sink.emit(ProgressEvent::Completed(update));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::events::progress_channel;
    use rte_core::CmiData;
    use rte_core::model::{Module, ProgressStatus, RteVersion};
    use rte_core::time::fixed_clock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::repository::{
        AttemptRepository, AttemptWrite, InMemoryRepository, ModuleRepository, NewAttemptRecord,
        StorageError,
    };

    async fn seeded() -> (InMemoryRepository, Attempt) {
        let repo = InMemoryRepository::new();
        let module = Module::new(
            ModuleId::new(1),
            CourseId::new(1),
            RteVersion::Scorm12,
            "en",
            1,
            "index.html",
        )
        .unwrap();
        repo.upsert_module(&module).await.unwrap();
        let attempt = repo
            .create_attempt(NewAttemptRecord::empty(CourseId::new(1), ModuleId::new(1)))
            .await
            .unwrap();
        (repo, attempt)
    }

    fn snapshot(revision: u64, status: &str) -> Snapshot {
        let mut data = CmiData::new();
        data.insert("cmi.core.lesson_status".into(), status.into());
        Snapshot { revision, data }
    }

    struct FlakyWriter {
        inner: InMemoryRepository,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl AttemptWriter for FlakyWriter {
        async fn update_attempt(
            &self,
            update: AttemptUpdate,
        ) -> Result<AttemptWrite, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::Connection("unreachable".into()));
            }
            self.inner.update_attempt(update).await
        }
    }

    #[tokio::test]
    async fn burst_of_changes_is_written_once() {
        let (repo, attempt) = seeded().await;
        let dispatcher = SyncDispatcher::spawn(
            &attempt,
            Arc::new(repo.clone()),
            fixed_clock(),
            SyncConfig::default(),
            ProgressSink::default(),
        );
        let handle = dispatcher.handle();
        handle.send(SyncMessage::Changed(snapshot(1, "incomplete")));
        handle.send(SyncMessage::Changed(snapshot(2, "incomplete")));
        handle.send(SyncMessage::Committed(snapshot(3, "completed")));

        let report = dispatcher.shutdown().await.unwrap();
        assert_eq!(report.writes, 1);
        assert_eq!(report.last.unwrap().revision, 3);

        let stored = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
        assert_eq!(stored.progress().status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn already_written_revisions_are_skipped() {
        let (repo, attempt) = seeded().await;
        let (tx, mut rx) = progress_channel();
        let dispatcher = SyncDispatcher::spawn(
            &attempt,
            Arc::new(repo),
            fixed_clock(),
            SyncConfig::default(),
            ProgressSink::with_sender(tx),
        );
        let handle = dispatcher.handle();
        handle.send(SyncMessage::Changed(snapshot(1, "incomplete")));
        tokio::task::yield_now().await;
        handle.send(SyncMessage::Committed(snapshot(1, "incomplete")));

        let report = dispatcher.shutdown().await.unwrap();
        assert_eq!(report.writes, 1);
        assert!(matches!(rx.try_recv(), Ok(ProgressEvent::Updated(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let (repo, attempt) = seeded().await;
        let writer = Arc::new(FlakyWriter {
            inner: repo,
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let dispatcher = SyncDispatcher::spawn(
            &attempt,
            Arc::clone(&writer) as Arc<dyn AttemptWriter>,
            fixed_clock(),
            SyncConfig::default(),
            ProgressSink::default(),
        );
        dispatcher
            .handle()
            .send(SyncMessage::Terminated(snapshot(1, "passed")));

        let report = dispatcher.shutdown().await.unwrap();
        assert_eq!(writer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.writes, 1);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_reported_not_raised() {
        let (repo, attempt) = seeded().await;
        let writer = Arc::new(FlakyWriter {
            inner: repo,
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let dispatcher = SyncDispatcher::spawn(
            &attempt,
            Arc::clone(&writer) as Arc<dyn AttemptWriter>,
            fixed_clock(),
            SyncConfig::default().with_retry(RetryPolicy::default().with_max_attempts(2)),
            ProgressSink::default(),
        );
        dispatcher
            .handle()
            .send(SyncMessage::Terminated(snapshot(1, "passed")));

        let report = dispatcher.shutdown().await.unwrap();
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.writes, 0);
        assert_eq!(report.failures, 1);
        assert_eq!(report.last, None);
    }

    #[tokio::test]
    async fn writes_stop_once_a_later_session_owns_the_attempt() {
        let (repo, attempt) = seeded().await;
        let loaded = repo.begin_session(attempt.id()).await.unwrap();
        let base = loaded.revision();
        let (tx, mut rx) = progress_channel();
        let dispatcher = SyncDispatcher::spawn(
            &loaded,
            Arc::new(repo.clone()),
            fixed_clock(),
            SyncConfig::default(),
            ProgressSink::with_sender(tx),
        );
        repo.begin_session(attempt.id()).await.unwrap();

        let handle = dispatcher.handle();
        handle.send(SyncMessage::Changed(snapshot(base + 1, "incomplete")));
        tokio::task::yield_now().await;
        handle.send(SyncMessage::Terminated(snapshot(base + 2, "completed")));

        let report = dispatcher.shutdown().await.unwrap();
        assert_eq!(report.writes, 0);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.failures, 0);
        assert_eq!(report.last, None);
        assert!(rx.try_recv().is_err());

        let stored = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
        assert_eq!(stored.progress().status, ProgressStatus::NotStarted);
        assert_eq!(stored.session(), 2);
    }
}
