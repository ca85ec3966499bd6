use std::sync::Arc;

use chrono::{DateTime, Utc};
use rte_core::model::{Attempt, AttemptId, DerivedProgress};
use tokio::sync::mpsc;

/// Progress as the attempt store reported it after a write.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub attempt_id: AttemptId,
    pub progress: DerivedProgress,
    pub completed_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            attempt_id: attempt.id(),
            progress: attempt.progress(),
            completed_at: attempt.completed_at(),
            revision: attempt.revision(),
        }
    }
}

/// Feedback sent to the hosting surface by the sync dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A write succeeded; carries the stored progress.
    Updated(ProgressUpdate),
    /// The attempt gained its `completed_at`. Sent at most once per dispatcher,
    /// right after the matching `Updated`.
    Completed(ProgressUpdate),
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event);
    }
}

pub type SharedProgressObserver = Arc<dyn ProgressObserver>;
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

#[derive(Clone, Default)]
pub struct ProgressSink {
    observer: Option<SharedProgressObserver>,
    sender: Option<ProgressSender>,
}

impl ProgressSink {
    #[must_use]
    pub fn with_observer(observer: SharedProgressObserver) -> Self {
        Self {
            observer: Some(observer),
            sender: None,
        }
    }

    #[must_use]
    pub fn with_sender(sender: ProgressSender) -> Self {
        Self {
            observer: None,
            sender: Some(sender),
        }
    }

    #[must_use]
    pub fn observer(mut self, observer: SharedProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn sender(mut self, sender: ProgressSender) -> Self {
        self.sender = Some(sender);
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.observer.is_some() || self.sender.is_some()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_progress(&event);
        }
        if let Some(sender) = self.sender.as_ref() {
            // The host may have stopped listening; progress is advisory.
            let _ = sender.send(event);
        }
    }
}

#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}
