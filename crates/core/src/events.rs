//! Observer seams through which a running RTE session reports to the host.
//!
//! Observers are invoked synchronously from inside RTE calls, so
//! implementations must return immediately (typically by pushing into a
//! channel).

use std::sync::Arc;

use crate::cmi::CmiData;

/// Full copy of the persisted part of a CMI Store at a given revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub data: CmiData,
}

/// Emitted by the CMI Store after every successful `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmiMutation {
    pub key: String,
    pub value: String,
    pub snapshot: Snapshot,
}

/// Lifecycle notifications emitted by an RTE session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Any adapter method was called by the content, by wire name.
    Invoked { method: &'static str },
    /// `Commit` succeeded.
    Committed(Snapshot),
    /// `Terminate`/`LMSFinish` succeeded; carries the final snapshot.
    Terminated(Snapshot),
}

pub trait MutationObserver: Send + Sync {
    fn on_mutation(&self, mutation: &CmiMutation);
}

impl<F> MutationObserver for F
where
    F: Fn(&CmiMutation) + Send + Sync,
{
    fn on_mutation(&self, mutation: &CmiMutation) {
        self(mutation);
    }
}

pub trait LifecycleObserver: Send + Sync {
    fn on_lifecycle(&self, event: &LifecycleEvent);
}

impl<F> LifecycleObserver for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_lifecycle(&self, event: &LifecycleEvent) {
        self(event);
    }
}

pub type SharedMutationObserver = Arc<dyn MutationObserver>;
pub type SharedLifecycleObserver = Arc<dyn LifecycleObserver>;
