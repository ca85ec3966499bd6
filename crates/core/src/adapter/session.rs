use crate::catalog::{ErrorCatalog, NO_ERROR};
use crate::cmi::CmiStore;
use crate::error::{CallKind, RteError};
use crate::events::{LifecycleEvent, SharedLifecycleObserver};
use crate::model::RteVersion;
use crate::sequencer::{CallSequencer, SessionState};

/// Shared machinery behind both adapter editions: call sequencing, the CMI
/// Store, last-error bookkeeping and lifecycle notifications.
///
/// One `RteSession` lives for exactly one frame load.
pub struct RteSession {
    version: RteVersion,
    catalog: &'static ErrorCatalog,
    sequencer: CallSequencer,
    store: CmiStore,
    last_error: Option<u16>,
    observers: Vec<SharedLifecycleObserver>,
}

impl RteSession {
    #[must_use]
    pub fn new(version: RteVersion, store: CmiStore) -> Self {
        Self {
            version,
            catalog: ErrorCatalog::for_version(version),
            sequencer: CallSequencer::new(),
            store,
            last_error: None,
            observers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_lifecycle_observer(mut self, observer: SharedLifecycleObserver) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn version(&self) -> RteVersion {
        self.version
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.sequencer.state()
    }

    #[must_use]
    pub fn store(&self) -> &CmiStore {
        &self.store
    }

    /// `None` until the first call that records an outcome.
    #[must_use]
    pub fn last_error(&self) -> Option<u16> {
        self.last_error
    }

    pub(crate) fn invoked(&self, method: &'static str) {
        self.emit(&LifecycleEvent::Invoked { method });
    }

    pub(crate) fn initialize(&mut self, param: &str) -> bool {
        let result = check_empty_param(param, CallKind::Initialize)
            .and_then(|()| self.sequencer.initialize());
        self.record(result).is_some()
    }

    pub(crate) fn terminate(&mut self, param: &str) -> bool {
        let result = check_empty_param(param, CallKind::Terminate)
            .and_then(|()| self.sequencer.ensure_live(CallKind::Terminate));
        if self.record(result).is_none() {
            return false;
        }
        // Final commit precedes the state change so observers see a live
        // snapshot of the closing session.
        self.emit(&LifecycleEvent::Terminated(self.store.snapshot()));
        self.sequencer.terminate().is_ok()
    }

    pub(crate) fn get_value(&mut self, key: &str) -> String {
        let result = self
            .sequencer
            .ensure_live(CallKind::GetValue)
            .and_then(|()| {
                if key.trim().is_empty() {
                    Err(RteError::EmptyKey {
                        call: CallKind::GetValue,
                    })
                } else {
                    Ok(())
                }
            });
        match self.record(result) {
            Some(()) => self.store.get(key).to_string(),
            None => String::new(),
        }
    }

    pub(crate) fn set_value(&mut self, key: &str, value: &str) -> bool {
        // An empty key fails in every state and never reaches the store.
        let result = if key.trim().is_empty() {
            Err(RteError::EmptyKey {
                call: CallKind::SetValue,
            })
        } else {
            self.sequencer
                .ensure_live(CallKind::SetValue)
                .and_then(|()| self.store.set(key, value))
        };
        self.record(result).is_some()
    }

    pub(crate) fn commit(&mut self, param: &str) -> bool {
        let result = check_empty_param(param, CallKind::Commit)
            .and_then(|()| self.sequencer.ensure_live(CallKind::Commit));
        if self.record(result).is_none() {
            return false;
        }
        self.emit(&LifecycleEvent::Committed(self.store.snapshot()));
        true
    }

    pub(crate) fn error_string(&self, code: &str) -> String {
        self.catalog.error_string(code).to_string()
    }

    pub(crate) fn diagnostic(&self, code: &str) -> String {
        self.catalog.diagnostic(code).to_string()
    }

    fn record<T>(&mut self, result: Result<T, RteError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = Some(NO_ERROR);
                Some(value)
            }
            Err(err) => {
                if let Some(code) = self.catalog.code_for(&err) {
                    self.last_error = Some(code);
                }
                None
            }
        }
    }

    fn emit(&self, event: &LifecycleEvent) {
        for observer in &self.observers {
            observer.on_lifecycle(event);
        }
    }
}

fn check_empty_param(param: &str, call: CallKind) -> Result<(), RteError> {
    if param.is_empty() {
        Ok(())
    } else {
        Err(RteError::InvalidArgument { call })
    }
}

impl std::fmt::Debug for RteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RteSession")
            .field("version", &self.version)
            .field("state", &self.sequencer.state())
            .field("last_error", &self.last_error)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
