use super::{RteAdapter, RteSession, RteValue, arg, set_sentinel};
use crate::model::RteVersion;

/// The 2004 `API_1484_11` object: `Initialize`, `GetValue`, ...
#[derive(Debug)]
pub struct Scorm2004Adapter {
    session: RteSession,
}

impl Scorm2004Adapter {
    #[must_use]
    pub fn new(session: RteSession) -> Self {
        Self { session }
    }

    pub fn initialize(&mut self, param: &str) -> bool {
        self.session.invoked("Initialize");
        self.session.initialize(param)
    }

    pub fn terminate(&mut self, param: &str) -> bool {
        self.session.invoked("Terminate");
        self.session.terminate(param)
    }

    pub fn get_value(&mut self, key: &str) -> String {
        self.session.invoked("GetValue");
        self.session.get_value(key)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> String {
        self.session.invoked("SetValue");
        set_sentinel(self.session.set_value(key, value))
    }

    pub fn commit(&mut self, param: &str) -> bool {
        self.session.invoked("Commit");
        self.session.commit(param)
    }

    pub fn get_last_error(&mut self) -> Option<u16> {
        self.session.invoked("GetLastError");
        self.session.last_error()
    }

    pub fn get_error_string(&mut self, code: &str) -> String {
        self.session.invoked("GetErrorString");
        self.session.error_string(code)
    }

    pub fn get_diagnostic(&mut self, code: &str) -> String {
        self.session.invoked("GetDiagnostic");
        self.session.diagnostic(code)
    }

    #[must_use]
    pub fn into_session(self) -> RteSession {
        self.session
    }
}

impl RteAdapter for Scorm2004Adapter {
    fn version(&self) -> RteVersion {
        RteVersion::Scorm2004
    }

    fn invoke(&mut self, method: &str, args: &[&str]) -> Option<RteValue> {
        let value = match method {
            "Initialize" => RteValue::Bool(self.initialize(arg(args, 0))),
            "Terminate" => RteValue::Bool(self.terminate(arg(args, 0))),
            "GetValue" => RteValue::Text(self.get_value(arg(args, 0))),
            "SetValue" => RteValue::Text(self.set_value(arg(args, 0), arg(args, 1))),
            "Commit" => RteValue::Bool(self.commit(arg(args, 0))),
            "GetLastError" => RteValue::Code(self.get_last_error()),
            "GetErrorString" => RteValue::Text(self.get_error_string(arg(args, 0))),
            "GetDiagnostic" => RteValue::Text(self.get_diagnostic(arg(args, 0))),
            _ => return None,
        };
        Some(value)
    }

    fn session(&self) -> &RteSession {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmi::CmiStore;
    use crate::events::{LifecycleEvent, SharedLifecycleObserver};
    use std::sync::{Arc, Mutex};

    fn adapter() -> Scorm2004Adapter {
        Scorm2004Adapter::new(RteSession::new(RteVersion::Scorm2004, CmiStore::new()))
    }

    #[test]
    fn double_initialize_reports_already_initialized() {
        let mut api = adapter();
        assert!(api.initialize(""));
        assert!(!api.initialize(""));
        assert_eq!(api.get_last_error(), Some(103));
        assert_eq!(api.get_error_string("103"), "Already Initialized");
    }

    #[test]
    fn initialize_after_terminate_reports_instance_terminated() {
        let mut api = adapter();
        api.initialize("");
        api.terminate("");
        assert!(!api.initialize(""));
        assert_eq!(api.get_last_error(), Some(104));
    }

    #[test]
    fn sequencing_errors_are_call_specific() {
        let mut api = adapter();
        assert_eq!(api.get_value("cmi.location"), "");
        assert_eq!(api.get_last_error(), Some(122));
        assert_eq!(api.set_value("cmi.location", "1"), "false");
        assert_eq!(api.get_last_error(), Some(132));
        assert!(!api.commit(""));
        assert_eq!(api.get_last_error(), Some(142));
        assert!(!api.terminate(""));
        assert_eq!(api.get_last_error(), Some(112));

        api.initialize("");
        api.terminate("");
        assert_eq!(api.get_value("cmi.location"), "");
        assert_eq!(api.get_last_error(), Some(123));
        assert_eq!(api.set_value("cmi.location", "1"), "false");
        assert_eq!(api.get_last_error(), Some(133));
        assert!(!api.commit(""));
        assert_eq!(api.get_last_error(), Some(143));
        assert!(!api.terminate(""));
        assert_eq!(api.get_last_error(), Some(113));
    }

    #[test]
    fn empty_keys_use_get_and_set_failures() {
        let mut api = adapter();
        api.initialize("");
        assert_eq!(api.get_value(""), "");
        assert_eq!(api.get_last_error(), Some(301));
        assert_eq!(api.set_value("", "x"), "false");
        assert_eq!(api.get_last_error(), Some(351));
        assert!(api.session().store().is_empty());
    }

    #[test]
    fn commit_and_terminate_emit_snapshots() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer: SharedLifecycleObserver = Arc::new(move |e: &LifecycleEvent| {
            if !matches!(e, LifecycleEvent::Invoked { .. }) {
                sink.lock().unwrap().push(e.clone());
            }
        });
        let mut api = Scorm2004Adapter::new(
            RteSession::new(RteVersion::Scorm2004, CmiStore::new())
                .with_lifecycle_observer(observer),
        );

        api.initialize("");
        api.set_value("cmi.completion_status", "completed");
        assert!(api.commit(""));
        assert!(api.terminate(""));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        let LifecycleEvent::Committed(commit) = &events[0] else {
            panic!("expected commit, got {:?}", events[0]);
        };
        assert_eq!(commit.revision, 1);
        assert!(matches!(&events[1], LifecycleEvent::Terminated(s) if s.revision == 1));
    }

    #[test]
    fn every_method_reports_invocation() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        let observer: SharedLifecycleObserver = Arc::new(move |e: &LifecycleEvent| {
            if let LifecycleEvent::Invoked { method } = e {
                sink.lock().unwrap().push(*method);
            }
        });
        let mut api = Scorm2004Adapter::new(
            RteSession::new(RteVersion::Scorm2004, CmiStore::new())
                .with_lifecycle_observer(observer),
        );

        api.get_last_error();
        api.invoke("GetDiagnostic", &["0"]);

        assert_eq!(
            names.lock().unwrap().as_slice(),
            &["GetLastError", "GetDiagnostic"]
        );
    }
}
