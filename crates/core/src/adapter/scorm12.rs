use super::{RteAdapter, RteSession, RteValue, arg, set_sentinel};
use crate::model::RteVersion;

/// The 1.2 `API` object: `LMSInitialize`, `LMSGetValue`, ...
#[derive(Debug)]
pub struct Scorm12Adapter {
    session: RteSession,
}

impl Scorm12Adapter {
    #[must_use]
    pub fn new(session: RteSession) -> Self {
        Self { session }
    }

    pub fn lms_initialize(&mut self, param: &str) -> bool {
        self.session.invoked("LMSInitialize");
        self.session.initialize(param)
    }

    pub fn lms_finish(&mut self, param: &str) -> bool {
        self.session.invoked("LMSFinish");
        self.session.terminate(param)
    }

    pub fn lms_get_value(&mut self, key: &str) -> String {
        self.session.invoked("LMSGetValue");
        self.session.get_value(key)
    }

    pub fn lms_set_value(&mut self, key: &str, value: &str) -> String {
        self.session.invoked("LMSSetValue");
        set_sentinel(self.session.set_value(key, value))
    }

    pub fn lms_commit(&mut self, param: &str) -> bool {
        self.session.invoked("LMSCommit");
        self.session.commit(param)
    }

    pub fn lms_get_last_error(&mut self) -> Option<u16> {
        self.session.invoked("LMSGetLastError");
        self.session.last_error()
    }

    pub fn lms_get_error_string(&mut self, code: &str) -> String {
        self.session.invoked("LMSGetErrorString");
        self.session.error_string(code)
    }

    pub fn lms_get_diagnostic(&mut self, code: &str) -> String {
        self.session.invoked("LMSGetDiagnostic");
        self.session.diagnostic(code)
    }

    #[must_use]
    pub fn into_session(self) -> RteSession {
        self.session
    }
}

impl RteAdapter for Scorm12Adapter {
    fn version(&self) -> RteVersion {
        RteVersion::Scorm12
    }

    fn invoke(&mut self, method: &str, args: &[&str]) -> Option<RteValue> {
        let value = match method {
            "LMSInitialize" => RteValue::Bool(self.lms_initialize(arg(args, 0))),
            "LMSFinish" => RteValue::Bool(self.lms_finish(arg(args, 0))),
            "LMSGetValue" => RteValue::Text(self.lms_get_value(arg(args, 0))),
            "LMSSetValue" => RteValue::Text(self.lms_set_value(arg(args, 0), arg(args, 1))),
            "LMSCommit" => RteValue::Bool(self.lms_commit(arg(args, 0))),
            "LMSGetLastError" => RteValue::Code(self.lms_get_last_error()),
            "LMSGetErrorString" => RteValue::Text(self.lms_get_error_string(arg(args, 0))),
            "LMSGetDiagnostic" => RteValue::Text(self.lms_get_diagnostic(arg(args, 0))),
            _ => return None,
        };
        Some(value)
    }

    fn session(&self) -> &RteSession {
        &self.session
    }
}
