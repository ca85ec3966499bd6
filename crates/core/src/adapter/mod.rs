//! Run-time API surfaces the content packages call.
//!
//! Both editions share [`RteSession`]; each adapter only maps its own method
//! names onto it. The error catalog and derivation rule follow from the
//! session's version.

mod scorm12;
mod scorm2004;
mod session;

pub use scorm12::Scorm12Adapter;
pub use scorm2004::Scorm2004Adapter;
pub use session::RteSession;

use crate::model::RteVersion;

/// Wire-format result of an RTE call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RteValue {
    /// Lifecycle calls.
    Bool(bool),
    /// Value and message calls, including the `"true"`/`"false"` set sentinels.
    Text(String),
    /// `GetLastError`: `None` before any call recorded an outcome.
    Code(Option<u16>),
}

impl RteValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RteValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RteValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for RteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RteValue::Bool(b) => write!(f, "{b}"),
            RteValue::Text(s) => write!(f, "{s:?}"),
            RteValue::Code(Some(code)) => write!(f, "{code}"),
            RteValue::Code(None) => f.write_str("null"),
        }
    }
}

pub(crate) fn set_sentinel(ok: bool) -> String {
    if ok { "true" } else { "false" }.to_string()
}

/// Common surface of both editions' adapters.
pub trait RteAdapter: Send {
    fn version(&self) -> RteVersion;

    /// Dispatch a call by its exact wire method name.
    ///
    /// Returns `None` for names this edition does not define; nothing is
    /// recorded in that case. Missing arguments are treated as `""`.
    fn invoke(&mut self, method: &str, args: &[&str]) -> Option<RteValue>;

    fn session(&self) -> &RteSession;
}

/// Build the adapter matching the session's version.
#[must_use]
pub fn adapter_for(session: RteSession) -> Box<dyn RteAdapter> {
    match session.version() {
        RteVersion::Scorm12 => Box::new(Scorm12Adapter::new(session)),
        RteVersion::Scorm2004 => Box::new(Scorm2004Adapter::new(session)),
    }
}

pub(crate) fn arg<'a>(args: &[&'a str], index: usize) -> &'a str {
    args.get(index).copied().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmi::CmiStore;

    #[test]
    fn adapter_selection_follows_version() {
        let a = adapter_for(RteSession::new(RteVersion::Scorm12, CmiStore::new()));
        assert_eq!(a.version(), RteVersion::Scorm12);

        let mut b = adapter_for(RteSession::new(RteVersion::Scorm2004, CmiStore::new()));
        assert_eq!(b.version(), RteVersion::Scorm2004);
        // 1.2 names are not part of the 2004 surface.
        assert_eq!(b.invoke("LMSInitialize", &[""]), None);
        assert_eq!(b.invoke("Initialize", &[""]), Some(RteValue::Bool(true)));
    }

    #[test]
    fn wire_display() {
        assert_eq!(RteValue::Bool(true).to_string(), "true");
        assert_eq!(RteValue::Text("x".into()).to_string(), "\"x\"");
        assert_eq!(RteValue::Code(None).to_string(), "null");
        assert_eq!(RteValue::Code(Some(101)).to_string(), "101");
    }
}
