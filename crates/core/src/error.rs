use std::fmt;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::model::{AttemptError, ModuleError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// The RTE call an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Initialize,
    Terminate,
    GetValue,
    SetValue,
    Commit,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::Initialize => "Initialize",
            CallKind::Terminate => "Terminate",
            CallKind::GetValue => "GetValue",
            CallKind::SetValue => "SetValue",
            CallKind::Commit => "Commit",
        };
        f.write_str(name)
    }
}

/// Protocol-level failures of an RTE call.
///
/// These never escape to the host as `Err`: the session records them as the
/// last error code and the content reads them back through `GetLastError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RteError {
    #[error("{call} expects an empty string argument")]
    InvalidArgument { call: CallKind },

    #[error("session already initialized")]
    AlreadyInitialized,

    #[error("session already terminated, cannot initialize again")]
    InstanceTerminated,

    #[error("{call} called before initialize")]
    NotInitialized { call: CallKind },

    #[error("{call} called after terminate")]
    AfterTermination { call: CallKind },

    #[error("{call} called with an empty key")]
    EmptyKey { call: CallKind },

    #[error("element {key} is read only")]
    ReadOnly { key: String },
}
