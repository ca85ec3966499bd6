//! Version-specific error tables.
//!
//! The two editions number their errors independently, so each keeps its own
//! table and its own mapping from `RteError` to a code. Looking up a code that
//! only exists in the other edition's table is treated as an unknown code.

use thiserror::Error;

use crate::error::{CallKind, RteError};
use crate::model::RteVersion;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("unknown error code {code} for version {version}")]
    UnknownCode { code: u16, version: RteVersion },

    #[error("error code is not numeric: {0:?}")]
    NotNumeric(String),
}

/// One row of an error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEntry {
    pub code: u16,
    pub short: &'static str,
    pub diagnostic: &'static str,
}

pub const NO_ERROR: u16 = 0;

#[derive(Debug)]
pub struct ErrorCatalog {
    version: RteVersion,
    entries: &'static [ErrorEntry],
}

const fn entry(code: u16, short: &'static str, diagnostic: &'static str) -> ErrorEntry {
    ErrorEntry {
        code,
        short,
        diagnostic,
    }
}

static SCORM12_ENTRIES: &[ErrorEntry] = &[
    entry(0, "No error", "No error occurred, the previous API call was successful."),
    entry(101, "General exception", "An unexpected exception occurred; the call was made out of sequence or the session is already active."),
    entry(201, "Invalid argument error", "An argument passed to the API call is invalid, such as an empty element name or a non-empty lifecycle parameter."),
    entry(202, "Element cannot have children", "The data model element does not support the _children keyword."),
    entry(203, "Element not an array. Cannot have count.", "The data model element does not support the _count keyword."),
    entry(301, "Not initialized", "The API call was made before LMSInitialize."),
    entry(401, "Not implemented error", "The data model element is not implemented by this runtime."),
    entry(402, "Invalid set value, element is a keyword", "Keywords such as _children and _count cannot be set."),
    entry(403, "Element is read only", "The data model element is read only and cannot be set."),
    entry(404, "Element is write only", "The data model element is write only and cannot be read."),
    entry(405, "Incorrect Data Type", "The value is not valid for the data model element."),
];

static SCORM2004_ENTRIES: &[ErrorEntry] = &[
    entry(0, "No Error", "No error occurred, the previous API call was successful."),
    entry(101, "General Exception", "An unexpected exception occurred."),
    entry(102, "General Initialization Failure", "The communication session could not be initialized."),
    entry(103, "Already Initialized", "Initialize was called on a session that is already initialized."),
    entry(104, "Content Instance Terminated", "Initialize was called after the session was terminated."),
    entry(111, "General Termination Failure", "The communication session could not be terminated."),
    entry(112, "Termination Before Initialization", "Terminate was called before Initialize."),
    entry(113, "Termination After Termination", "Terminate was called on a session that is already terminated."),
    entry(122, "Retrieve Data Before Initialization", "GetValue was called before Initialize."),
    entry(123, "Retrieve Data After Termination", "GetValue was called after Terminate."),
    entry(132, "Store Data Before Initialization", "SetValue was called before Initialize."),
    entry(133, "Store Data After Termination", "SetValue was called after Terminate."),
    entry(142, "Commit Before Initialization", "Commit was called before Initialize."),
    entry(143, "Commit After Termination", "Commit was called after Terminate."),
    entry(201, "General Argument Error", "An argument passed to the API call is invalid."),
    entry(301, "General Get Failure", "GetValue failed, for example because the element name was empty."),
    entry(351, "General Set Failure", "SetValue failed, for example because the element name was empty."),
    entry(391, "General Commit Failure", "Commit failed."),
    entry(401, "Undefined Data Model Element", "The data model element name is not defined."),
    entry(402, "Unimplemented Data Model Element", "The data model element is not implemented by this runtime."),
    entry(403, "Data Model Element Value Not Initialized", "The data model element has not been given a value yet."),
    entry(404, "Data Model Element Is Read Only", "The data model element is read only and cannot be set."),
    entry(405, "Data Model Element Is Write Only", "The data model element is write only and cannot be read."),
    entry(406, "Data Model Element Type Mismatch", "The value does not match the data model element type."),
    entry(407, "Data Model Element Value Out Of Range", "The value is outside the allowed range."),
    entry(408, "Data Model Dependency Not Established", "A required dependent element has not been set."),
];

static SCORM12_CATALOG: ErrorCatalog = ErrorCatalog {
    version: RteVersion::Scorm12,
    entries: SCORM12_ENTRIES,
};

static SCORM2004_CATALOG: ErrorCatalog = ErrorCatalog {
    version: RteVersion::Scorm2004,
    entries: SCORM2004_ENTRIES,
};

impl ErrorCatalog {
    #[must_use]
    pub fn for_version(version: RteVersion) -> &'static ErrorCatalog {
        match version {
            RteVersion::Scorm12 => &SCORM12_CATALOG,
            RteVersion::Scorm2004 => &SCORM2004_CATALOG,
        }
    }

    #[must_use]
    pub fn version(&self) -> RteVersion {
        self.version
    }

    /// Find the table row for `code`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownCode` if this edition has no such code.
    pub fn lookup(&self, code: u16) -> Result<&'static ErrorEntry, CatalogError> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .ok_or(CatalogError::UnknownCode {
                code,
                version: self.version,
            })
    }

    /// Parse a code the way content passes it on the wire (`"101"`).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotNumeric` or `CatalogError::UnknownCode`.
    pub fn lookup_wire(&self, raw: &str) -> Result<&'static ErrorEntry, CatalogError> {
        let code = raw
            .trim()
            .parse::<u16>()
            .map_err(|_| CatalogError::NotNumeric(raw.to_string()))?;
        self.lookup(code)
    }

    /// Short message for a wire code, or `""` when the code is unknown.
    #[must_use]
    pub fn error_string(&self, raw: &str) -> &'static str {
        self.lookup_wire(raw).map_or("", |e| e.short)
    }

    /// Diagnostic text for a wire code, or `""` when the code is unknown.
    #[must_use]
    pub fn diagnostic(&self, raw: &str) -> &'static str {
        self.lookup_wire(raw).map_or("", |e| e.diagnostic)
    }

    /// Code this edition reports for `error`.
    ///
    /// `None` means the edition does not signal the condition at all.
    #[must_use]
    pub fn code_for(&self, error: &RteError) -> Option<u16> {
        match self.version {
            RteVersion::Scorm12 => scorm12_code(error),
            RteVersion::Scorm2004 => Some(scorm2004_code(error)),
        }
    }
}

fn scorm12_code(error: &RteError) -> Option<u16> {
    match error {
        RteError::InvalidArgument { .. } | RteError::EmptyKey { .. } => Some(201),
        RteError::AlreadyInitialized
        | RteError::InstanceTerminated
        | RteError::AfterTermination { .. } => Some(101),
        // Reading before LMSInitialize quietly yields "".
        RteError::NotInitialized {
            call: CallKind::GetValue,
        } => None,
        RteError::NotInitialized { .. } => Some(301),
        RteError::ReadOnly { .. } => Some(403),
    }
}

fn scorm2004_code(error: &RteError) -> u16 {
    match error {
        RteError::InvalidArgument { .. } => 201,
        RteError::AlreadyInitialized => 103,
        RteError::InstanceTerminated => 104,
        RteError::NotInitialized { call } => match call {
            CallKind::Initialize => 102,
            CallKind::Terminate => 112,
            CallKind::GetValue => 122,
            CallKind::SetValue => 132,
            CallKind::Commit => 142,
        },
        RteError::AfterTermination { call } => match call {
            CallKind::Initialize => 104,
            CallKind::Terminate => 113,
            CallKind::GetValue => 123,
            CallKind::SetValue => 133,
            CallKind::Commit => 143,
        },
        RteError::EmptyKey { call } => match call {
            CallKind::SetValue => 351,
            _ => 301,
        },
        RteError::ReadOnly { .. } => 404,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_independent() {
        let v12 = ErrorCatalog::for_version(RteVersion::Scorm12);
        let v2004 = ErrorCatalog::for_version(RteVersion::Scorm2004);

        assert_eq!(v12.error_string("101"), "General exception");
        assert_eq!(v2004.error_string("103"), "Already Initialized");
        // 103 only exists in the 2004 table.
        assert_eq!(v12.error_string("103"), "");
        assert_eq!(v2004.error_string("405"), "Data Model Element Is Write Only");
    }

    #[test]
    fn unknown_or_garbage_codes_yield_empty_strings() {
        let catalog = ErrorCatalog::for_version(RteVersion::Scorm2004);
        assert_eq!(catalog.error_string("999"), "");
        assert_eq!(catalog.diagnostic("abc"), "");
        assert!(matches!(
            catalog.lookup(999),
            Err(CatalogError::UnknownCode { code: 999, .. })
        ));
        assert!(matches!(
            catalog.lookup_wire("x"),
            Err(CatalogError::NotNumeric(_))
        ));
    }

    #[test]
    fn already_initialized_codes_differ_per_version() {
        let err = RteError::AlreadyInitialized;
        assert_eq!(
            ErrorCatalog::for_version(RteVersion::Scorm12).code_for(&err),
            Some(101)
        );
        assert_eq!(
            ErrorCatalog::for_version(RteVersion::Scorm2004).code_for(&err),
            Some(103)
        );
    }

    #[test]
    fn scorm12_get_before_initialize_is_silent() {
        let catalog = ErrorCatalog::for_version(RteVersion::Scorm12);
        assert_eq!(
            catalog.code_for(&RteError::NotInitialized {
                call: CallKind::GetValue
            }),
            None
        );
        assert_eq!(
            catalog.code_for(&RteError::NotInitialized {
                call: CallKind::SetValue
            }),
            Some(301)
        );
    }

    #[test]
    fn every_mapped_code_exists_in_its_table() {
        let errors = [
            RteError::InvalidArgument {
                call: CallKind::Commit,
            },
            RteError::AlreadyInitialized,
            RteError::InstanceTerminated,
            RteError::NotInitialized {
                call: CallKind::Terminate,
            },
            RteError::AfterTermination {
                call: CallKind::SetValue,
            },
            RteError::EmptyKey {
                call: CallKind::GetValue,
            },
            RteError::EmptyKey {
                call: CallKind::SetValue,
            },
            RteError::ReadOnly {
                key: "cmi.learner_id".into(),
            },
        ];
        for version in [RteVersion::Scorm12, RteVersion::Scorm2004] {
            let catalog = ErrorCatalog::for_version(version);
            for err in &errors {
                if let Some(code) = catalog.code_for(err) {
                    assert!(catalog.lookup(code).is_ok(), "{version}: {code}");
                }
            }
        }
    }
}
