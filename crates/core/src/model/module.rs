use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::model::ids::{CourseId, ModuleId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("unknown runtime version: {0}")]
    UnknownVersion(String),

    #[error("entry url cannot be empty")]
    EmptyEntryUrl,

    #[error("locale cannot be empty")]
    EmptyLocale,

    #[error("invalid entry url: {0}")]
    InvalidEntryUrl(String),

    #[error("entry url {entry} is outside of package base {base}")]
    ForeignEntryUrl { entry: String, base: String },
}

//
// ─── RTE VERSION ──────────────────────────────────────────────────────────────
//

/// Which edition of the run-time standard a content package was built for.
///
/// The two editions expose different method names, key namespaces and error
/// numbering, so everything version-specific branches on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RteVersion {
    #[serde(rename = "1.2")]
    Scorm12,
    #[serde(rename = "2004")]
    Scorm2004,
}

impl RteVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RteVersion::Scorm12 => "1.2",
            RteVersion::Scorm2004 => "2004",
        }
    }
}

impl fmt::Display for RteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RteVersion {
    type Err = ModuleError;

    /// Accepts `"1.2"` and `"2004"`, including edition suffixes such as
    /// `"2004 4th Edition"` that manifests commonly carry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "1.2" {
            return Ok(RteVersion::Scorm12);
        }
        if trimmed == "2004" || trimmed.starts_with("2004 ") {
            return Ok(RteVersion::Scorm2004);
        }
        Err(ModuleError::UnknownVersion(s.to_string()))
    }
}

//
// ─── MODULE ───────────────────────────────────────────────────────────────────
//

/// Immutable descriptor of one uploaded content package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    id: ModuleId,
    course_id: CourseId,
    version: RteVersion,
    locale: String,
    version_number: u32,
    entry_url: String,
}

impl Module {
    /// Build a module descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyEntryUrl` or `ModuleError::EmptyLocale` when
    /// the respective field is blank.
    pub fn new(
        id: ModuleId,
        course_id: CourseId,
        version: RteVersion,
        locale: impl Into<String>,
        version_number: u32,
        entry_url: impl Into<String>,
    ) -> Result<Self, ModuleError> {
        let locale = locale.into();
        let entry_url = entry_url.into();
        if entry_url.trim().is_empty() {
            return Err(ModuleError::EmptyEntryUrl);
        }
        if locale.trim().is_empty() {
            return Err(ModuleError::EmptyLocale);
        }
        Ok(Self {
            id,
            course_id,
            version,
            locale,
            version_number,
            entry_url,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn version(&self) -> RteVersion {
        self.version
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[must_use]
    pub fn version_number(&self) -> u32 {
        self.version_number
    }

    #[must_use]
    pub fn entry_url(&self) -> &str {
        &self.entry_url
    }

    /// Resolve the entry point against the base URL the package is served from.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidEntryUrl` if the entry cannot be joined, or
    /// `ModuleError::ForeignEntryUrl` if it resolves to another origin.
    pub fn launch_url(&self, base: &Url) -> Result<Url, ModuleError> {
        let resolved = base
            .join(&self.entry_url)
            .map_err(|e| ModuleError::InvalidEntryUrl(e.to_string()))?;
        if resolved.origin() != base.origin() {
            return Err(ModuleError::ForeignEntryUrl {
                entry: self.entry_url.clone(),
                base: base.to_string(),
            });
        }
        Ok(resolved)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn module(entry: &str) -> Module {
        Module::new(
            ModuleId::new(1),
            CourseId::new(2),
            RteVersion::Scorm12,
            "en",
            3,
            entry,
        )
        .unwrap()
    }

    #[test]
    fn version_parses_both_editions() {
        assert_eq!("1.2".parse::<RteVersion>().unwrap(), RteVersion::Scorm12);
        assert_eq!("2004".parse::<RteVersion>().unwrap(), RteVersion::Scorm2004);
        assert_eq!(
            "2004 4th Edition".parse::<RteVersion>().unwrap(),
            RteVersion::Scorm2004
        );
        assert!(matches!(
            "1.1".parse::<RteVersion>(),
            Err(ModuleError::UnknownVersion(_))
        ));
    }

    #[test]
    fn version_displays_as_wire_string() {
        assert_eq!(RteVersion::Scorm2004.to_string(), "2004");
        assert_eq!(RteVersion::Scorm12.to_string(), "1.2");
    }

    #[test]
    fn empty_entry_url_is_rejected() {
        let err = Module::new(
            ModuleId::new(1),
            CourseId::new(1),
            RteVersion::Scorm2004,
            "en",
            1,
            "  ",
        )
        .unwrap_err();
        assert_eq!(err, ModuleError::EmptyEntryUrl);
    }

    #[test]
    fn launch_url_joins_relative_entry() {
        let base = Url::parse("https://cdn.example.com/packages/42/").unwrap();
        let url = module("content/index.html").launch_url(&base).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cdn.example.com/packages/42/content/index.html"
        );
    }

    #[test]
    fn launch_url_rejects_other_origin() {
        let base = Url::parse("https://cdn.example.com/packages/42/").unwrap();
        let err = module("https://evil.example.org/index.html")
            .launch_url(&base)
            .unwrap_err();
        assert!(matches!(err, ModuleError::ForeignEntryUrl { .. }));
    }
}
