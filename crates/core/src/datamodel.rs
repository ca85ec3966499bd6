//! Well-known CMI element names for each edition.
//!
//! Only the deriver and launch seeding look at key names; everything else
//! treats the CMI namespace as opaque.

use crate::cmi::CmiStore;
use crate::model::RteVersion;

pub mod scorm12 {
    pub const LESSON_STATUS: &str = "cmi.core.lesson_status";
    pub const SCORE_RAW: &str = "cmi.core.score.raw";
    pub const SCORE_MAX: &str = "cmi.core.score.max";
    pub const SCORE_MIN: &str = "cmi.core.score.min";
    pub const STUDENT_ID: &str = "cmi.core.student_id";
    pub const STUDENT_NAME: &str = "cmi.core.student_name";
    pub const ENTRY: &str = "cmi.core.entry";
}

pub mod scorm2004 {
    pub const COMPLETION_STATUS: &str = "cmi.completion_status";
    pub const SUCCESS_STATUS: &str = "cmi.success_status";
    pub const SCORE_RAW: &str = "cmi.score.raw";
    pub const SCORE_MAX: &str = "cmi.score.max";
    pub const SCORE_MIN: &str = "cmi.score.min";
    pub const LEARNER_ID: &str = "cmi.learner_id";
    pub const LEARNER_NAME: &str = "cmi.learner_name";
    pub const ENTRY: &str = "cmi.entry";
}

/// Values that carry no learner activity when they are all a key holds.
pub(crate) const PLACEHOLDER_VALUES: &[&str] = &["", "not attempted", "unknown"];

/// Read-only values the host makes available to the content at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    pub learner_id: Option<String>,
    pub learner_name: Option<String>,
}

impl LaunchContext {
    #[must_use]
    pub fn new(learner_id: impl Into<String>, learner_name: impl Into<String>) -> Self {
        Self {
            learner_id: Some(learner_id.into()),
            learner_name: Some(learner_name.into()),
        }
    }

    /// Seed the edition's launch elements into `store`.
    ///
    /// Entry mode is `ab-initio` for an attempt without any persisted data and
    /// `resume` otherwise.
    pub fn apply(&self, version: RteVersion, store: &mut CmiStore) {
        let (id_key, name_key, entry_key) = match version {
            RteVersion::Scorm12 => (scorm12::STUDENT_ID, scorm12::STUDENT_NAME, scorm12::ENTRY),
            RteVersion::Scorm2004 => (
                scorm2004::LEARNER_ID,
                scorm2004::LEARNER_NAME,
                scorm2004::ENTRY,
            ),
        };

        let entry = if store.is_empty() { "ab-initio" } else { "resume" };
        store.seed_launch_value(entry_key, entry);
        if let Some(id) = &self.learner_id {
            store.seed_launch_value(id_key, id.clone());
        }
        if let Some(name) = &self.learner_name {
            store.seed_launch_value(name_key, name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmi::CmiData;

    #[test]
    fn fresh_attempt_launches_ab_initio() {
        let mut store = CmiStore::new();
        LaunchContext::new("u-1", "Doe, Jane").apply(RteVersion::Scorm12, &mut store);

        assert_eq!(store.get(scorm12::ENTRY), "ab-initio");
        assert_eq!(store.get(scorm12::STUDENT_ID), "u-1");
        assert_eq!(store.get(scorm12::STUDENT_NAME), "Doe, Jane");
        assert!(store.snapshot().data.is_empty());
    }

    #[test]
    fn attempt_with_data_resumes() {
        let mut data = CmiData::new();
        data.insert(scorm2004::COMPLETION_STATUS.into(), "incomplete".into());
        let mut store = CmiStore::seeded(data, 3);
        LaunchContext::default().apply(RteVersion::Scorm2004, &mut store);

        assert_eq!(store.get(scorm2004::ENTRY), "resume");
        assert_eq!(store.get(scorm2004::LEARNER_ID), "");
    }
}
