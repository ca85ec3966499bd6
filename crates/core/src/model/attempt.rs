use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cmi::CmiData;
use crate::deriver::derive_for_attempt;
use crate::events::Snapshot;
use crate::model::ids::{AttemptId, CourseId, ModuleId};
use crate::model::module::RteVersion;
use crate::model::progress::DerivedProgress;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("completed_at set on an attempt that was never started")]
    CompletedWithoutStart,

    #[error("completed_at set but progress {0} is not terminal")]
    CompletedNotTerminal(String),
}

//
// ─── SNAPSHOT OUTCOME ─────────────────────────────────────────────────────────
//

/// What happened when a CMI snapshot was offered to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Data and progress were replaced.
    Applied,
    /// Data was replaced but the terminal progress was kept.
    ProgressPinned,
    /// The snapshot was not newer than the stored revision; nothing changed.
    Stale,
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// Revisions carry the player session that produced them in their upper
/// bits, so every snapshot of a later session orders after every snapshot
/// of an earlier one.
const SESSION_SHIFT: u32 = 32;

/// One learner's run through one module version.
///
/// Owned by the attempt store. A player session works on a copy of `data`
/// and sends full snapshots back through [`Attempt::apply_snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    id: AttemptId,
    course_id: CourseId,
    module_id: ModuleId,
    data: CmiData,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    progress: DerivedProgress,
    revision: u64,
}

impl Attempt {
    /// A freshly created attempt with no data.
    #[must_use]
    pub fn new(id: AttemptId, course_id: CourseId, module_id: ModuleId) -> Self {
        Self {
            id,
            course_id,
            module_id,
            data: CmiData::new(),
            started_at: None,
            completed_at: None,
            progress: DerivedProgress::not_started(),
            revision: 0,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the timestamps or progress are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        course_id: CourseId,
        module_id: ModuleId,
        data: CmiData,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        progress: DerivedProgress,
        revision: u64,
    ) -> Result<Self, AttemptError> {
        if let Some(completed) = completed_at {
            let Some(started) = started_at else {
                return Err(AttemptError::CompletedWithoutStart);
            };
            if completed < started {
                return Err(AttemptError::InvalidTimeRange);
            }
            if !progress.is_terminal() {
                return Err(AttemptError::CompletedNotTerminal(
                    progress.status.to_string(),
                ));
            }
        }

        Ok(Self {
            id,
            course_id,
            module_id,
            data,
            started_at,
            completed_at,
            progress,
            revision,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn data(&self) -> &CmiData {
        &self.data
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn progress(&self) -> DerivedProgress {
        self.progress
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Session number encoded in the stored revision.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.revision >> SESSION_SHIFT
    }

    /// Open a new player session and return the revision its CMI store
    /// must count from.
    ///
    /// Snapshots still in flight from earlier sessions become stale.
    pub fn begin_session(&mut self) -> u64 {
        self.revision = (self.session() + 1) << SESSION_SHIFT;
        self.revision
    }

    /// Progress recomputed from the stored data, as seen when a frame loads.
    #[must_use]
    pub fn derive(&self, version: RteVersion) -> DerivedProgress {
        derive_for_attempt(version, &self.data, self.started_at.is_some())
    }

    /// Offer a full CMI snapshot as an idempotent upsert.
    ///
    /// Snapshots whose revision is not newer than the stored one are ignored,
    /// so writes that arrive out of order cannot roll data back. A newer
    /// snapshot whose derived progress would take a terminal attempt back to
    /// a non-terminal status still replaces the data, but the terminal
    /// progress is kept.
    pub fn apply_snapshot(
        &mut self,
        version: RteVersion,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> SnapshotOutcome {
        if snapshot.revision <= self.revision {
            return SnapshotOutcome::Stale;
        }

        let started_at = *self.started_at.get_or_insert(now);
        let next = derive_for_attempt(version, &snapshot.data, true);

        self.data = snapshot.data;
        self.revision = snapshot.revision;

        if self.progress.would_regress_to(&next) {
            return SnapshotOutcome::ProgressPinned;
        }

        self.progress = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now.max(started_at));
        }
        SnapshotOutcome::Applied
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::progress::ProgressStatus;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn attempt() -> Attempt {
        Attempt::new(AttemptId::new(1), CourseId::new(1), ModuleId::new(1))
    }

    fn snapshot(revision: u64, pairs: &[(&str, &str)]) -> Snapshot {
        Snapshot {
            revision,
            data: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn first_write_starts_the_attempt() {
        let mut a = attempt();
        let outcome = a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(1, &[("cmi.core.lesson_status", "incomplete")]),
            fixed_now(),
        );

        assert_eq!(outcome, SnapshotOutcome::Applied);
        assert_eq!(a.started_at(), Some(fixed_now()));
        assert_eq!(a.progress().status, ProgressStatus::InProgress);
        assert_eq!(a.completed_at(), None);
    }

    #[test]
    fn reaching_terminal_sets_completed_at_once() {
        let mut a = attempt();
        let t0 = fixed_now();
        a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(1, &[("cmi.core.lesson_status", "completed")]),
            t0,
        );
        a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(2, &[("cmi.core.lesson_status", "passed")]),
            t0 + Duration::minutes(5),
        );

        assert_eq!(a.progress().status, ProgressStatus::Passed);
        assert_eq!(a.completed_at(), Some(t0));
    }

    #[test]
    fn stale_revision_is_ignored() {
        let mut a = attempt();
        a.apply_snapshot(
            RteVersion::Scorm2004,
            snapshot(5, &[("cmi.completion_status", "completed")]),
            fixed_now(),
        );
        let outcome = a.apply_snapshot(
            RteVersion::Scorm2004,
            snapshot(3, &[("cmi.completion_status", "incomplete")]),
            fixed_now(),
        );

        assert_eq!(outcome, SnapshotOutcome::Stale);
        assert_eq!(a.revision(), 5);
        assert_eq!(a.data()["cmi.completion_status"], "completed");
    }

    #[test]
    fn new_session_outranks_writes_from_the_previous_one() {
        let mut a = attempt();
        a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(2, &[("cmi.core.lesson_location", "2")]),
            fixed_now(),
        );

        let base = a.begin_session();
        assert_eq!(a.session(), 1);
        assert_eq!(a.begin_session(), base * 2);
        assert_eq!(a.session(), 2);

        let late = a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(base + 9, &[("cmi.core.lesson_location", "9")]),
            fixed_now(),
        );
        assert_eq!(late, SnapshotOutcome::Stale);

        let current = a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(base * 2 + 1, &[("cmi.core.lesson_status", "completed")]),
            fixed_now(),
        );
        assert_eq!(current, SnapshotOutcome::Applied);
        assert_eq!(a.progress().status, ProgressStatus::Completed);
        assert!(!a.data().contains_key("cmi.core.lesson_location"));
    }

    #[test]
    fn newer_partial_snapshot_cannot_regress_terminal_progress() {
        let mut a = attempt();
        a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(
                1,
                &[("cmi.core.lesson_status", "completed"), ("cmi.core.score.raw", "80")],
            ),
            fixed_now(),
        );
        let outcome = a.apply_snapshot(
            RteVersion::Scorm12,
            snapshot(2, &[("cmi.suspend_data", "resume-here")]),
            fixed_now(),
        );

        assert_eq!(outcome, SnapshotOutcome::ProgressPinned);
        assert_eq!(a.progress().status, ProgressStatus::Completed);
        assert!(a.completed_at().is_some());
        assert_eq!(a.data()["cmi.suspend_data"], "resume-here");
    }

    #[test]
    fn persisted_completion_requires_terminal_progress() {
        let err = Attempt::from_persisted(
            AttemptId::new(1),
            CourseId::new(1),
            ModuleId::new(1),
            CmiData::new(),
            Some(fixed_now()),
            Some(fixed_now()),
            DerivedProgress::not_started(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::CompletedNotTerminal(_)));

        let err = Attempt::from_persisted(
            AttemptId::new(1),
            CourseId::new(1),
            ModuleId::new(1),
            CmiData::new(),
            None,
            Some(fixed_now()),
            DerivedProgress::not_started(),
            1,
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::CompletedWithoutStart);
    }
}
