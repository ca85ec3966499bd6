//! Maps raw CMI data to the platform's canonical progress.
//!
//! Pure functions: the same `(version, data)` always yields the same
//! `DerivedProgress`. Numbers are parsed here and nowhere else; the CMI data
//! itself keeps strings.

use crate::cmi::CmiData;
use crate::datamodel::{PLACEHOLDER_VALUES, scorm12, scorm2004};
use crate::model::{DerivedProgress, ProgressStatus, RteVersion, Score};

/// Derive status and score from a CMI snapshot.
#[must_use]
pub fn derive_progress(version: RteVersion, data: &CmiData) -> DerivedProgress {
    match version {
        RteVersion::Scorm12 => DerivedProgress {
            status: scorm12_status(data),
            score: read_score(
                data,
                scorm12::SCORE_RAW,
                scorm12::SCORE_MAX,
                scorm12::SCORE_MIN,
            ),
        },
        RteVersion::Scorm2004 => DerivedProgress {
            status: scorm2004_status(data),
            score: read_score(
                data,
                scorm2004::SCORE_RAW,
                scorm2004::SCORE_MAX,
                scorm2004::SCORE_MIN,
            ),
        },
    }
}

/// Like [`derive_progress`], but an attempt that has already been started is
/// never reported as `not-started`.
#[must_use]
pub fn derive_for_attempt(version: RteVersion, data: &CmiData, started: bool) -> DerivedProgress {
    let mut progress = derive_progress(version, data);
    if started && progress.status == ProgressStatus::NotStarted {
        progress.status = ProgressStatus::InProgress;
    }
    progress
}

fn scorm12_status(data: &CmiData) -> ProgressStatus {
    match value(data, scorm12::LESSON_STATUS) {
        "completed" => ProgressStatus::Completed,
        "passed" => ProgressStatus::Passed,
        "failed" => ProgressStatus::Failed,
        _ if has_activity(data) => ProgressStatus::InProgress,
        _ => ProgressStatus::NotStarted,
    }
}

fn scorm2004_status(data: &CmiData) -> ProgressStatus {
    let completion = value(data, scorm2004::COMPLETION_STATUS);
    let success = value(data, scorm2004::SUCCESS_STATUS);

    match (completion, success) {
        ("completed", "passed") => ProgressStatus::Passed,
        ("completed", "failed") => ProgressStatus::Failed,
        ("completed", _) => ProgressStatus::Completed,
        _ if has_activity(data) => ProgressStatus::InProgress,
        _ => ProgressStatus::NotStarted,
    }
}

fn value<'a>(data: &'a CmiData, key: &str) -> &'a str {
    data.get(key).map_or("", |v| v.trim())
}

fn has_activity(data: &CmiData) -> bool {
    data.values()
        .any(|v| !PLACEHOLDER_VALUES.contains(&v.trim()))
}

fn read_score(data: &CmiData, raw: &str, max: &str, min: &str) -> Option<Score> {
    let score = Score {
        raw: parse_number(data, raw),
        max: parse_number(data, max),
        min: parse_number(data, min),
    };
    (!score.is_empty()).then_some(score)
}

fn parse_number(data: &CmiData, key: &str) -> Option<f64> {
    data.get(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}
