use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical, version-independent progress status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    Passed,
    Failed,
}

impl ProgressStatus {
    /// Terminal statuses are never regressed by later writes.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressStatus::Completed | ProgressStatus::Passed | ProgressStatus::Failed
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not-started",
            ProgressStatus::InProgress => "in-progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Passed => "passed",
            ProgressStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid progress status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ProgressStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(ProgressStatus::NotStarted),
            "in-progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            "passed" => Ok(ProgressStatus::Passed),
            "failed" => Ok(ProgressStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Numeric score triple. Each part is optional because content packages
/// frequently report only a raw score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub raw: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

impl Score {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.max.is_none() && self.min.is_none()
    }
}

/// Status and score computed from a CMI snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedProgress {
    pub status: ProgressStatus,
    pub score: Option<Score>,
}

impl DerivedProgress {
    #[must_use]
    pub fn not_started() -> Self {
        Self {
            status: ProgressStatus::NotStarted,
            score: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when replacing `self` with `next` would move a terminal attempt
    /// back to a non-terminal status.
    #[must_use]
    pub fn would_regress_to(&self, next: &DerivedProgress) -> bool {
        self.is_terminal() && !next.is_terminal()
    }
}

impl Default for DerivedProgress {
    fn default() -> Self {
        Self::not_started()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ProgressStatus::NotStarted.is_terminal());
        assert!(!ProgressStatus::InProgress.is_terminal());
        assert!(ProgressStatus::Completed.is_terminal());
        assert!(ProgressStatus::Passed.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
    }

    #[test]
    fn status_string_forms_parse_back() {
        for status in [
            ProgressStatus::NotStarted,
            ProgressStatus::InProgress,
            ProgressStatus::Completed,
            ProgressStatus::Passed,
            ProgressStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ProgressStatus>().unwrap(), status);
        }
        assert!("done".parse::<ProgressStatus>().is_err());
    }

    #[test]
    fn regression_only_from_terminal_to_non_terminal() {
        let completed = DerivedProgress {
            status: ProgressStatus::Completed,
            score: None,
        };
        let passed = DerivedProgress {
            status: ProgressStatus::Passed,
            score: None,
        };
        let in_progress = DerivedProgress {
            status: ProgressStatus::InProgress,
            score: None,
        };

        assert!(completed.would_regress_to(&in_progress));
        assert!(!completed.would_regress_to(&passed));
        assert!(!in_progress.would_regress_to(&completed));
    }
}
