use std::env;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use rte_core::CmiData;
use rte_core::model::{
    Attempt, AttemptId, CourseId, DerivedProgress, ModuleId, ProgressStatus, Score,
    SnapshotOutcome,
};
use serde::{Deserialize, Serialize};
use storage::repository::{AttemptUpdate, AttemptWrite, AttemptWriter, StorageError};

use crate::error::RemoteStoreError;

#[derive(Clone, Debug)]
pub struct RemoteStoreConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

impl RemoteStoreConfig {
    /// Reads `PLAYER_REMOTE_URL` and the optional `PLAYER_REMOTE_TOKEN`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("PLAYER_REMOTE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_token = env::var("PLAYER_REMOTE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(Self {
            base_url,
            api_token,
        })
    }
}

/// Attempt store reached over HTTP.
///
/// Each write is a `PATCH` of the full CMI snapshot; the server answers with
/// the attempt as stored, including its derived progress.
#[derive(Clone)]
pub struct RemoteAttemptStore {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl RemoteAttemptStore {
    /// # Errors
    ///
    /// `RemoteStoreError::InvalidUrl` if the base URL does not parse.
    pub fn new(config: RemoteStoreConfig) -> Result<Self, RemoteStoreError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| RemoteStoreError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            api_token: config.api_token,
        })
    }

    fn attempt_url(&self, course: CourseId, module: ModuleId, attempt: AttemptId) -> String {
        format!(
            "{}/courses/{course}/modules/{module}/attempts/{attempt}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// Send one snapshot.
    ///
    /// The server applies the same revision ordering as local storage; an
    /// answer carrying a different revision than the one sent means the
    /// snapshot was stale there.
    ///
    /// # Errors
    ///
    /// Returns `RemoteStoreError` when the request fails, the server answers
    /// with a non-success status, or the returned attempt is inconsistent.
    pub async fn patch(&self, update: &AttemptUpdate) -> Result<AttemptWrite, RemoteStoreError> {
        let url = self.attempt_url(update.course_id, update.module_id, update.attempt_id);
        let body = PatchAttempt {
            data: &update.snapshot.data,
            revision: update.snapshot.revision,
            at: update.at,
        };

        let mut request = self.client.patch(url).json(&body);
        if let Some(token) = self.api_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RemoteStoreError::HttpStatus(response.status()));
        }

        let stored: AttemptDto = response.json().await?;
        let attempt = stored.into_attempt()?;
        Ok(AttemptWrite {
            outcome: outcome_of(update.snapshot.revision, &attempt),
            attempt,
        })
    }
}

fn outcome_of(sent: u64, stored: &Attempt) -> SnapshotOutcome {
    if stored.revision() == sent {
        SnapshotOutcome::Applied
    } else {
        SnapshotOutcome::Stale
    }
}

#[async_trait::async_trait]
impl AttemptWriter for RemoteAttemptStore {
    async fn update_attempt(&self, update: AttemptUpdate) -> Result<AttemptWrite, StorageError> {
        self.patch(&update).await.map_err(StorageError::from)
    }
}

/// Writes to a primary attempt store and mirrors every accepted snapshot
/// into the local one, so attempts loaded locally at launch match what the
/// primary holds.
///
/// A failed mirror write is logged and otherwise ignored; the next snapshot
/// carries the full data again.
#[derive(Clone)]
pub struct MirroredAttemptWriter {
    primary: Arc<dyn AttemptWriter>,
    local: Arc<dyn AttemptWriter>,
}

impl MirroredAttemptWriter {
    #[must_use]
    pub fn new(primary: Arc<dyn AttemptWriter>, local: Arc<dyn AttemptWriter>) -> Self {
        Self { primary, local }
    }
}

#[async_trait::async_trait]
impl AttemptWriter for MirroredAttemptWriter {
    async fn update_attempt(&self, update: AttemptUpdate) -> Result<AttemptWrite, StorageError> {
        let attempt_id = update.attempt_id;
        let write = self.primary.update_attempt(update.clone()).await?;
        if write.is_stale() {
            return Ok(write);
        }

        match self.local.update_attempt(update).await {
            Ok(local) if local.attempt.progress() != write.attempt.progress() => log::warn!(
                "attempt {attempt_id}: local copy derived {} but primary store holds {}",
                local.attempt.progress().status,
                write.attempt.progress().status
            ),
            Ok(_) => {}
            Err(err) => log::warn!("attempt {attempt_id}: local mirror write failed: {err}"),
        }
        Ok(write)
    }
}

#[derive(Debug, Serialize)]
struct PatchAttempt<'a> {
    data: &'a CmiData,
    revision: u64,
    at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptDto {
    id: u64,
    course_id: u64,
    module_id: u64,
    #[serde(default)]
    data: CmiData,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status: ProgressStatus,
    score: Option<Score>,
    #[serde(default)]
    revision: u64,
}

impl AttemptDto {
    fn into_attempt(self) -> Result<Attempt, RemoteStoreError> {
        Attempt::from_persisted(
            AttemptId::new(self.id),
            CourseId::new(self.course_id),
            ModuleId::new(self.module_id),
            self.data,
            self.started_at,
            self.completed_at,
            DerivedProgress {
                status: self.status,
                score: self.score.filter(|score| !score.is_empty()),
            },
            self.revision,
        )
        .map_err(|e| RemoteStoreError::InvalidAttempt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rte_core::events::Snapshot;
    use rte_core::model::{Module, RteVersion};
    use rte_core::time::fixed_now;
    use storage::repository::{
        AttemptRepository, InMemoryRepository, ModuleRepository, NewAttemptRecord,
    };

    fn store(base: &str) -> RemoteAttemptStore {
        RemoteAttemptStore::new(RemoteStoreConfig {
            base_url: base.into(),
            api_token: None,
        })
        .unwrap()
    }

    #[test]
    fn attempt_url_is_addressed_by_course_module_and_attempt() {
        let url = store("https://lms.example.org/api/")
            .attempt_url(CourseId::new(3), ModuleId::new(7), AttemptId::new(42));
        assert_eq!(
            url,
            "https://lms.example.org/api/courses/3/modules/7/attempts/42"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = RemoteAttemptStore::new(RemoteStoreConfig {
            base_url: "not a url".into(),
            api_token: None,
        });
        assert!(matches!(err, Err(RemoteStoreError::InvalidUrl(_))));
    }

    #[test]
    fn server_attempt_maps_to_domain() {
        let json = r#"{
            "id": 42,
            "courseId": 3,
            "moduleId": 7,
            "data": {"cmi.core.lesson_status": "passed", "cmi.core.score.raw": "80"},
            "startedAt": "2023-11-14T22:13:20Z",
            "completedAt": "2023-11-14T22:20:00Z",
            "status": "passed",
            "score": {"raw": 80.0, "max": null, "min": null},
            "revision": 5
        }"#;
        let dto: AttemptDto = serde_json::from_str(json).unwrap();
        let attempt = dto.into_attempt().unwrap();

        assert_eq!(attempt.id(), AttemptId::new(42));
        assert_eq!(attempt.progress().status, ProgressStatus::Passed);
        assert_eq!(attempt.progress().score.and_then(|s| s.raw), Some(80.0));
        assert_eq!(attempt.revision(), 5);
        assert!(attempt.completed_at().is_some());
    }

    #[test]
    fn completed_attempt_without_start_is_rejected() {
        let json = r#"{
            "id": 1, "courseId": 1, "moduleId": 1,
            "startedAt": null,
            "completedAt": "2023-11-14T22:20:00Z",
            "status": "completed",
            "score": null
        }"#;
        let dto: AttemptDto = serde_json::from_str(json).unwrap();
        assert!(matches!(
            dto.into_attempt(),
            Err(RemoteStoreError::InvalidAttempt(_))
        ));
    }

    #[test]
    fn answer_with_another_revision_is_stale() {
        let json = r#"{
            "id": 1, "courseId": 1, "moduleId": 1,
            "startedAt": "2023-11-14T22:13:20Z",
            "completedAt": null,
            "status": "in-progress",
            "score": null,
            "revision": 8589934593
        }"#;
        let dto: AttemptDto = serde_json::from_str(json).unwrap();
        let attempt = dto.into_attempt().unwrap();

        assert_eq!(outcome_of(8_589_934_593, &attempt), SnapshotOutcome::Applied);
        assert_eq!(outcome_of(4_294_967_301, &attempt), SnapshotOutcome::Stale);
    }

    #[test]
    fn http_statuses_map_to_storage_errors() {
        let not_found = StorageError::from(RemoteStoreError::HttpStatus(
            reqwest::StatusCode::NOT_FOUND,
        ));
        assert!(matches!(not_found, StorageError::NotFound));

        let unavailable = StorageError::from(RemoteStoreError::HttpStatus(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        ));
        assert!(matches!(unavailable, StorageError::Connection(_)));
    }

    async fn repo_with_attempt() -> (InMemoryRepository, Attempt) {
        let repo = InMemoryRepository::new();
        let module = Module::new(
            ModuleId::new(7),
            CourseId::new(3),
            RteVersion::Scorm12,
            "en",
            1,
            "index.html",
        )
        .unwrap();
        repo.upsert_module(&module).await.unwrap();
        let attempt = repo
            .create_attempt(NewAttemptRecord::empty(CourseId::new(3), ModuleId::new(7)))
            .await
            .unwrap();
        (repo, attempt)
    }

    fn completed(attempt: &Attempt, revision: u64) -> AttemptUpdate {
        let mut data = CmiData::new();
        data.insert("cmi.core.lesson_status".into(), "completed".into());
        AttemptUpdate {
            course_id: attempt.course_id(),
            module_id: attempt.module_id(),
            attempt_id: attempt.id(),
            snapshot: Snapshot { revision, data },
            at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn mirrored_writes_keep_the_local_copy_current() {
        let (primary, attempt) = repo_with_attempt().await;
        let (local, _) = repo_with_attempt().await;
        let writer = MirroredAttemptWriter::new(
            Arc::new(primary.clone()),
            Arc::new(local.clone()),
        );

        let write = writer.update_attempt(completed(&attempt, 3)).await.unwrap();
        assert_eq!(write.outcome, SnapshotOutcome::Applied);

        let mirrored = local.get_attempt(attempt.id()).await.unwrap().unwrap();
        assert_eq!(mirrored.progress().status, ProgressStatus::Completed);
        assert_eq!(mirrored.revision(), 3);
    }

    #[tokio::test]
    async fn stale_primary_write_is_not_mirrored() {
        let (primary, attempt) = repo_with_attempt().await;
        let (local, _) = repo_with_attempt().await;
        primary.begin_session(attempt.id()).await.unwrap();
        let writer = MirroredAttemptWriter::new(
            Arc::new(primary.clone()),
            Arc::new(local.clone()),
        );

        let write = writer.update_attempt(completed(&attempt, 3)).await.unwrap();
        assert!(write.is_stale());

        let untouched = local.get_attempt(attempt.id()).await.unwrap().unwrap();
        assert_eq!(untouched.progress().status, ProgressStatus::NotStarted);
        assert_eq!(untouched.revision(), 0);
    }
}
