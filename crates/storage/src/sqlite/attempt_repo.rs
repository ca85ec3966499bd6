use rte_core::model::{Attempt, AttemptId, SnapshotOutcome};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, data_to_json, id_i64, map_attempt_row, parse_version, ser,
};
use crate::repository::{
    AttemptRepository, AttemptUpdate, AttemptWrite, AttemptWriter, NewAttemptRecord, StorageError,
    log_outcome,
};

const ATTEMPT_COLUMNS: &str = r"
    a.id, a.course_id, a.module_id, a.data, a.started_at, a.completed_at,
    a.status, a.score_raw, a.score_max, a.score_min, a.revision
";

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn create_attempt(&self, record: NewAttemptRecord) -> Result<Attempt, StorageError> {
        let module_course: Option<i64> =
            sqlx::query_scalar("SELECT course_id FROM modules WHERE id = ?1")
                .bind(id_i64("module_id", record.module_id.value())?)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?;
        match module_course {
            None => return Err(StorageError::NotFound),
            Some(course) if course != id_i64("course_id", record.course_id.value())? => {
                return Err(StorageError::Conflict);
            }
            Some(_) => {}
        }

        let res = sqlx::query(
            r"
            INSERT INTO attempts (course_id, module_id, data, status, revision)
            VALUES (?1, ?2, ?3, 'not-started', 0)
            ",
        )
        .bind(id_i64("course_id", record.course_id.value())?)
        .bind(id_i64("module_id", record.module_id.value())?)
        .bind(data_to_json(&record.data)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = attempt_id_from_i64(res.last_insert_rowid())?;
        self.get_attempt(id).await?.ok_or(StorageError::NotFound)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts a WHERE a.id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("attempt_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_attempt_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn begin_session(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        // Single statement so two launches of the same attempt cannot both
        // read the same session number. Same layout as `Attempt::begin_session`.
        let res = sqlx::query(
            "UPDATE attempts SET revision = ((revision >> 32) + 1) << 32 WHERE id = ?1",
        )
        .bind(id_i64("attempt_id", id.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        let attempt = self.get_attempt(id).await?.ok_or(StorageError::NotFound)?;
        log::debug!(
            "attempt {}: opened session {}",
            attempt.id(),
            attempt.session()
        );
        Ok(attempt)
    }
}

#[async_trait::async_trait]
impl AttemptWriter for SqliteRepository {
    async fn update_attempt(&self, update: AttemptUpdate) -> Result<AttemptWrite, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS}, m.version AS module_version
             FROM attempts a JOIN modules m ON m.id = a.module_id
             WHERE a.id = ?1"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("attempt_id", update.attempt_id.value())?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let version = parse_version(&row.try_get::<String, _>("module_version").map_err(ser)?)?;
        let mut attempt = map_attempt_row(&row)?;
        if attempt.course_id() != update.course_id || attempt.module_id() != update.module_id {
            return Err(StorageError::Conflict);
        }

        let outcome = attempt.apply_snapshot(version, update.snapshot, update.at);
        log_outcome(&attempt, outcome);
        if outcome == SnapshotOutcome::Stale {
            return Ok(AttemptWrite { attempt, outcome });
        }

        let progress = attempt.progress();
        let score = progress.score.unwrap_or_default();
        sqlx::query(
            r"
            UPDATE attempts SET
                data = ?2,
                started_at = ?3,
                completed_at = ?4,
                status = ?5,
                score_raw = ?6,
                score_max = ?7,
                score_min = ?8,
                revision = ?9
            WHERE id = ?1
            ",
        )
        .bind(id_i64("attempt_id", attempt.id().value())?)
        .bind(data_to_json(attempt.data())?)
        .bind(attempt.started_at())
        .bind(attempt.completed_at())
        .bind(progress.status.as_str())
        .bind(score.raw)
        .bind(score.max)
        .bind(score.min)
        .bind(id_i64("revision", attempt.revision())?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(AttemptWrite { attempt, outcome })
    }
}
