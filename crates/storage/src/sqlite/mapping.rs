use rte_core::CmiData;
use rte_core::model::{
    Attempt, AttemptId, CourseId, DerivedProgress, Module, ModuleId, ProgressStatus, RteVersion,
    Score,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn data_to_json(data: &CmiData) -> Result<String, StorageError> {
    serde_json::to_string(data).map_err(ser)
}

pub(crate) fn data_from_json(raw: &str) -> Result<CmiData, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn parse_version(s: &str) -> Result<RteVersion, StorageError> {
    s.parse::<RteVersion>().map_err(ser)
}

pub(crate) fn map_module_row(row: &sqlx::sqlite::SqliteRow) -> Result<Module, StorageError> {
    let version: String = row.try_get("version").map_err(ser)?;
    let version_number = u32::try_from(row.try_get::<i64, _>("version_number").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("version_number overflow".into()))?;

    Module::new(
        module_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        parse_version(&version)?,
        row.try_get::<String, _>("locale").map_err(ser)?,
        version_number,
        row.try_get::<String, _>("entry_url").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<Attempt, StorageError> {
    let data_raw: String = row.try_get("data").map_err(ser)?;
    let status_raw: String = row.try_get("status").map_err(ser)?;
    let status = status_raw.parse::<ProgressStatus>().map_err(ser)?;

    let score = Score {
        raw: row.try_get("score_raw").map_err(ser)?,
        max: row.try_get("score_max").map_err(ser)?,
        min: row.try_get("score_min").map_err(ser)?,
    };
    let progress = DerivedProgress {
        status,
        score: (!score.is_empty()).then_some(score),
    };

    Attempt::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        module_id_from_i64(row.try_get::<i64, _>("module_id").map_err(ser)?)?,
        data_from_json(&data_raw)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        progress,
        i64_to_u64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?,
    )
    .map_err(ser)
}
