use rte_core::model::{Module, ModuleId};

use super::SqliteRepository;
use super::mapping::{id_i64, map_module_row};
use crate::repository::{ModuleRepository, StorageError};

#[async_trait::async_trait]
impl ModuleRepository for SqliteRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO modules (id, course_id, version, locale, version_number, entry_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                version = excluded.version,
                locale = excluded.locale,
                version_number = excluded.version_number,
                entry_url = excluded.entry_url
            ",
        )
        .bind(id_i64("module_id", module.id().value())?)
        .bind(id_i64("course_id", module.course_id().value())?)
        .bind(module.version().as_str())
        .bind(module.locale().to_owned())
        .bind(i64::from(module.version_number()))
        .bind(module.entry_url().to_owned())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, version, locale, version_number, entry_url
            FROM modules WHERE id = ?1
            ",
        )
        .bind(id_i64("module_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_module_row(&row).map(Some),
            None => Ok(None),
        }
    }
}
