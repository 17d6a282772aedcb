use async_trait::async_trait;
use exam_core::model::{ExamSettings, ExamSettingsDraft};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{ExamSettingsRepository, StorageError};

#[async_trait]
impl ExamSettingsRepository for SqliteRepository {
    async fn get_settings(&self) -> Result<Option<ExamSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                default_duration_minutes,
                isolation_enabled,
                proctoring_enabled,
                tick_interval_ms,
                low_time_warning_ms
            FROM exam_settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let duration: i64 = row.try_get("default_duration_minutes").map_err(ser)?;
        let tick_interval: i64 = row.try_get("tick_interval_ms").map_err(ser)?;

        ExamSettings::from_persisted(ExamSettingsDraft {
            default_duration_minutes: Some(u32::try_from(duration).map_err(ser)?),
            isolation_enabled: Some(row.try_get("isolation_enabled").map_err(ser)?),
            proctoring_enabled: Some(row.try_get("proctoring_enabled").map_err(ser)?),
            tick_interval_ms: Some(u64::try_from(tick_interval).map_err(ser)?),
            low_time_warning_ms: Some(row.try_get("low_time_warning_ms").map_err(ser)?),
        })
        .map(Some)
        .map_err(ser)
    }

    async fn save_settings(&self, settings: &ExamSettings) -> Result<(), StorageError> {
        let tick_interval = i64::try_from(settings.tick_interval_ms())
            .map_err(|_| StorageError::Serialization("tick_interval_ms overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO exam_settings (
                id,
                default_duration_minutes,
                isolation_enabled,
                proctoring_enabled,
                tick_interval_ms,
                low_time_warning_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                default_duration_minutes = excluded.default_duration_minutes,
                isolation_enabled = excluded.isolation_enabled,
                proctoring_enabled = excluded.proctoring_enabled,
                tick_interval_ms = excluded.tick_interval_ms,
                low_time_warning_ms = excluded.low_time_warning_ms
            ",
        )
        .bind(1_i64)
        .bind(i64::from(settings.default_duration_minutes()))
        .bind(settings.isolation_enabled())
        .bind(settings.proctoring_enabled())
        .bind(tick_interval)
        .bind(settings.low_time_warning_ms())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
