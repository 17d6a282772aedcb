use std::sync::Arc;

use exam_core::model::{ExamSettings, ExamSettingsDraft};
use storage::repository::ExamSettingsRepository;

use crate::error::SettingsServiceError;

#[derive(Clone)]
pub struct ExamSettingsService {
    repo: Arc<dyn ExamSettingsRepository>,
}

impl ExamSettingsService {
    #[must_use]
    pub fn new(repo: Arc<dyn ExamSettingsRepository>) -> Self {
        Self { repo }
    }

    /// Load persisted settings (or defaults if missing).
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn load(&self) -> Result<ExamSettings, SettingsServiceError> {
        let settings = self.repo.get_settings().await?;
        Ok(settings.unwrap_or_default())
    }

    /// Validate and persist new settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` if validation fails or persistence fails.
    pub async fn save(
        &self,
        draft: ExamSettingsDraft,
    ) -> Result<ExamSettings, SettingsServiceError> {
        let settings = draft.validate()?;
        self.repo.save_settings(&settings).await?;
        Ok(settings)
    }
}
