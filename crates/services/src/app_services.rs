use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::exam::ExamService;
use crate::exam_settings_service::ExamSettingsService;
use crate::isolation::IsolationHost;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    settings: Arc<ExamSettingsService>,
    exams: Arc<ExamService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or settings loading fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        isolation: Arc<dyn IsolationHost>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock, isolation).await
    }

    /// Build services over an existing storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if persisted settings cannot be loaded.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        isolation: Arc<dyn IsolationHost>,
    ) -> Result<Self, AppServicesError> {
        let settings = Arc::new(ExamSettingsService::new(Arc::clone(&storage.settings)));
        let exam_settings = settings.load().await?;

        let exams = Arc::new(
            ExamService::new(
                clock,
                Arc::clone(&storage.questions),
                Arc::clone(&storage.answers),
                isolation,
            )
            .with_settings(exam_settings),
        );

        Ok(Self {
            storage,
            settings,
            exams,
        })
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn settings(&self) -> Arc<ExamSettingsService> {
        Arc::clone(&self.settings)
    }

    #[must_use]
    pub fn exams(&self) -> Arc<ExamService> {
        Arc::clone(&self.exams)
    }
}
