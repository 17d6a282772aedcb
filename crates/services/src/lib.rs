#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod exam;
pub mod exam_settings_service;
pub mod isolation;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use error::{
    AppServicesError, ExamError, ExamFailure, FailureKind, IsolationError, SettingsServiceError,
};
pub use exam::{ExamHandle, ExamMachine, ExamService, ExamSnapshot};
pub use exam_settings_service::ExamSettingsService;
pub use isolation::{IsolationController, IsolationHost, NoopIsolationHost};
