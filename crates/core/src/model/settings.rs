use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DURATION_MINUTES: u32 = 120;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
/// Countdown ticks must arrive at least once per second.
pub const MAX_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LOW_TIME_WARNING_MS: i64 = 5 * 60 * 1_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamSettingsError {
    #[error("default exam duration must be > 0 minutes")]
    InvalidDuration,

    #[error("tick interval must be > 0 ms")]
    InvalidTickInterval,

    #[error("tick interval must be <= 1000 ms, got {0}")]
    TickIntervalTooLong(u64),

    #[error("low time warning must be >= 0 ms")]
    InvalidLowTimeWarning,
}

/// Validated exam configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    default_duration_minutes: u32,
    isolation_enabled: bool,
    proctoring_enabled: bool,
    tick_interval_ms: u64,
    low_time_warning_ms: i64,
}

#[derive(Clone, Debug, Default)]
pub struct ExamSettingsDraft {
    pub default_duration_minutes: Option<u32>,
    pub isolation_enabled: Option<bool>,
    pub proctoring_enabled: Option<bool>,
    pub tick_interval_ms: Option<u64>,
    pub low_time_warning_ms: Option<i64>,
}

impl ExamSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the draft, filling unset fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `ExamSettingsError` if a provided value is out of range.
    pub fn validate(self) -> Result<ExamSettings, ExamSettingsError> {
        let defaults = ExamSettings::default();

        let default_duration_minutes = self
            .default_duration_minutes
            .unwrap_or(defaults.default_duration_minutes);
        if default_duration_minutes == 0 {
            return Err(ExamSettingsError::InvalidDuration);
        }

        let tick_interval_ms = self.tick_interval_ms.unwrap_or(defaults.tick_interval_ms);
        if tick_interval_ms == 0 {
            return Err(ExamSettingsError::InvalidTickInterval);
        }
        if tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(ExamSettingsError::TickIntervalTooLong(tick_interval_ms));
        }

        let low_time_warning_ms = self
            .low_time_warning_ms
            .unwrap_or(defaults.low_time_warning_ms);
        if low_time_warning_ms < 0 {
            return Err(ExamSettingsError::InvalidLowTimeWarning);
        }

        Ok(ExamSettings {
            default_duration_minutes,
            isolation_enabled: self.isolation_enabled.unwrap_or(defaults.isolation_enabled),
            proctoring_enabled: self
                .proctoring_enabled
                .unwrap_or(defaults.proctoring_enabled),
            tick_interval_ms,
            low_time_warning_ms,
        })
    }
}

impl ExamSettings {
    /// # Errors
    ///
    /// Returns `ExamSettingsError` if persisted values are out of range.
    pub fn from_persisted(draft: ExamSettingsDraft) -> Result<Self, ExamSettingsError> {
        draft.validate()
    }

    #[must_use]
    pub fn default_duration_minutes(&self) -> u32 {
        self.default_duration_minutes
    }

    #[must_use]
    pub fn isolation_enabled(&self) -> bool {
        self.isolation_enabled
    }

    #[must_use]
    pub fn proctoring_enabled(&self) -> bool {
        self.proctoring_enabled
    }

    #[must_use]
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    #[must_use]
    pub fn low_time_warning_ms(&self) -> i64 {
        self.low_time_warning_ms
    }

    #[must_use]
    pub fn to_draft(&self) -> ExamSettingsDraft {
        ExamSettingsDraft {
            default_duration_minutes: Some(self.default_duration_minutes),
            isolation_enabled: Some(self.isolation_enabled),
            proctoring_enabled: Some(self.proctoring_enabled),
            tick_interval_ms: Some(self.tick_interval_ms),
            low_time_warning_ms: Some(self.low_time_warning_ms),
        }
    }
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            isolation_enabled: true,
            proctoring_enabled: true,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            low_time_warning_ms: DEFAULT_LOW_TIME_WARNING_MS,
        }
    }
}
