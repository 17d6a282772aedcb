mod answer;
mod exam;
mod ids;
mod question;
mod settings;

pub use answer::{AnswerBuffer, AnswerRecord};
pub use exam::{Direction, ExamSession, ExamSessionError, ExamStatus, format_remaining};
pub use ids::{ParseIdError, QuestionId, SessionId, StudentId};
pub use question::{Difficulty, ExamQuestionView, Question, QuestionError};
pub use settings::{
    DEFAULT_DURATION_MINUTES, DEFAULT_LOW_TIME_WARNING_MS, DEFAULT_TICK_INTERVAL_MS, ExamSettings,
    ExamSettingsDraft, ExamSettingsError, MAX_TICK_INTERVAL_MS,
};
