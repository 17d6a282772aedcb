use serde::Serialize;

use exam_core::model::{ExamQuestionView, ExamStatus, SessionId, StudentId, format_remaining};

use crate::error::ExamFailure;

/// Read-only view of the exam published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamSnapshot {
    pub status: ExamStatus,
    pub session_id: Option<SessionId>,
    pub student_id: Option<StudentId>,
    pub questions: Vec<ExamQuestionView>,
    /// Only set while the exam is in progress and has questions.
    pub current_index: Option<usize>,
    pub duration_millis: i64,
    pub remaining_millis: i64,
    pub isolation_enabled: bool,
    pub proctoring_enabled: bool,
    pub isolation_engaged: bool,
    pub progress: f32,
    pub low_time: bool,
    pub error: Option<ExamFailure>,
}

impl ExamSnapshot {
    /// Snapshot of a machine that has never been activated.
    #[must_use]
    pub fn idle(isolation_enabled: bool, proctoring_enabled: bool) -> Self {
        Self {
            status: ExamStatus::NotStarted,
            session_id: None,
            student_id: None,
            questions: Vec::new(),
            current_index: None,
            duration_millis: 0,
            remaining_millis: 0,
            isolation_enabled,
            proctoring_enabled,
            isolation_engaged: false,
            progress: 0.0,
            low_time: false,
            error: None,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&ExamQuestionView> {
        self.current_index.and_then(|idx| self.questions.get(idx))
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_answered()).count()
    }

    /// Remaining time as `HH:MM:SS`.
    #[must_use]
    pub fn remaining_formatted(&self) -> String {
        format_remaining(self.remaining_millis)
    }
}
