use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::{AnswerBuffer, AnswerRecord};
use crate::model::ids::{QuestionId, SessionId, StudentId};
use crate::model::question::{ExamQuestionView, Question};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamSessionError {
    #[error("exam duration must be > 0")]
    InvalidDuration,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of an exam attempt.
///
/// ```text
/// NotStarted -> Loading -> InProgress -> Finishing -> Finished
///                  |                        |
///                  +--------> Error <-------+
/// ```
///
/// `Error` after a failed load may go back to `Loading`; `Error` after a failed
/// submission may only go back to `Finishing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    NotStarted,
    Loading,
    InProgress,
    Finishing,
    Finished,
    Error,
}

impl ExamStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamStatus::NotStarted => "not_started",
            ExamStatus::Loading => "loading",
            ExamStatus::InProgress => "in_progress",
            ExamStatus::Finishing => "finishing",
            ExamStatus::Finished => "finished",
            ExamStatus::Error => "error",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: ExamStatus) -> bool {
        use ExamStatus::{Error, Finished, Finishing, InProgress, Loading, NotStarted};
        matches!(
            (self, next),
            (NotStarted | Loading | Error, Loading)
                | (Loading, InProgress | Error)
                | (InProgress | Error, Finishing)
                | (Finishing, Finished | Error)
        )
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Navigation direction between questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Data of a single activated exam attempt.
///
/// The question list is fixed at activation. Answers live in an
/// [`AnswerBuffer`] and are merged into [`ExamQuestionView`]s on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    id: SessionId,
    student_id: StudentId,
    duration_millis: i64,
    started_at_millis: i64,
    questions: Vec<Question>,
    answers: AnswerBuffer,
    current_index: usize,
    remaining_millis: i64,
}

impl ExamSession {
    /// Create an attempt that starts at `started_at_millis`.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::InvalidDuration` if `duration_millis <= 0`.
    /// Returns `ExamSessionError::DuplicateQuestion` if two questions share an id.
    pub fn new(
        student_id: StudentId,
        duration_millis: i64,
        started_at_millis: i64,
        questions: Vec<Question>,
    ) -> Result<Self, ExamSessionError> {
        if duration_millis <= 0 {
            return Err(ExamSessionError::InvalidDuration);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(ExamSessionError::DuplicateQuestion(question.id()));
            }
        }

        Ok(Self {
            id: SessionId::new(student_id, started_at_millis),
            student_id,
            duration_millis,
            started_at_millis,
            questions,
            answers: AnswerBuffer::new(),
            current_index: 0,
            remaining_millis: duration_millis,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn duration_millis(&self) -> i64 {
        self.duration_millis
    }

    #[must_use]
    pub fn started_at_millis(&self) -> i64 {
        self.started_at_millis
    }

    #[must_use]
    pub fn remaining_millis(&self) -> i64 {
        self.remaining_millis
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerBuffer {
        &self.answers
    }

    /// Index of the displayed question, absent when the exam has no questions.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        if self.questions.is_empty() {
            None
        } else {
            Some(self.current_index)
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<ExamQuestionView> {
        self.current_index()
            .and_then(|idx| self.questions.get(idx))
            .map(|q| ExamQuestionView::new(q, self.answers.answer_for(q.id())))
    }

    #[must_use]
    pub fn question_views(&self) -> Vec<ExamQuestionView> {
        self.questions
            .iter()
            .map(|q| ExamQuestionView::new(q, self.answers.answer_for(q.id())))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.questions.iter().any(|q| q.id() == question_id)
    }

    /// Store the latest answer for a question of this attempt.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::UnknownQuestion` if the id is not in the attempt.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        text: impl Into<String>,
    ) -> Result<(), ExamSessionError> {
        if !self.contains(question_id) {
            return Err(ExamSessionError::UnknownQuestion(question_id));
        }
        self.answers.record(question_id, text);
        Ok(())
    }

    /// Move the current question pointer by one, clamped to the question range.
    ///
    /// Returns true if the pointer moved.
    pub fn advance(&mut self, direction: Direction) -> bool {
        let last = self.questions.len().saturating_sub(1);
        let next = match direction {
            Direction::Next => (self.current_index + 1).min(last),
            Direction::Previous => self.current_index.saturating_sub(1),
        };
        let moved = next != self.current_index;
        self.current_index = next;
        moved
    }

    /// Recompute the remaining time from the wall clock, never below zero.
    pub fn update_remaining(&mut self, now_millis: i64) -> i64 {
        let elapsed = now_millis.saturating_sub(self.started_at_millis).max(0);
        self.remaining_millis = self.duration_millis.saturating_sub(elapsed).max(0);
        self.remaining_millis
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining_millis <= 0
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| !self.answers.answer_for(q.id()).trim().is_empty())
            .count()
    }

    /// Fraction of questions answered, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        if self.questions.is_empty() {
            return 0.0;
        }
        self.answered_count() as f32 / self.questions.len() as f32
    }

    /// One record per question, in question order, including unanswered ones.
    #[must_use]
    pub fn build_records(&self, submitted_at_millis: i64) -> Vec<AnswerRecord> {
        self.answers.to_records(
            self.questions.iter().map(Question::id),
            self.student_id,
            submitted_at_millis,
        )
    }
}

/// Render a millisecond duration as `HH:MM:SS`.
#[must_use]
pub fn format_remaining(millis: i64) -> String {
    let total_secs = millis.max(0) / 1_000;
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
