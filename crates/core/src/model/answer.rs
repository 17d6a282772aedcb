use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{QuestionId, StudentId};

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// One per-question answer written to the submission sink at finalization.
///
/// `(question_id, student_id)` is the natural key; writing the same pair twice
/// replaces the earlier record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub student_id: StudentId,
    pub answer_text: String,
    /// Filled in by graders after submission.
    pub grade: Option<f64>,
    pub comment: Option<String>,
    pub submitted_at_millis: i64,
}

impl AnswerRecord {
    /// Build an ungraded record for submission.
    #[must_use]
    pub fn submitted(
        question_id: QuestionId,
        student_id: StudentId,
        answer_text: impl Into<String>,
        submitted_at_millis: i64,
    ) -> Self {
        Self {
            question_id,
            student_id,
            answer_text: answer_text.into(),
            grade: None,
            comment: None,
            submitted_at_millis,
        }
    }

    #[must_use]
    pub fn key(&self) -> (QuestionId, StudentId) {
        (self.question_id, self.student_id)
    }
}

//
// ─── ANSWER BUFFER ─────────────────────────────────────────────────────────────
//

/// In-memory latest-answer store for a running attempt.
///
/// Nothing here is persisted incrementally; the buffer is read in bulk when
/// the attempt is finalized and stays intact if that write fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerBuffer {
    answers: HashMap<QuestionId, String>,
}

impl AnswerBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` as the latest answer for `question_id` (last write wins).
    pub fn record(&mut self, question_id: QuestionId, text: impl Into<String>) {
        self.answers.insert(question_id, text.into());
    }

    /// Latest answer for a question, or `""` if it was never answered.
    #[must_use]
    pub fn answer_for(&self, question_id: QuestionId) -> &str {
        self.answers.get(&question_id).map_or("", String::as_str)
    }

    /// Number of questions with a non-blank answer.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers
            .values()
            .filter(|text| !text.trim().is_empty())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Build one record per question in `order`, defaulting missing answers to
    /// empty text. The buffer itself is left untouched.
    #[must_use]
    pub fn to_records(
        &self,
        order: impl IntoIterator<Item = QuestionId>,
        student_id: StudentId,
        submitted_at_millis: i64,
    ) -> Vec<AnswerRecord> {
        order
            .into_iter()
            .map(|question_id| {
                AnswerRecord::submitted(
                    question_id,
                    student_id,
                    self.answer_for(question_id),
                    submitted_at_millis,
                )
            })
            .collect()
    }
}
