use async_trait::async_trait;
use exam_core::model::{
    AnswerRecord, Difficulty, ExamSettings, Question, QuestionError, QuestionId, StudentId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of a question-bank entry.
///
/// Tags and the LMS identifier belong to the bank; an exam attempt only sees
/// the id, text and difficulty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub text: String,
    pub tags: Option<String>,
    pub difficulty: u8,
    pub lms_id: Option<String>,
}

impl QuestionRecord {
    /// Convert the record into the domain `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if text or difficulty fail validation.
    pub fn into_question(self) -> Result<Question, QuestionError> {
        Question::new(self.id, self.text, Difficulty::new(self.difficulty)?)
    }
}

/// Insert payload for a question whose id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestionRecord {
    pub text: String,
    pub tags: Option<String>,
    pub difficulty: u8,
    pub lms_id: Option<String>,
}

impl NewQuestionRecord {
    #[must_use]
    pub fn new(text: impl Into<String>, difficulty: u8) -> Self {
        Self {
            text: text.into(),
            tags: None,
            difficulty,
            lms_id: None,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    fn with_id(self, id: QuestionId) -> QuestionRecord {
        QuestionRecord {
            id,
            text: self.text,
            tags: self.tags,
            difficulty: self.difficulty,
            lms_id: self.lms_id,
        }
    }
}

/// Question source for exam attempts.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Insert a question and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError>;

    /// Persist or replace a question with a known id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &QuestionRecord) -> Result<(), StorageError>;

    /// All questions in the bank, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn list_questions(&self) -> Result<Vec<QuestionRecord>, StorageError>;

    /// Ordered question set for an exam attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a stored question is invalid,
    /// or other storage errors.
    async fn load_questions(&self) -> Result<Vec<Question>, StorageError> {
        self.list_questions()
            .await?
            .into_iter()
            .map(|record| {
                let id = record.id;
                record
                    .into_question()
                    .map_err(|e| StorageError::Serialization(format!("question {id}: {e}")))
            })
            .collect()
    }
}

/// Durable sink for per-question answer records.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Insert or replace the record keyed by `(question_id, student_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_answer(&self, answer: &AnswerRecord) -> Result<(), StorageError>;

    /// Answers for a question, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Answers written by a student, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn answers_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;
}

#[async_trait]
pub trait ExamSettingsRepository: Send + Sync {
    /// Fetch persisted settings, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failures.
    async fn get_settings(&self) -> Result<Option<ExamSettings>, StorageError>;

    /// Persist settings, replacing any previous row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the settings cannot be stored.
    async fn save_settings(&self, settings: &ExamSettings) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<BTreeMap<QuestionId, QuestionRecord>>>,
    answers: Arc<Mutex<HashMap<(QuestionId, StudentId), AnswerRecord>>>,
    settings: Arc<Mutex<Option<ExamSettings>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        let next = guard.keys().next_back().map_or(1, |id| id.value() + 1);
        let id = QuestionId::new(next);
        guard.insert(id, question.with_id(id));
        Ok(id)
    }

    async fn upsert_question(&self, question: &QuestionRecord) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        guard.insert(question.id, question.clone());
        Ok(())
    }

    async fn list_questions(&self) -> Result<Vec<QuestionRecord>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        Ok(guard.values().rev().cloned().collect())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn upsert_answer(&self, answer: &AnswerRecord) -> Result<(), StorageError> {
        let mut guard = self.answers.lock().map_err(poisoned)?;
        guard.insert(answer.key(), answer.clone());
        Ok(())
    }

    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.answers.lock().map_err(poisoned)?;
        let mut found: Vec<_> = guard
            .values()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.submitted_at_millis.cmp(&a.submitted_at_millis));
        Ok(found)
    }

    async fn answers_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.answers.lock().map_err(poisoned)?;
        let mut found: Vec<_> = guard
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.question_id);
        Ok(found)
    }
}

#[async_trait]
impl ExamSettingsRepository for InMemoryRepository {
    async fn get_settings(&self) -> Result<Option<ExamSettings>, StorageError> {
        let guard = self.settings.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn save_settings(&self, settings: &ExamSettings) -> Result<(), StorageError> {
        let mut guard = self.settings.lock().map_err(poisoned)?;
        *guard = Some(settings.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub settings: Arc<dyn ExamSettingsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let answers: Arc<dyn AnswerRepository> = Arc::new(repo.clone());
        let settings: Arc<dyn ExamSettingsRepository> = Arc::new(repo);
        Self {
            questions,
            answers,
            settings,
        }
    }
}
