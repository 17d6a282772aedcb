use exam_core::model::{AnswerRecord, QuestionId, StudentId};

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_answer_row},
};
use crate::repository::{AnswerRepository, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn upsert_answer(&self, answer: &AnswerRecord) -> Result<(), StorageError> {
        let question_id = id_i64("question_id", answer.question_id.value())?;
        let student_id = id_i64("student_id", answer.student_id.value())?;

        sqlx::query(
            r"
                INSERT INTO answers (
                    question_id, student_id, answer_text, grade, comment, submitted_at_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(question_id, student_id) DO UPDATE SET
                    answer_text = excluded.answer_text,
                    grade = excluded.grade,
                    comment = excluded.comment,
                    submitted_at_ms = excluded.submitted_at_ms
            ",
        )
        .bind(question_id)
        .bind(student_id)
        .bind(answer.answer_text.as_str())
        .bind(answer.grade)
        .bind(answer.comment.as_deref())
        .bind(answer.submitted_at_millis)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;

        Ok(())
    }

    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let question = id_i64("question_id", question_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT question_id, student_id, answer_text, grade, comment, submitted_at_ms
                FROM answers
                WHERE question_id = ?1
                ORDER BY submitted_at_ms DESC
            ",
        )
        .bind(question)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }

    async fn answers_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let student = id_i64("student_id", student_id.value())?;

        let rows = sqlx::query(
            r"
                SELECT question_id, student_id, answer_text, grade, comment, submitted_at_ms
                FROM answers
                WHERE student_id = ?1
                ORDER BY question_id ASC
            ",
        )
        .bind(student)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }
}
