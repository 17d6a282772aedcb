use exam_core::model::QuestionId;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_question_row, question_id_from_i64},
};
use crate::repository::{NewQuestionRecord, QuestionRecord, QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO questions (text, tags, difficulty, lms_id)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(question.text)
        .bind(question.tags)
        .bind(i64::from(question.difficulty))
        .bind(question.lms_id)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        question_id_from_i64(res.last_insert_rowid())
    }

    async fn upsert_question(&self, question: &QuestionRecord) -> Result<(), StorageError> {
        let id = id_i64("question_id", question.id.value())?;

        sqlx::query(
            r"
                INSERT INTO questions (id, text, tags, difficulty, lms_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    tags = excluded.tags,
                    difficulty = excluded.difficulty,
                    lms_id = excluded.lms_id
            ",
        )
        .bind(id)
        .bind(question.text.as_str())
        .bind(question.tags.as_deref())
        .bind(i64::from(question.difficulty))
        .bind(question.lms_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_questions(&self) -> Result<Vec<QuestionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, text, tags, difficulty, lms_id
                FROM questions
                ORDER BY id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_question_row(&row)?);
        }
        Ok(out)
    }
}
