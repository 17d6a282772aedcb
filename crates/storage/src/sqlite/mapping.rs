use exam_core::model::{AnswerRecord, QuestionId, StudentId};
use sqlx::Row;

use crate::repository::{QuestionRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn student_id_from_i64(v: i64) -> Result<StudentId, StorageError> {
    Ok(StudentId::new(i64_to_u64("student_id", v)?))
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionRecord, StorageError> {
    let difficulty: i64 = row.try_get("difficulty").map_err(ser)?;
    let difficulty = u8::try_from(difficulty)
        .map_err(|_| StorageError::Serialization(format!("invalid difficulty: {difficulty}")))?;

    Ok(QuestionRecord {
        id: question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        text: row.try_get("text").map_err(ser)?,
        tags: row.try_get("tags").map_err(ser)?,
        difficulty,
        lms_id: row.try_get("lms_id").map_err(ser)?,
    })
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    Ok(AnswerRecord {
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        student_id: student_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        answer_text: row.try_get("answer_text").map_err(ser)?,
        grade: row.try_get("grade").map_err(ser)?,
        comment: row.try_get("comment").map_err(ser)?,
        submitted_at_millis: row.try_get("submitted_at_ms").map_err(ser)?,
    })
}
