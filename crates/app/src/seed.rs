use storage::repository::{NewQuestionRecord, QuestionRepository, StorageError};

const SAMPLE_QUESTIONS: &[(&str, u8, &str)] = &[
    ("What does the borrow checker guarantee at compile time?", 2, "rust,ownership"),
    ("Explain the difference between `Box<T>` and `Rc<T>`.", 3, "rust,smart-pointers"),
    ("When would you reach for `Arc<Mutex<T>>` instead of a channel?", 4, "rust,concurrency"),
    ("Describe what happens when a `JoinHandle` is aborted.", 3, "tokio"),
    ("Why is `Send` required for values moved into a spawned task?", 5, "rust,async"),
];

/// Fill an empty question bank with sample questions.
///
/// Returns the number of questions inserted; a non-empty bank is left alone.
pub async fn seed_question_bank(questions: &dyn QuestionRepository) -> Result<usize, StorageError> {
    if !questions.list_questions().await?.is_empty() {
        return Ok(0);
    }

    for (text, difficulty, tags) in SAMPLE_QUESTIONS {
        questions
            .insert_question(NewQuestionRecord::new(*text, *difficulty).with_tags(*tags))
            .await?;
    }
    Ok(SAMPLE_QUESTIONS.len())
}
