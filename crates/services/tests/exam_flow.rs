use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{AnswerRecord, Direction, ExamStatus, QuestionId, StudentId};
use exam_core::time::manual_test_clock;
use exam_core::ManualClock;
use services::{
    Clock, ExamError, ExamHandle, ExamService, FailureKind, IsolationError, IsolationHost,
};
use storage::repository::{
    AnswerRepository, InMemoryRepository, NewQuestionRecord, QuestionRecord, QuestionRepository,
    StorageError,
};

const STUDENT: StudentId = StudentId::new(7);

//
// ─── FAKES ─────────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct RecordingHost {
    deny: bool,
    engaged: AtomicUsize,
    released: AtomicUsize,
}

impl RecordingHost {
    fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    fn engaged(&self) -> usize {
        self.engaged.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl IsolationHost for RecordingHost {
    fn engage(&self) -> Result<(), IsolationError> {
        if self.deny {
            return Err(IsolationError::Denied("screen pinning refused".into()));
        }
        self.engaged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answer sink that can be switched offline.
#[derive(Default)]
struct FlakySink {
    inner: InMemoryRepository,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl FlakySink {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerRepository for FlakySink {
    async fn upsert_answer(&self, answer: &AnswerRecord) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("sink offline".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_answer(answer).await
    }

    async fn answers_for_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        self.inner.answers_for_question(question_id).await
    }

    async fn answers_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        self.inner.answers_for_student(student_id).await
    }
}

/// Question source with an optional delay and a failure switch.
struct SlowSource {
    inner: InMemoryRepository,
    delay: Duration,
    failing: AtomicBool,
}

impl SlowSource {
    fn new(inner: InMemoryRepository, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl QuestionRepository for SlowSource {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        self.inner.insert_question(question).await
    }

    async fn upsert_question(&self, question: &QuestionRecord) -> Result<(), StorageError> {
        self.inner.upsert_question(question).await
    }

    async fn list_questions(&self) -> Result<Vec<QuestionRecord>, StorageError> {
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("question bank unreachable".into()));
        }
        self.inner.list_questions().await
    }
}

//
// ─── HELPERS ───────────────────────────────────────────────────────────────────
//

async fn bank(n: usize) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    for i in 1..=n {
        repo.insert_question(NewQuestionRecord::new(format!("Question {i}"), 3))
            .await
            .unwrap();
    }
    repo
}

struct Harness {
    handle: ExamHandle,
    clock: ManualClock,
    sink: Arc<FlakySink>,
    host: Arc<RecordingHost>,
}

fn spawn_with(questions: Arc<dyn QuestionRepository>, host: RecordingHost) -> Harness {
    let clock = manual_test_clock();
    let sink = Arc::new(FlakySink::default());
    let host = Arc::new(host);
    let handle = ExamService::new(
        Clock::manual(clock.clone()),
        questions,
        sink.clone(),
        host.clone(),
    )
    .spawn();
    Harness {
        handle,
        clock,
        sink,
        host,
    }
}

async fn harness(questions: usize) -> Harness {
    spawn_with(Arc::new(bank(questions).await), RecordingHost::default())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn completed_attempt_submits_one_record_per_question() {
    let h = harness(3).await;
    h.handle.activate(STUDENT, 30).await.unwrap();

    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::InProgress);
    assert_eq!(snap.remaining_millis, 30 * 60_000);
    assert!(snap.isolation_engaged);
    assert_eq!(h.host.engaged(), 1);
    // Newest question first.
    let first = snap.current_question().unwrap().question_id;
    assert_eq!(first, QuestionId::new(3));

    h.handle.record_answer(first, "ownership").await.unwrap();
    h.handle.advance(Direction::Next).await.unwrap();
    h.handle.advance(Direction::Next).await.unwrap();
    assert_eq!(h.handle.advance(Direction::Next).await.unwrap(), Some(2));

    let json = serde_json::to_value(h.handle.snapshot()).unwrap();
    assert_eq!(json["status"], "in_progress");
    assert_eq!(json["questions"][0]["student_answer"], "ownership");

    assert_eq!(h.handle.finish().await.unwrap(), 3);

    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::Finished);
    assert!(!snap.isolation_engaged);
    assert_eq!(h.host.released(), 1);

    let stored = h.sink.answers_for_student(STUDENT).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(
        stored.iter().filter(|a| a.answer_text.is_empty()).count(),
        2
    );
    assert!(stored.iter().all(|a| a.grade.is_none()));
}

#[tokio::test]
async fn racing_finish_calls_submit_exactly_once() {
    let h = harness(2).await;
    h.handle.activate(STUDENT, 10).await.unwrap();

    let (a, b) = tokio::join!(h.handle.finish(), h.handle.finish());
    let (ok, rejected) = if a.is_ok() { (a, b) } else { (b, a) };
    assert_eq!(ok.unwrap(), 2);
    assert!(matches!(rejected, Err(ExamError::AlreadyFinalizing)));
    assert_eq!(h.sink.writes(), 2);

    assert!(matches!(
        h.handle.finish().await,
        Err(ExamError::AlreadyFinalizing)
    ));
    assert_eq!(h.sink.writes(), 2);
}

#[tokio::test]
async fn expired_time_finishes_without_a_manual_call() {
    let h = harness(2).await;
    h.handle.activate(STUDENT, 1).await.unwrap();
    let mut updates = h.handle.subscribe();

    h.clock.advance_millis(30_000);
    assert_eq!(h.handle.tick().await.unwrap(), ExamStatus::InProgress);
    assert_eq!(h.handle.snapshot().remaining_millis, 30_000);

    h.clock.advance_millis(30_000);
    let status = h.handle.tick().await.unwrap();
    assert!(matches!(status, ExamStatus::Finishing | ExamStatus::Finished));

    let done = updates
        .wait_for(|s| s.status == ExamStatus::Finished)
        .await
        .unwrap()
        .clone();
    assert_eq!(done.remaining_millis, 0);
    assert_eq!(h.sink.answers_for_student(STUDENT).await.unwrap().len(), 2);
    assert_eq!(h.host.released(), 1);

    // The loser of the timeout race is rejected, not resubmitted.
    assert!(matches!(
        h.handle.finish().await,
        Err(ExamError::AlreadyFinalizing)
    ));
    assert_eq!(h.sink.writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn countdown_alone_finishes_an_expired_exam() {
    let h = harness(2).await;
    h.handle.activate(STUDENT, 1).await.unwrap();
    h.handle
        .record_answer(QuestionId::new(2), "before the bell")
        .await
        .unwrap();
    let mut updates = h.handle.subscribe();

    for _ in 0..30 {
        h.clock.advance_millis(1_000);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::InProgress);
    assert!(snap.remaining_millis < 60_000);

    for _ in 0..31 {
        h.clock.advance_millis(1_000);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    let done = updates
        .wait_for(|s| s.status == ExamStatus::Finished)
        .await
        .unwrap()
        .clone();
    assert_eq!(done.remaining_millis, 0);
    assert_eq!(h.host.released(), 1);

    let stored = h.sink.answers_for_student(STUDENT).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(
        h.sink.answers_for_question(QuestionId::new(2)).await.unwrap()[0].answer_text,
        "before the bell"
    );

    // The countdown is stopped; later wall-clock time changes nothing.
    h.clock.advance_millis(10_000);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.handle.snapshot(), done);
    assert_eq!(h.sink.writes(), 2);
}

#[tokio::test]
async fn ticks_after_the_exam_ends_change_nothing() {
    let h = harness(2).await;
    h.handle.activate(STUDENT, 1).await.unwrap();

    h.sink.set_offline(true);
    assert!(h.handle.finish().await.is_err());
    let failed = h.handle.snapshot();
    assert_eq!(failed.status, ExamStatus::Error);

    h.clock.advance_millis(120_000);
    assert_eq!(h.handle.tick().await.unwrap(), ExamStatus::Error);
    assert_eq!(h.handle.snapshot(), failed);
    assert_eq!(h.sink.writes(), 0);

    h.sink.set_offline(false);
    assert_eq!(h.handle.finish().await.unwrap(), 2);
    let finished = h.handle.snapshot();

    h.clock.advance_millis(120_000);
    assert_eq!(h.handle.tick().await.unwrap(), ExamStatus::Finished);
    assert_eq!(h.handle.snapshot(), finished);
    assert_eq!(h.sink.writes(), 2);
}

#[tokio::test]
async fn failed_submission_keeps_answers_for_retry() {
    let h = harness(3).await;
    h.handle.activate(STUDENT, 10).await.unwrap();
    h.handle
        .record_answer(QuestionId::new(1), "kept")
        .await
        .unwrap();

    h.sink.set_offline(true);
    let err = h.handle.finish().await.unwrap_err();
    assert!(matches!(err, ExamError::Submission(_)));

    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::Error);
    assert_eq!(snap.error.as_ref().unwrap().kind, FailureKind::Submission);
    assert!(snap.isolation_engaged);
    assert_eq!(snap.answered_count(), 1);
    assert!(matches!(
        h.handle.activate(STUDENT, 10).await,
        Err(ExamError::UnsubmittedAnswers)
    ));

    h.sink.set_offline(false);
    assert_eq!(h.handle.finish().await.unwrap(), 3);
    assert_eq!(h.handle.snapshot().status, ExamStatus::Finished);
    assert!(h.handle.snapshot().error.is_none());

    let stored = h.sink.answers_for_question(QuestionId::new(1)).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].answer_text, "kept");
    assert_eq!(h.sink.answers_for_student(STUDENT).await.unwrap().len(), 3);
}

#[tokio::test]
async fn denied_isolation_does_not_block_the_exam() {
    let h = spawn_with(Arc::new(bank(1).await), RecordingHost::denying());
    h.handle.activate(STUDENT, 10).await.unwrap();

    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::InProgress);
    assert!(!snap.isolation_engaged);
    assert_eq!(snap.error.as_ref().unwrap().kind, FailureKind::Isolation);

    assert!(h.handle.acknowledge_error().await.unwrap());
    assert!(h.handle.snapshot().error.is_none());

    h.handle.finish().await.unwrap();
    // Release is still requested on the way to Finished.
    assert_eq!(h.host.released(), 1);
}

#[tokio::test]
async fn toggles_apply_only_before_activation() {
    let h = harness(1).await;
    assert!(!h.handle.toggle_isolation().await.unwrap());
    assert!(!h.handle.toggle_proctoring().await.unwrap());

    h.handle.activate(STUDENT, 10).await.unwrap();
    assert_eq!(h.host.engaged(), 0);
    assert!(matches!(
        h.handle.toggle_isolation().await,
        Err(ExamError::InvalidState {
            status: ExamStatus::InProgress,
            ..
        })
    ));
    let snap = h.handle.snapshot();
    assert!(!snap.isolation_enabled);
    assert!(!snap.proctoring_enabled);
}

#[tokio::test]
async fn shutdown_releases_isolation_without_submitting() {
    let h = harness(2).await;
    h.handle.activate(STUDENT, 10).await.unwrap();
    h.handle
        .record_answer(QuestionId::new(2), "unsent")
        .await
        .unwrap();

    h.handle.shutdown().await.unwrap();

    assert_eq!(h.host.released(), 1);
    assert_eq!(h.sink.writes(), 0);
    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::InProgress);
    assert!(!snap.isolation_engaged);
    assert!(matches!(h.handle.finish().await, Err(ExamError::Closed)));
}

#[tokio::test]
async fn dropping_every_handle_tears_down() {
    let h = harness(1).await;
    h.handle.activate(STUDENT, 10).await.unwrap();
    let mut updates = h.handle.subscribe();
    assert!(updates.borrow().isolation_engaged);

    drop(h.handle);
    updates.wait_for(|s| !s.isolation_engaged).await.unwrap();
    assert_eq!(h.host.released(), 1);
    assert_eq!(h.sink.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn newer_activation_supersedes_pending_load() {
    let source = SlowSource::new(bank(2).await, Duration::from_secs(2));
    let h = spawn_with(Arc::new(source), RecordingHost::default());

    let (first, second) = tokio::join!(
        h.handle.activate(StudentId::new(1), 10),
        h.handle.activate(StudentId::new(2), 20),
    );
    assert!(matches!(first, Err(ExamError::Superseded)));
    second.unwrap();

    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::InProgress);
    assert_eq!(snap.student_id, Some(StudentId::new(2)));
    assert_eq!(snap.duration_millis, 20 * 60_000);
    assert_eq!(h.host.engaged(), 1);
}

#[tokio::test]
async fn load_failure_can_be_retried() {
    let source = Arc::new(SlowSource::new(bank(2).await, Duration::ZERO));
    source.failing.store(true, Ordering::SeqCst);
    let h = spawn_with(source.clone(), RecordingHost::default());

    let err = h.handle.activate(STUDENT, 10).await.unwrap_err();
    assert!(matches!(err, ExamError::Load(_)));
    let snap = h.handle.snapshot();
    assert_eq!(snap.status, ExamStatus::Error);
    assert_eq!(snap.error.as_ref().unwrap().kind, FailureKind::Load);
    assert_eq!(h.host.engaged(), 0);

    source.failing.store(false, Ordering::SeqCst);
    h.handle.activate(STUDENT, 10).await.unwrap();
    assert_eq!(h.handle.snapshot().status, ExamStatus::InProgress);
    assert!(h.handle.snapshot().error.is_none());
}

#[tokio::test]
async fn empty_question_bank_is_a_valid_attempt() {
    let h = harness(0).await;
    h.handle.activate(STUDENT, 10).await.unwrap();

    let snap = h.handle.snapshot();
    assert_eq!(snap.current_index, None);
    assert_eq!(h.handle.advance(Direction::Next).await.unwrap(), None);
    assert_eq!(h.handle.finish().await.unwrap(), 0);
    assert_eq!(h.handle.snapshot().status, ExamStatus::Finished);
}
