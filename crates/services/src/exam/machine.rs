use tracing::debug;

use exam_core::model::{
    AnswerRecord, Direction, ExamSession, ExamSessionError, ExamSettings, ExamStatus, Question,
    QuestionId, StudentId,
};

use crate::error::{ExamError, ExamFailure, FailureKind};
use crate::exam::snapshot::ExamSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingActivation {
    generation: u64,
    student_id: StudentId,
    duration_millis: i64,
}

/// Result of feeding a question load back into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Started,
    Failed(String),
    /// The load belongs to a superseded activation and was ignored.
    Stale,
}

/// Result of feeding a submission back into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    Finished { submitted: usize },
    Failed(String),
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not in progress; stray ticks are dropped.
    Ignored,
    Running { remaining_millis: i64 },
    /// Time ran out and the machine entered `Finishing`.
    TimedOut { records: Vec<AnswerRecord> },
}

/// Synchronous exam lifecycle.
///
/// All transitions happen here; the actor only performs the asynchronous
/// load and submission steps and feeds their results back. Each activation
/// bumps a generation counter so completions from superseded work can be
/// recognized and dropped.
#[derive(Debug, Clone)]
pub struct ExamMachine {
    status: ExamStatus,
    session: Option<ExamSession>,
    pending: Option<PendingActivation>,
    generation: u64,
    isolation_enabled: bool,
    proctoring_enabled: bool,
    isolation_engaged: bool,
    low_time_warning_ms: i64,
    error: Option<ExamFailure>,
}

impl ExamMachine {
    #[must_use]
    pub fn new(settings: &ExamSettings) -> Self {
        Self {
            status: ExamStatus::NotStarted,
            session: None,
            pending: None,
            generation: 0,
            isolation_enabled: settings.isolation_enabled(),
            proctoring_enabled: settings.proctoring_enabled(),
            isolation_engaged: false,
            low_time_warning_ms: settings.low_time_warning_ms(),
            error: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> ExamStatus {
        self.status
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn session(&self) -> Option<&ExamSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ExamFailure> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn isolation_enabled(&self) -> bool {
        self.isolation_enabled
    }

    #[must_use]
    pub fn proctoring_enabled(&self) -> bool {
        self.proctoring_enabled
    }

    // ─── Activation ────────────────────────────────────────────────────────

    /// Enter `Loading` for a new attempt and return its generation.
    ///
    /// Calling this while a previous load is still pending supersedes it.
    ///
    /// # Errors
    ///
    /// - `ExamError::UnsubmittedAnswers` if a failed submission is waiting for retry.
    /// - `ExamError::InvalidState` while in progress, finishing or finished.
    /// - `ExamError::Session` if the duration is not positive.
    pub fn begin_activation(
        &mut self,
        student_id: StudentId,
        duration_millis: i64,
    ) -> Result<u64, ExamError> {
        match self.status {
            ExamStatus::Error if self.session.is_some() => {
                return Err(ExamError::UnsubmittedAnswers);
            }
            status if !status.can_transition_to(ExamStatus::Loading) => {
                return Err(ExamError::InvalidState {
                    operation: "activate",
                    status,
                });
            }
            _ => {}
        }
        if duration_millis <= 0 {
            return Err(ExamSessionError::InvalidDuration.into());
        }

        self.generation += 1;
        self.pending = Some(PendingActivation {
            generation: self.generation,
            student_id,
            duration_millis,
        });
        self.error = None;
        self.set_status(ExamStatus::Loading);
        Ok(self.generation)
    }

    /// Apply the outcome of the question load started by `begin_activation`.
    ///
    /// On success the attempt starts at `now_millis` with the full duration.
    pub fn complete_activation(
        &mut self,
        generation: u64,
        loaded: Result<Vec<Question>, String>,
        now_millis: i64,
    ) -> ActivationOutcome {
        let pending = match self.pending {
            Some(p) if p.generation == generation && self.status == ExamStatus::Loading => p,
            _ => return ActivationOutcome::Stale,
        };
        self.pending = None;

        let started = loaded.and_then(|questions| {
            ExamSession::new(
                pending.student_id,
                pending.duration_millis,
                now_millis,
                questions,
            )
            .map_err(|e| e.to_string())
        });

        match started {
            Ok(session) => {
                self.session = Some(session);
                self.error = None;
                self.set_status(ExamStatus::InProgress);
                ActivationOutcome::Started
            }
            Err(message) => {
                self.error = Some(ExamFailure::new(FailureKind::Load, message.clone()));
                self.set_status(ExamStatus::Error);
                ActivationOutcome::Failed(message)
            }
        }
    }

    // ─── Attempt ───────────────────────────────────────────────────────────

    /// Store the latest answer for a question (last write wins).
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` unless in progress, or
    /// `ExamError::Session` if the question is not part of the attempt.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        text: impl Into<String>,
    ) -> Result<(), ExamError> {
        self.in_progress_session("record an answer")?
            .record_answer(question_id, text)?;
        self.error = None;
        Ok(())
    }

    /// Move the question pointer, clamped at both ends. Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` unless in progress.
    pub fn advance(&mut self, direction: Direction) -> Result<Option<usize>, ExamError> {
        let session = self.in_progress_session("navigate")?;
        session.advance(direction);
        let index = session.current_index();
        self.error = None;
        Ok(index)
    }

    /// Recompute remaining time. Reaching zero starts finalization.
    pub fn tick(&mut self, now_millis: i64) -> TickOutcome {
        if self.status != ExamStatus::InProgress {
            return TickOutcome::Ignored;
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Ignored;
        };
        let remaining_millis = session.update_remaining(now_millis);
        if remaining_millis > 0 {
            return TickOutcome::Running { remaining_millis };
        }
        match self.begin_finish(now_millis) {
            Ok(records) => TickOutcome::TimedOut { records },
            Err(_) => TickOutcome::Ignored,
        }
    }

    // ─── Finalization ──────────────────────────────────────────────────────

    /// Enter `Finishing` and build one record per question.
    ///
    /// Allowed while in progress and after a failed submission. The answer
    /// buffer is read, not drained.
    ///
    /// # Errors
    ///
    /// - `ExamError::AlreadyFinalizing` while finishing or once finished.
    /// - `ExamError::InvalidState` before the attempt has started.
    pub fn begin_finish(&mut self, now_millis: i64) -> Result<Vec<AnswerRecord>, ExamError> {
        match self.status {
            ExamStatus::InProgress => {}
            ExamStatus::Error if self.session.is_some() => {}
            ExamStatus::Finishing | ExamStatus::Finished => {
                return Err(ExamError::AlreadyFinalizing);
            }
            status => {
                return Err(ExamError::InvalidState {
                    operation: "finish",
                    status,
                });
            }
        }
        let status = self.status;
        let Some(session) = self.session.as_mut() else {
            return Err(ExamError::InvalidState {
                operation: "finish",
                status,
            });
        };
        if status == ExamStatus::InProgress {
            session.update_remaining(now_millis);
        }
        let records = session.build_records(now_millis);

        self.error = None;
        self.set_status(ExamStatus::Finishing);
        Ok(records)
    }

    /// Apply the outcome of the submission started by `begin_finish`.
    pub fn complete_finish(
        &mut self,
        generation: u64,
        submitted: Result<usize, String>,
    ) -> FinishOutcome {
        if generation != self.generation || self.status != ExamStatus::Finishing {
            return FinishOutcome::Stale;
        }
        match submitted {
            Ok(submitted) => {
                self.error = None;
                self.set_status(ExamStatus::Finished);
                FinishOutcome::Finished { submitted }
            }
            Err(message) => {
                self.error = Some(ExamFailure::new(FailureKind::Submission, message.clone()));
                self.set_status(ExamStatus::Error);
                FinishOutcome::Failed(message)
            }
        }
    }

    // ─── Settings & errors ─────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` once an attempt has been started.
    pub fn toggle_isolation(&mut self) -> Result<bool, ExamError> {
        self.require_not_started("toggle isolation")?;
        self.isolation_enabled = !self.isolation_enabled;
        Ok(self.isolation_enabled)
    }

    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` once an attempt has been started.
    pub fn toggle_proctoring(&mut self) -> Result<bool, ExamError> {
        self.require_not_started("toggle proctoring")?;
        self.proctoring_enabled = !self.proctoring_enabled;
        Ok(self.proctoring_enabled)
    }

    pub fn set_isolation_engaged(&mut self, engaged: bool) {
        self.isolation_engaged = engaged;
    }

    /// Surface a lock-down failure without changing state.
    pub fn record_isolation_failure(&mut self, message: impl Into<String>) {
        self.error = Some(ExamFailure::new(FailureKind::Isolation, message));
    }

    /// Clear the surfaced error. Returns whether there was one.
    pub fn acknowledge_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        let mut snapshot = ExamSnapshot::idle(self.isolation_enabled, self.proctoring_enabled);
        snapshot.status = self.status;
        snapshot.isolation_engaged = self.isolation_engaged;
        snapshot.error = self.error.clone();

        if let Some(session) = &self.session {
            snapshot.session_id = Some(session.id());
            snapshot.student_id = Some(session.student_id());
            snapshot.questions = session.question_views();
            snapshot.duration_millis = session.duration_millis();
            snapshot.remaining_millis = session.remaining_millis();
            snapshot.progress = session.progress();
            if self.status == ExamStatus::InProgress {
                snapshot.current_index = session.current_index();
                snapshot.low_time = session.remaining_millis() < self.low_time_warning_ms;
            }
        } else if let Some(pending) = &self.pending {
            snapshot.student_id = Some(pending.student_id);
            snapshot.duration_millis = pending.duration_millis;
            snapshot.remaining_millis = pending.duration_millis;
        }
        snapshot
    }

    fn in_progress_session(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut ExamSession, ExamError> {
        let status = self.status;
        match self.session.as_mut() {
            Some(session) if status == ExamStatus::InProgress => Ok(session),
            _ => Err(ExamError::InvalidState { operation, status }),
        }
    }

    fn require_not_started(&self, operation: &'static str) -> Result<(), ExamError> {
        if self.status == ExamStatus::NotStarted {
            Ok(())
        } else {
            Err(ExamError::InvalidState {
                operation,
                status: self.status,
            })
        }
    }

    fn set_status(&mut self, next: ExamStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal exam transition {} -> {next}",
            self.status
        );
        debug!(from = %self.status, to = %next, "exam status changed");
        self.status = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{Difficulty, ExamSettingsDraft};

    const T0: i64 = 1_700_000_000_000;

    fn question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            Difficulty::new(2).unwrap(),
        )
        .unwrap()
    }

    fn questions(n: u64) -> Vec<Question> {
        (1..=n).map(question).collect()
    }

    fn machine() -> ExamMachine {
        ExamMachine::new(&ExamSettings::default())
    }

    fn started(n: u64, duration_millis: i64) -> ExamMachine {
        let mut m = machine();
        let generation = m.begin_activation(StudentId::new(7), duration_millis).unwrap();
        assert_eq!(
            m.complete_activation(generation, Ok(questions(n)), T0),
            ActivationOutcome::Started
        );
        m
    }

    #[test]
    fn activation_enters_in_progress_with_full_budget() {
        let mut m = machine();
        let generation = m.begin_activation(StudentId::new(7), 60_000).unwrap();
        assert_eq!(m.status(), ExamStatus::Loading);

        m.complete_activation(generation, Ok(questions(3)), T0);
        let snap = m.snapshot();
        assert_eq!(snap.status, ExamStatus::InProgress);
        assert_eq!(snap.remaining_millis, 60_000);
        assert_eq!(snap.current_index, Some(0));
        assert_eq!(snap.questions.len(), 3);
        assert_eq!(m.session().unwrap().started_at_millis(), T0);
    }

    #[test]
    fn load_failure_surfaces_error_and_allows_retry() {
        let mut m = machine();
        let generation = m.begin_activation(StudentId::new(7), 60_000).unwrap();
        let outcome = m.complete_activation(generation, Err("offline".into()), T0);
        assert_eq!(outcome, ActivationOutcome::Failed("offline".into()));
        assert_eq!(m.status(), ExamStatus::Error);
        assert_eq!(m.error().unwrap().kind, FailureKind::Load);

        let retry = m.begin_activation(StudentId::new(7), 60_000).unwrap();
        assert!(m.error().is_none());
        m.complete_activation(retry, Ok(questions(1)), T0);
        assert_eq!(m.status(), ExamStatus::InProgress);
    }

    #[test]
    fn superseded_load_is_ignored() {
        let mut m = machine();
        let first = m.begin_activation(StudentId::new(1), 60_000).unwrap();
        let second = m.begin_activation(StudentId::new(2), 30_000).unwrap();
        assert_ne!(first, second);

        assert_eq!(
            m.complete_activation(first, Ok(questions(5)), T0),
            ActivationOutcome::Stale
        );
        assert_eq!(m.status(), ExamStatus::Loading);

        m.complete_activation(second, Ok(questions(2)), T0);
        let snap = m.snapshot();
        assert_eq!(snap.student_id, Some(StudentId::new(2)));
        assert_eq!(snap.questions.len(), 2);
    }

    #[test]
    fn activation_is_rejected_while_running_or_done() {
        let mut m = started(2, 60_000);
        assert!(matches!(
            m.begin_activation(StudentId::new(7), 60_000),
            Err(ExamError::InvalidState {
                status: ExamStatus::InProgress,
                ..
            })
        ));

        let generation = m.generation();
        m.begin_finish(T0).unwrap();
        m.complete_finish(generation, Ok(2));
        assert!(matches!(
            m.begin_activation(StudentId::new(7), 60_000),
            Err(ExamError::InvalidState {
                status: ExamStatus::Finished,
                ..
            })
        ));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut m = machine();
        assert!(matches!(
            m.begin_activation(StudentId::new(7), 0),
            Err(ExamError::Session(ExamSessionError::InvalidDuration))
        ));
        assert_eq!(m.status(), ExamStatus::NotStarted);
    }

    #[test]
    fn duplicate_questions_fail_the_load() {
        let mut m = machine();
        let generation = m.begin_activation(StudentId::new(7), 60_000).unwrap();
        let outcome = m.complete_activation(generation, Ok(vec![question(1), question(1)]), T0);
        assert!(matches!(outcome, ActivationOutcome::Failed(_)));
        assert_eq!(m.status(), ExamStatus::Error);
    }

    #[test]
    fn navigation_is_clamped() {
        let mut m = started(3, 60_000);
        assert_eq!(m.advance(Direction::Previous).unwrap(), Some(0));
        assert_eq!(m.advance(Direction::Next).unwrap(), Some(1));
        assert_eq!(m.advance(Direction::Next).unwrap(), Some(2));
        assert_eq!(m.advance(Direction::Next).unwrap(), Some(2));
    }

    #[test]
    fn answers_require_in_progress_and_known_question() {
        let mut m = machine();
        assert!(matches!(
            m.record_answer(QuestionId::new(1), "early"),
            Err(ExamError::InvalidState { .. })
        ));

        let mut m = started(2, 60_000);
        m.record_answer(QuestionId::new(1), "first").unwrap();
        m.record_answer(QuestionId::new(1), "second").unwrap();
        assert!(matches!(
            m.record_answer(QuestionId::new(9), "nope"),
            Err(ExamError::Session(ExamSessionError::UnknownQuestion(_)))
        ));
        assert_eq!(m.snapshot().questions[0].student_answer, "second");
    }

    #[test]
    fn timeout_finishes_on_the_sixth_tick() {
        let mut m = started(2, 5_000);
        for k in 0..5 {
            let outcome = m.tick(T0 + k * 1_000);
            assert!(matches!(outcome, TickOutcome::Running { .. }), "tick {k}");
        }
        let outcome = m.tick(T0 + 5_000);
        let TickOutcome::TimedOut { records } = outcome else {
            panic!("expected timeout, got {outcome:?}");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(m.status(), ExamStatus::Finishing);
        assert_eq!(m.snapshot().remaining_millis, 0);
    }

    #[test]
    fn ticks_outside_in_progress_are_ignored() {
        let mut m = machine();
        assert_eq!(m.tick(T0), TickOutcome::Ignored);

        let mut m = started(1, 5_000);
        m.begin_finish(T0).unwrap();
        assert_eq!(m.tick(T0 + 10_000), TickOutcome::Ignored);
        assert_eq!(m.status(), ExamStatus::Finishing);
    }

    #[test]
    fn ticks_after_finished_are_ignored() {
        let mut m = started(2, 5_000);
        m.begin_finish(T0).unwrap();
        let generation = m.generation();
        assert_eq!(
            m.complete_finish(generation, Ok(2)),
            FinishOutcome::Finished { submitted: 2 }
        );

        let before = m.snapshot();
        assert_eq!(m.tick(T0 + 60_000), TickOutcome::Ignored);
        assert_eq!(m.status(), ExamStatus::Finished);
        assert_eq!(m.snapshot(), before);
    }

    #[test]
    fn ticks_after_failed_submission_are_ignored() {
        let mut m = started(2, 5_000);
        m.begin_finish(T0 + 1_000).unwrap();
        let generation = m.generation();
        m.complete_finish(generation, Err("sink offline".into()));
        assert_eq!(m.status(), ExamStatus::Error);

        let before = m.snapshot();
        assert_eq!(m.tick(T0 + 60_000), TickOutcome::Ignored);
        assert_eq!(m.status(), ExamStatus::Error);
        assert_eq!(m.snapshot(), before);
        assert_eq!(m.error().unwrap().kind, FailureKind::Submission);
    }

    #[test]
    fn finish_produces_one_record_per_question() {
        let mut m = started(4, 60_000);
        m.record_answer(QuestionId::new(2), "two").unwrap();
        m.record_answer(QuestionId::new(4), "four").unwrap();

        let records = m.begin_finish(T0 + 1_000).unwrap();
        assert_eq!(records.len(), 4);
        let empty = records.iter().filter(|r| r.answer_text.is_empty()).count();
        assert_eq!(empty, 2);
        assert!(records.iter().all(|r| r.student_id == StudentId::new(7)));
        assert!(records.iter().all(|r| r.grade.is_none()));
    }

    #[test]
    fn second_finish_is_rejected() {
        let mut m = started(2, 60_000);
        m.begin_finish(T0).unwrap();
        assert!(matches!(
            m.begin_finish(T0),
            Err(ExamError::AlreadyFinalizing)
        ));

        let generation = m.generation();
        m.complete_finish(generation, Ok(2));
        assert!(matches!(
            m.begin_finish(T0),
            Err(ExamError::AlreadyFinalizing)
        ));
    }

    #[test]
    fn failed_submission_keeps_answers_and_allows_retry() {
        let mut m = started(3, 60_000);
        m.record_answer(QuestionId::new(1), "kept").unwrap();
        let generation = m.generation();

        let first = m.begin_finish(T0).unwrap();
        m.complete_finish(generation, Err("disk full".into()));
        assert_eq!(m.status(), ExamStatus::Error);
        assert_eq!(m.error().unwrap().kind, FailureKind::Submission);
        assert!(matches!(
            m.begin_activation(StudentId::new(7), 60_000),
            Err(ExamError::UnsubmittedAnswers)
        ));

        let retry = m.begin_finish(T0).unwrap();
        assert_eq!(retry, first);
        assert!(m.error().is_none());
        assert_eq!(
            m.complete_finish(generation, Ok(3)),
            FinishOutcome::Finished { submitted: 3 }
        );
        assert_eq!(m.status(), ExamStatus::Finished);
    }

    #[test]
    fn empty_exam_is_valid() {
        let mut m = started(0, 60_000);
        let snap = m.snapshot();
        assert_eq!(snap.current_index, None);
        assert!(snap.current_question().is_none());
        assert_eq!(snap.progress, 0.0);
        assert!(m.begin_finish(T0).unwrap().is_empty());
    }

    #[test]
    fn toggles_only_before_start() {
        let mut m = machine();
        assert!(m.isolation_enabled());
        assert!(!m.toggle_isolation().unwrap());
        assert!(!m.toggle_proctoring().unwrap());

        let generation = m.begin_activation(StudentId::new(7), 60_000).unwrap();
        assert!(m.toggle_isolation().is_err());
        m.complete_activation(generation, Ok(questions(1)), T0);
        assert!(matches!(
            m.toggle_proctoring(),
            Err(ExamError::InvalidState {
                status: ExamStatus::InProgress,
                ..
            })
        ));
        assert!(!m.snapshot().isolation_enabled);
    }

    #[test]
    fn isolation_failure_does_not_change_state() {
        let mut m = started(1, 60_000);
        m.record_isolation_failure("denied");
        assert_eq!(m.status(), ExamStatus::InProgress);
        assert_eq!(m.error().unwrap().kind, FailureKind::Isolation);

        assert!(m.acknowledge_error());
        assert!(!m.acknowledge_error());
    }

    #[test]
    fn status_never_regresses() {
        fn rank(status: ExamStatus) -> u8 {
            match status {
                ExamStatus::NotStarted => 0,
                ExamStatus::Loading => 1,
                ExamStatus::InProgress => 2,
                ExamStatus::Finishing | ExamStatus::Error => 3,
                ExamStatus::Finished => 4,
            }
        }

        let mut m = started(2, 3_000);
        let generation = m.generation();
        let mut last = rank(m.status());
        let mut observe = |m: &ExamMachine| {
            let now = rank(m.status());
            assert!(now >= last, "regressed to {}", m.status());
            last = now;
        };

        m.tick(T0 + 1_000);
        observe(&m);
        m.tick(T0 + 3_000);
        observe(&m);
        m.complete_finish(generation, Err("flaky".into()));
        observe(&m);
        m.begin_finish(T0 + 4_000).unwrap();
        observe(&m);
        m.complete_finish(generation, Ok(2));
        observe(&m);
        let _ = m.begin_activation(StudentId::new(7), 1_000);
        m.tick(T0 + 9_000);
        observe(&m);
        assert_eq!(m.status(), ExamStatus::Finished);
    }

    #[test]
    fn low_time_flag_follows_threshold() {
        let settings = ExamSettingsDraft {
            low_time_warning_ms: Some(2_000),
            ..ExamSettingsDraft::default()
        }
        .validate()
        .unwrap();
        let mut m = ExamMachine::new(&settings);
        let generation = m.begin_activation(StudentId::new(7), 5_000).unwrap();
        m.complete_activation(generation, Ok(questions(1)), T0);

        m.tick(T0 + 2_000);
        assert!(!m.snapshot().low_time);
        m.tick(T0 + 3_500);
        assert!(m.snapshot().low_time);
        assert_eq!(m.snapshot().remaining_formatted(), "00:00:01");
    }
}
