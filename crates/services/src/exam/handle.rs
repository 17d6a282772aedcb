use tokio::sync::{mpsc, oneshot, watch};

use exam_core::model::{Direction, ExamStatus, QuestionId, StudentId};

use crate::error::ExamError;
use crate::exam::snapshot::ExamSnapshot;

type Reply<T> = oneshot::Sender<Result<T, ExamError>>;

/// Requests processed by the exam actor, one at a time.
pub(crate) enum ExamCommand {
    Activate {
        student_id: StudentId,
        duration_minutes: u32,
        reply: Reply<()>,
    },
    RecordAnswer {
        question_id: QuestionId,
        text: String,
        reply: Reply<()>,
    },
    Advance {
        direction: Direction,
        reply: Reply<Option<usize>>,
    },
    Tick {
        reply: oneshot::Sender<ExamStatus>,
    },
    Finish {
        reply: Reply<usize>,
    },
    ToggleIsolation {
        reply: Reply<bool>,
    },
    ToggleProctoring {
        reply: Reply<bool>,
    },
    AcknowledgeError {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front end of a running exam.
///
/// Every call is serialized through the exam actor. When the last handle is
/// dropped the actor tears down as if `shutdown` had been called.
#[derive(Clone)]
pub struct ExamHandle {
    commands: mpsc::Sender<ExamCommand>,
    snapshots: watch::Receiver<ExamSnapshot>,
}

impl ExamHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<ExamCommand>,
        snapshots: watch::Receiver<ExamSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ExamCommand,
    ) -> Result<T, ExamError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| ExamError::Closed)?;
        rx.await.map_err(|_| ExamError::Closed)
    }

    /// Start an attempt. Resolves once the question set has loaded.
    ///
    /// # Errors
    ///
    /// - `ExamError::Load` if the question source failed.
    /// - `ExamError::Superseded` if a newer `activate` replaced this one.
    /// - `ExamError::InvalidState` / `ExamError::UnsubmittedAnswers` if the
    ///   current state does not allow a new attempt.
    pub async fn activate(
        &self,
        student_id: StudentId,
        duration_minutes: u32,
    ) -> Result<(), ExamError> {
        self.call(|reply| ExamCommand::Activate {
            student_id,
            duration_minutes,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// Returns `ExamError` if no attempt is running or the question is unknown.
    pub async fn record_answer(
        &self,
        question_id: QuestionId,
        text: impl Into<String>,
    ) -> Result<(), ExamError> {
        let text = text.into();
        self.call(|reply| ExamCommand::RecordAnswer {
            question_id,
            text,
            reply,
        })
        .await?
    }

    /// Move to the next or previous question. Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` if no attempt is running.
    pub async fn advance(&self, direction: Direction) -> Result<Option<usize>, ExamError> {
        self.call(|reply| ExamCommand::Advance { direction, reply })
            .await?
    }

    /// Deliver a tick at the clock's current time, as the countdown does.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Closed` if the actor has stopped.
    pub async fn tick(&self) -> Result<ExamStatus, ExamError> {
        self.call(|reply| ExamCommand::Tick { reply }).await
    }

    /// Submit every answer. Resolves with the number of records written.
    ///
    /// # Errors
    ///
    /// - `ExamError::AlreadyFinalizing` if another finish won the race.
    /// - `ExamError::Submission` if the sink failed; answers are kept and
    ///   `finish` may be called again.
    pub async fn finish(&self) -> Result<usize, ExamError> {
        self.call(|reply| ExamCommand::Finish { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` once an attempt has started.
    pub async fn toggle_isolation(&self) -> Result<bool, ExamError> {
        self.call(|reply| ExamCommand::ToggleIsolation { reply })
            .await?
    }

    /// # Errors
    ///
    /// Returns `ExamError::InvalidState` once an attempt has started.
    pub async fn toggle_proctoring(&self) -> Result<bool, ExamError> {
        self.call(|reply| ExamCommand::ToggleProctoring { reply })
            .await?
    }

    /// Clear the surfaced error. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Closed` if the actor has stopped.
    pub async fn acknowledge_error(&self) -> Result<bool, ExamError> {
        self.call(|reply| ExamCommand::AcknowledgeError { reply })
            .await
    }

    /// Stop the timer, release isolation and stop the actor without finishing.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Closed` if the actor had already stopped.
    pub async fn shutdown(&self) -> Result<(), ExamError> {
        self.call(|reply| ExamCommand::Shutdown { reply }).await
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every processed command or event.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExamSnapshot> {
        self.snapshots.clone()
    }
}
