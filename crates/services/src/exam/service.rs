use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use exam_core::model::{ExamSettings, MAX_TICK_INTERVAL_MS};
use storage::repository::{AnswerRepository, QuestionRepository};

use crate::Clock;
use crate::exam::actor::ExamActor;
use crate::exam::handle::ExamHandle;
use crate::exam::machine::ExamMachine;
use crate::isolation::{IsolationController, IsolationHost};

const COMMAND_BUFFER: usize = 32;

/// Builds exam actors from injected collaborators.
#[derive(Clone)]
pub struct ExamService {
    clock: Clock,
    questions: Arc<dyn QuestionRepository>,
    answers: Arc<dyn AnswerRepository>,
    isolation: Arc<dyn IsolationHost>,
    settings: ExamSettings,
}

impl ExamService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        answers: Arc<dyn AnswerRepository>,
        isolation: Arc<dyn IsolationHost>,
    ) -> Self {
        Self {
            clock,
            questions,
            answers,
            isolation,
            settings: ExamSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExamSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    /// Start a fresh exam actor on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(&self) -> ExamHandle {
        let machine = ExamMachine::new(&self.settings);
        let tick_interval_ms = self.settings.tick_interval_ms().clamp(1, MAX_TICK_INTERVAL_MS);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let actor = ExamActor::new(
            machine,
            self.clock.clone(),
            Duration::from_millis(tick_interval_ms),
            Arc::clone(&self.questions),
            Arc::clone(&self.answers),
            IsolationController::new(Arc::clone(&self.isolation)),
            command_rx,
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        ExamHandle::new(command_tx, snapshot_rx)
    }
}
