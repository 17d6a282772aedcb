//! Exam actor.
//!
//! The [`ExamActor`] owns the [`ExamMachine`] and is the only writer of exam
//! state. It runs a `select!` loop over:
//!
//! 1. [`ExamCommand`]s sent through an [`ExamHandle`](super::ExamHandle)
//! 2. Internal [`ActorEvent`]s: finished loads, finished submissions and
//!    countdown ticks
//!
//! Question loads and answer submissions run in spawned tasks and report back
//! as events tagged with the machine generation they were started for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use exam_core::model::{AnswerRecord, Question, StudentId};
use storage::repository::{AnswerRepository, QuestionRepository, StorageError};

use crate::Clock;
use crate::error::ExamError;
use crate::exam::countdown::Countdown;
use crate::exam::handle::ExamCommand;
use crate::exam::machine::{ActivationOutcome, ExamMachine, FinishOutcome, TickOutcome};
use crate::exam::snapshot::ExamSnapshot;
use crate::isolation::IsolationController;

const MILLIS_PER_MINUTE: i64 = 60_000;

pub(crate) enum ActorEvent {
    Loaded {
        generation: u64,
        result: Result<Vec<Question>, StorageError>,
    },
    Submitted {
        generation: u64,
        result: Result<usize, StorageError>,
    },
    Tick {
        generation: u64,
        now_millis: i64,
    },
}

pub(crate) struct ExamActor {
    machine: ExamMachine,
    clock: Clock,
    tick_interval: Duration,

    questions: Arc<dyn QuestionRepository>,
    answers: Arc<dyn AnswerRepository>,
    isolation: IsolationController,

    commands: mpsc::Receiver<ExamCommand>,
    events_tx: mpsc::UnboundedSender<ActorEvent>,
    events_rx: mpsc::UnboundedReceiver<ActorEvent>,
    snapshots: watch::Sender<ExamSnapshot>,

    countdown: Option<Countdown>,
    loading: Option<JoinHandle<()>>,

    /// Reply for the activation whose load is in flight.
    pending_activation: Option<oneshot::Sender<Result<(), ExamError>>>,
    /// Reply for the user-triggered finish whose submission is in flight.
    pending_finish: Option<oneshot::Sender<Result<usize, ExamError>>>,
}

impl ExamActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        machine: ExamMachine,
        clock: Clock,
        tick_interval: Duration,
        questions: Arc<dyn QuestionRepository>,
        answers: Arc<dyn AnswerRepository>,
        isolation: IsolationController,
        commands: mpsc::Receiver<ExamCommand>,
        snapshots: watch::Sender<ExamSnapshot>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            machine,
            clock,
            tick_interval,
            questions,
            answers,
            isolation,
            commands,
            events_tx,
            events_rx,
            snapshots,
            countdown: None,
            loading: None,
            pending_activation: None,
            pending_finish: None,
        }
    }

    /// Run until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ExamCommand::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
            self.publish();
        }

        self.teardown();
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// Publish the current snapshot if it changed. Called before every reply
    /// so a caller never observes a snapshot older than its own result.
    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, command: ExamCommand) {
        match command {
            ExamCommand::Activate {
                student_id,
                duration_minutes,
                reply,
            } => self.activate(student_id, duration_minutes, reply),
            ExamCommand::RecordAnswer {
                question_id,
                text,
                reply,
            } => {
                let result = self.machine.record_answer(question_id, text);
                if let Err(err) = &result {
                    warn!(question = %question_id, error = %err, "answer not recorded");
                }
                self.publish();
                let _ = reply.send(result);
            }
            ExamCommand::Advance { direction, reply } => {
                let result = self.machine.advance(direction);
                if let Err(err) = &result {
                    warn!(?direction, error = %err, "navigation rejected");
                }
                self.publish();
                let _ = reply.send(result);
            }
            ExamCommand::Tick { reply } => {
                let now_millis = self.clock.now_millis();
                self.on_tick(now_millis);
                self.publish();
                let _ = reply.send(self.machine.status());
            }
            ExamCommand::Finish { reply } => self.finish(reply),
            ExamCommand::ToggleIsolation { reply } => {
                let result = self.machine.toggle_isolation();
                self.publish();
                let _ = reply.send(result);
            }
            ExamCommand::ToggleProctoring { reply } => {
                let result = self.machine.toggle_proctoring();
                self.publish();
                let _ = reply.send(result);
            }
            ExamCommand::AcknowledgeError { reply } => {
                let result = self.machine.acknowledge_error();
                self.publish();
                let _ = reply.send(result);
            }
            ExamCommand::Shutdown { reply } => {
                // Handled by the run loop; answer anyway if routed here.
                let _ = reply.send(());
            }
        }
    }

    fn activate(
        &mut self,
        student_id: StudentId,
        duration_minutes: u32,
        reply: oneshot::Sender<Result<(), ExamError>>,
    ) {
        let duration_millis = i64::from(duration_minutes) * MILLIS_PER_MINUTE;
        let generation = match self.machine.begin_activation(student_id, duration_millis) {
            Ok(generation) => generation,
            Err(err) => {
                warn!(student = %student_id, error = %err, "activation rejected");
                self.publish();
                let _ = reply.send(Err(err));
                return;
            }
        };

        if let Some(previous) = self.pending_activation.replace(reply) {
            let _ = previous.send(Err(ExamError::Superseded));
        }
        if let Some(load) = self.loading.take() {
            debug!("aborting superseded question load");
            load.abort();
        }

        info!(student = %student_id, duration_minutes, generation, "loading exam questions");
        let questions = Arc::clone(&self.questions);
        let events = self.events_tx.clone();
        self.loading = Some(tokio::spawn(async move {
            let result = questions.load_questions().await;
            let _ = events.send(ActorEvent::Loaded { generation, result });
        }));
    }

    fn finish(&mut self, reply: oneshot::Sender<Result<usize, ExamError>>) {
        let now_millis = self.clock.now_millis();
        match self.machine.begin_finish(now_millis) {
            Ok(records) => {
                self.pending_finish = Some(reply);
                self.submit(records);
            }
            Err(err) => {
                warn!(error = %err, "finish rejected");
                self.publish();
                let _ = reply.send(Err(err));
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn handle_event(&mut self, event: ActorEvent) {
        match event {
            ActorEvent::Loaded { generation, result } => self.on_loaded(generation, result),
            ActorEvent::Submitted { generation, result } => {
                self.on_submitted(generation, result);
            }
            ActorEvent::Tick {
                generation,
                now_millis,
            } => {
                if generation == self.machine.generation() {
                    self.on_tick(now_millis);
                } else {
                    debug!(generation, "dropping tick from a previous attempt");
                }
            }
        }
    }

    fn on_loaded(&mut self, generation: u64, result: Result<Vec<Question>, StorageError>) {
        let now_millis = self.clock.now_millis();
        let outcome =
            self.machine
                .complete_activation(generation, result.map_err(|e| e.to_string()), now_millis);

        match outcome {
            ActivationOutcome::Stale => {
                debug!(generation, "ignoring stale question load");
            }
            ActivationOutcome::Started => {
                self.loading = None;
                if self.machine.isolation_enabled() {
                    match self.isolation.engage() {
                        Ok(()) => self.machine.set_isolation_engaged(true),
                        Err(err) => self.machine.record_isolation_failure(err.to_string()),
                    }
                }
                self.start_countdown();
                let questions = self.machine.session().map_or(0, |s| s.question_count());
                info!(generation, questions, "exam started");
                if let Some(reply) = self.pending_activation.take() {
                    self.publish();
                    let _ = reply.send(Ok(()));
                }
            }
            ActivationOutcome::Failed(message) => {
                self.loading = None;
                warn!(generation, error = %message, "failed to load exam questions");
                if let Some(reply) = self.pending_activation.take() {
                    self.publish();
                    let _ = reply.send(Err(ExamError::Load(message)));
                }
            }
        }
    }

    fn on_submitted(&mut self, generation: u64, result: Result<usize, StorageError>) {
        match self
            .machine
            .complete_finish(generation, result.map_err(|e| e.to_string()))
        {
            FinishOutcome::Stale => {
                debug!(generation, "ignoring stale submission result");
            }
            FinishOutcome::Finished { submitted } => {
                self.isolation.release();
                self.machine.set_isolation_engaged(false);
                info!(submitted, "exam finished");
                if let Some(reply) = self.pending_finish.take() {
                    self.publish();
                    let _ = reply.send(Ok(submitted));
                }
            }
            FinishOutcome::Failed(message) => {
                warn!(error = %message, "answer submission failed; answers kept for retry");
                if let Some(reply) = self.pending_finish.take() {
                    self.publish();
                    let _ = reply.send(Err(ExamError::Submission(message)));
                }
            }
        }
    }

    fn on_tick(&mut self, now_millis: i64) {
        match self.machine.tick(now_millis) {
            TickOutcome::Ignored => {
                debug!(status = %self.machine.status(), "tick ignored");
            }
            TickOutcome::Running { .. } => {}
            TickOutcome::TimedOut { records } => {
                info!("time is up; submitting answers");
                self.submit(records);
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn submit(&mut self, records: Vec<AnswerRecord>) {
        self.stop_countdown();
        let generation = self.machine.generation();
        let sink = Arc::clone(&self.answers);
        let events = self.events_tx.clone();
        info!(records = records.len(), "submitting answers");
        tokio::spawn(async move {
            let result = submit_all(sink.as_ref(), &records).await;
            let _ = events.send(ActorEvent::Submitted { generation, result });
        });
    }

    fn start_countdown(&mut self) {
        let generation = self.machine.generation();
        let clock = self.clock.clone();
        let events = self.events_tx.clone();
        self.countdown = Some(Countdown::start(self.tick_interval, move || {
            events
                .send(ActorEvent::Tick {
                    generation,
                    now_millis: clock.now_millis(),
                })
                .is_ok()
        }));
    }

    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.stop();
        }
    }

    /// Stop background work and drop lock-down. Never finishes the exam.
    fn teardown(&mut self) {
        self.stop_countdown();
        if let Some(load) = self.loading.take() {
            load.abort();
        }
        self.isolation.release();
        self.machine.set_isolation_engaged(false);
        self.publish();

        if let Some(reply) = self.pending_activation.take() {
            let _ = reply.send(Err(ExamError::Closed));
        }
        if let Some(reply) = self.pending_finish.take() {
            let _ = reply.send(Err(ExamError::Closed));
        }
        info!(status = %self.machine.status(), "exam session closed");
    }
}

/// Write every record, stopping at the first failure.
async fn submit_all(
    sink: &dyn AnswerRepository,
    records: &[AnswerRecord],
) -> Result<usize, StorageError> {
    for record in records {
        sink.upsert_answer(record).await?;
    }
    Ok(records.len())
}
