//! Line-oriented exam host: reads commands from stdin and renders snapshots.

use std::fmt;
use std::fmt::Write as _;

use exam_core::model::{Direction, ExamStatus, StudentId};
use services::{ExamError, ExamHandle, ExamSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    ToggleIsolation,
    ToggleProctoring,
    Answer(String),
    Next,
    Previous,
    Show,
    Finish,
    Acknowledge,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Empty,
    MissingAnswer,
    Unknown(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Empty => f.write_str("empty command"),
            InputError::MissingAnswer => f.write_str("answer requires text"),
            InputError::Unknown(cmd) => write!(f, "unknown command: {cmd} (try `help`)"),
        }
    }
}

impl std::error::Error for InputError {}

/// Parse one line of user input. The answer text keeps its inner spacing.
pub fn parse_input(line: &str) -> Result<Input, InputError> {
    let line = line.trim();
    let (cmd, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(cmd, rest)| (cmd, rest.trim()));

    match cmd.to_ascii_lowercase().as_str() {
        "" => Err(InputError::Empty),
        "start" => Ok(Input::Start),
        "isolation" => Ok(Input::ToggleIsolation),
        "proctoring" => Ok(Input::ToggleProctoring),
        "answer" | "a" => {
            if rest.is_empty() {
                Err(InputError::MissingAnswer)
            } else {
                Ok(Input::Answer(rest.to_string()))
            }
        }
        "next" | "n" => Ok(Input::Next),
        "prev" | "p" => Ok(Input::Previous),
        "show" | "s" => Ok(Input::Show),
        "finish" => Ok(Input::Finish),
        "ack" => Ok(Input::Acknowledge),
        "help" | "?" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        other => Err(InputError::Unknown(other.to_string())),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start               begin the exam");
    println!("  isolation           toggle lock-down (before start)");
    println!("  proctoring          toggle proctoring (before start)");
    println!("  answer <text>       answer the current question");
    println!("  next | prev         move between questions");
    println!("  show                print the current state");
    println!("  finish              submit all answers");
    println!("  ack                 dismiss the current error");
    println!("  quit                leave without submitting");
}

/// Human-readable view of a snapshot.
pub fn render(snapshot: &ExamSnapshot) -> String {
    let mut out = String::new();
    let _ = write!(out, "[{}]", snapshot.status);

    match snapshot.status {
        ExamStatus::NotStarted => {
            let _ = write!(
                out,
                " isolation {} | proctoring {}",
                on_off(snapshot.isolation_enabled),
                on_off(snapshot.proctoring_enabled)
            );
        }
        ExamStatus::Loading => out.push_str(" loading questions..."),
        _ => {
            let _ = write!(
                out,
                " {} remaining | {}/{} answered",
                snapshot.remaining_formatted(),
                snapshot.answered_count(),
                snapshot.questions.len()
            );
            if snapshot.low_time {
                out.push_str(" | LOW TIME");
            }
            if snapshot.isolation_engaged {
                out.push_str(" | locked");
            }
        }
    }

    if let (Some(index), Some(question)) = (snapshot.current_index, snapshot.current_question()) {
        let _ = write!(
            out,
            "\nQ{}/{} (difficulty {}): {}",
            index + 1,
            snapshot.questions.len(),
            question.difficulty.value(),
            question.text
        );
        if question.is_answered() {
            let _ = write!(out, "\n  answer: {}", question.student_answer);
        }
    }

    if let Some(error) = &snapshot.error {
        let _ = write!(out, "\n! {}", error.message);
    }
    out
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn emit(snapshot: &ExamSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(error = %err, "failed to encode snapshot"),
        }
    } else {
        println!("{}", render(snapshot));
    }
}

fn report(result: Result<(), ExamError>) {
    if let Err(err) = result {
        eprintln!("{err}");
    }
}

/// Drive one exam from stdin until it is finished or the user quits.
pub async fn run_exam(
    handle: ExamHandle,
    student_id: StudentId,
    duration_minutes: u32,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = handle.subscribe();
    let mut last_status = updates.borrow_and_update().status;

    emit(&handle.snapshot(), json);
    if !json {
        println!("Type `help` for commands.");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = match parse_input(&line) {
                    Ok(input) => input,
                    Err(InputError::Empty) => continue,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                match input {
                    Input::Quit => break,
                    Input::Help => {
                        print_help();
                        continue;
                    }
                    input => execute(&handle, input, student_id, duration_minutes).await,
                }
                let snapshot = updates.borrow_and_update().clone();
                last_status = snapshot.status;
                emit(&snapshot, json);
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.status != last_status {
                    last_status = snapshot.status;
                    emit(&snapshot, json);
                }
            }
        }

        if handle.snapshot().status == ExamStatus::Finished {
            break;
        }
    }

    let snapshot = handle.snapshot();
    if snapshot.status == ExamStatus::InProgress {
        eprintln!("leaving without submitting; answers are discarded");
    }
    handle.shutdown().await?;
    Ok(())
}

async fn execute(
    handle: &ExamHandle,
    input: Input,
    student_id: StudentId,
    duration_minutes: u32,
) {
    match input {
        Input::Start => report(handle.activate(student_id, duration_minutes).await),
        Input::ToggleIsolation => match handle.toggle_isolation().await {
            Ok(enabled) => println!("isolation {}", on_off(enabled)),
            Err(err) => eprintln!("{err}"),
        },
        Input::ToggleProctoring => match handle.toggle_proctoring().await {
            Ok(enabled) => println!("proctoring {}", on_off(enabled)),
            Err(err) => eprintln!("{err}"),
        },
        Input::Answer(text) => {
            let Some(question) = handle.snapshot().current_question().map(|q| q.question_id)
            else {
                eprintln!("no question to answer");
                return;
            };
            report(handle.record_answer(question, text).await);
        }
        Input::Next => report(handle.advance(Direction::Next).await.map(|_| ())),
        Input::Previous => report(handle.advance(Direction::Previous).await.map(|_| ())),
        Input::Finish => match handle.finish().await {
            Ok(submitted) => println!("submitted {submitted} answers"),
            Err(err) => eprintln!("{err}"),
        },
        Input::Acknowledge => report(handle.acknowledge_error().await.map(|_| ())),
        Input::Show | Input::Help | Input::Quit => {}
    }
}
