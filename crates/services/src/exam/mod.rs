mod actor;
mod countdown;
mod handle;
mod machine;
mod service;
mod snapshot;

// Public API of the exam subsystem.
pub use crate::error::{ExamError, ExamFailure, FailureKind};
pub use handle::ExamHandle;
pub use machine::{ActivationOutcome, ExamMachine, FinishOutcome, TickOutcome};
pub use service::ExamService;
pub use snapshot::ExamSnapshot;
