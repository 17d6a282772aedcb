use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::IsolationError;

/// Host capability that locks the examinee into the exam surface.
///
/// `release` must be safe to call when nothing is engaged.
pub trait IsolationHost: Send + Sync {
    /// Request lock-down.
    ///
    /// # Errors
    ///
    /// Returns `IsolationError` if the host refuses or cannot lock down.
    fn engage(&self) -> Result<(), IsolationError>;

    fn release(&self);
}

/// Host without any lock-down facility. Engaging always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIsolationHost;

impl IsolationHost for NoopIsolationHost {
    fn engage(&self) -> Result<(), IsolationError> {
        Ok(())
    }

    fn release(&self) {}
}

/// Tracks whether lock-down is currently held for the running attempt.
pub struct IsolationController {
    host: Arc<dyn IsolationHost>,
    engaged: bool,
}

impl IsolationController {
    #[must_use]
    pub fn new(host: Arc<dyn IsolationHost>) -> Self {
        Self {
            host,
            engaged: false,
        }
    }

    /// Ask the host for lock-down. Failure is logged and returned, never raised.
    ///
    /// # Errors
    ///
    /// Returns the host's `IsolationError` when lock-down is refused.
    pub fn engage(&mut self) -> Result<(), IsolationError> {
        if self.engaged {
            return Ok(());
        }
        match self.host.engage() {
            Ok(()) => {
                self.engaged = true;
                info!("isolation engaged");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "isolation unavailable; continuing without lock-down");
                Err(err)
            }
        }
    }

    /// Drop lock-down. Idempotent.
    pub fn release(&mut self) {
        let was_engaged = std::mem::replace(&mut self.engaged, false);
        self.host.release();
        if was_engaged {
            info!("isolation released");
        } else {
            debug!("isolation release requested while not engaged");
        }
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}
