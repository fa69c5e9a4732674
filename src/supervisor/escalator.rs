//! Graceful-then-forceful worker termination.
//!
//! # Sequence
//! ```text
//! begin()    → close message channel
//!            → SIGTERM
//!            → arm EscalationTimer(timeout)
//! timer due  → escalate() → SIGKILL (once)
//! exit first → cancel()   → timer aborted, SIGKILL never sent
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::core::SupervisorEvent;
use super::record::{EscalationTimer, WorkerRecord};
use super::signaller::{SignalError, Signaller, Termination};

/// Drives the two termination stages for workers of one supervisor.
pub struct TerminationEscalator {
    signaller: Arc<dyn Signaller>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl TerminationEscalator {
    pub fn new(signaller: Arc<dyn Signaller>, events: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self { signaller, events }
    }

    /// Close the channel, send the graceful signal and arm the timer.
    ///
    /// A vanished worker is not an error; its exit notification follows.
    pub fn begin(&self, record: &mut WorkerRecord, timeout: Duration) -> Result<(), SignalError> {
        let worker = record.id();
        let launch = record.launch();
        record.close_channel();

        match self.signaller.signal(worker, Termination::Graceful) {
            Ok(()) => {}
            Err(SignalError::NoSuchProcess(_)) => {
                tracing::debug!(pid = %worker, "Worker already gone, not escalating");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(SupervisorEvent::EscalationDue { launch });
        });
        record.arm(EscalationTimer::new(handle));

        tracing::debug!(pid = %worker, timeout_ms = timeout.as_millis() as u64, "Graceful termination sent");
        Ok(())
    }

    /// Timer fired: send the forceful signal unless the worker already exited
    /// or was already forced. Returns whether a signal was sent.
    pub fn escalate(&self, record: &mut WorkerRecord) -> Result<bool, SignalError> {
        if record.take_timer().is_none() || !record.mark_forced() {
            return Ok(false);
        }

        match self.signaller.signal(record.id(), Termination::Forceful) {
            Ok(()) => Ok(true),
            Err(SignalError::NoSuchProcess(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The worker exited: drop any pending escalation.
    pub fn cancel(&self, record: &mut WorkerRecord) {
        if record.disarm() {
            tracing::debug!(pid = %record.id(), "Escalation cancelled, worker exited first");
        }
    }
}
