//! Per-launch worker state.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::registry::{LaunchId, WorkerId};

/// Pending "send the forceful signal" action for one worker.
#[derive(Debug)]
pub struct EscalationTimer {
    handle: JoinHandle<()>,
}

impl EscalationTimer {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Everything the supervisor tracks about one spawned worker.
#[derive(Debug)]
pub struct WorkerRecord {
    id: WorkerId,
    launch: LaunchId,
    launched_at: Instant,
    /// Set once termination was requested; the exit is then not a crash.
    pub deliberate_kill: bool,
    close: Option<oneshot::Sender<()>>,
    escalation: Option<EscalationTimer>,
    forced: bool,
}

impl WorkerRecord {
    pub fn new(
        id: WorkerId,
        launch: LaunchId,
        launched_at: Instant,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            launch,
            launched_at,
            deliberate_kill: false,
            close: Some(close),
            escalation: None,
            forced: false,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn launch(&self) -> LaunchId {
        self.launch
    }

    pub fn launched_at(&self) -> Instant {
        self.launched_at
    }

    /// Runtime as of `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.launched_at)
    }

    /// Close the message channel towards the worker. Returns `false` if already closed.
    pub fn close_channel(&mut self) -> bool {
        match self.close.take() {
            Some(close) => {
                let _ = close.send(());
                true
            }
            None => false,
        }
    }

    pub fn arm(&mut self, timer: EscalationTimer) {
        if let Some(previous) = self.escalation.replace(timer) {
            previous.cancel();
        }
    }

    /// Take the pending timer, if any, because it fired.
    pub fn take_timer(&mut self) -> Option<EscalationTimer> {
        self.escalation.take()
    }

    /// Cancel the pending timer. Returns `true` if one was pending.
    pub fn disarm(&mut self) -> bool {
        match self.escalation.take() {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.escalation.is_some()
    }

    /// Mark the forceful signal as sent. Returns `false` if it already was.
    pub fn mark_forced(&mut self) -> bool {
        !std::mem::replace(&mut self.forced, true)
    }
}
