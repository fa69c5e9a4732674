//! Supervisor states and lifecycle notices.

use std::fmt;
use std::time::Duration;

use super::registry::WorkerId;
use super::spawner::ExitOutcome;

/// Where the single worker slot stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// No worker; a launch may be pending.
    Idle,
    /// A spawn attempt is in progress.
    Launching,
    /// The current worker is up.
    Running { worker: WorkerId },
    /// The current worker was asked to terminate and has not exited yet.
    Killing { worker: WorkerId },
    /// Supervision gave up; only an explicit restart re-arms the slot.
    Stopped(FatalReason),
}

impl SupervisorState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, SupervisorState::Stopped(_))
    }
}

/// Why supervision stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    /// Every launch in the budget failed.
    BudgetExhausted { attempts: u32, last_error: String },
    /// The worker exited on its own before the minimum viable runtime.
    CrashLoop { worker: WorkerId, elapsed: Duration },
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::BudgetExhausted {
                attempts,
                last_error,
            } => write!(f, "{} consecutive launches failed, last: {}", attempts, last_error),
            FatalReason::CrashLoop { worker, elapsed } => write!(
                f,
                "worker {} crashed after only {:.3}s",
                worker,
                elapsed.as_secs_f64()
            ),
        }
    }
}

/// Lifecycle notices published on the supervisor bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorNotice {
    Launched {
        worker: WorkerId,
    },
    LaunchFailed {
        error: String,
        remaining: u32,
    },
    TerminationRequested {
        worker: WorkerId,
    },
    Escalated {
        worker: WorkerId,
    },
    Exited {
        worker: WorkerId,
        outcome: ExitOutcome,
        deliberate: bool,
        elapsed: Duration,
    },
    RelaunchScheduled {
        delay: Duration,
    },
    Fatal(FatalReason),
    /// A restart request revived a stopped slot.
    Rearmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_reason_mentions_context() {
        let crash = FatalReason::CrashLoop {
            worker: WorkerId::new(12),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(crash.to_string(), "worker 12 crashed after only 1.500s");

        let budget = FatalReason::BudgetExhausted {
            attempts: 3,
            last_error: "no such file".into(),
        };
        assert!(budget.to_string().starts_with("3 consecutive launches failed"));
    }
}
