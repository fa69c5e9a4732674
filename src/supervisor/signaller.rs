//! Signal delivery to workers.

use thiserror::Error;

use super::registry::WorkerId;

/// The two termination stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Catchable request to exit (`SIGTERM`).
    Graceful,
    /// Non-ignorable kill (`SIGKILL`).
    Forceful,
}

/// Error delivering a termination signal.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The target is already gone. Counts as successful termination.
    #[error("process {0} no longer exists")]
    NoSuchProcess(WorkerId),

    #[error("{stage:?} signal to process {worker} failed: {source}")]
    Failed {
        worker: WorkerId,
        stage: Termination,
        #[source]
        source: std::io::Error,
    },
}

/// Sends termination signals to worker processes.
pub trait Signaller: Send + Sync {
    fn signal(&self, worker: WorkerId, stage: Termination) -> Result<(), SignalError>;
}

/// Signaller backed by `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

#[cfg(unix)]
impl Signaller for NixSignaller {
    fn signal(&self, worker: WorkerId, stage: Termination) -> Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let signal = match stage {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Forceful => Signal::SIGKILL,
        };

        match kill(Pid::from_raw(worker.as_u32() as i32), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(SignalError::NoSuchProcess(worker)),
            Err(errno) => Err(SignalError::Failed {
                worker,
                stage,
                source: errno.into(),
            }),
        }
    }
}

#[cfg(not(unix))]
impl Signaller for NixSignaller {
    fn signal(&self, worker: WorkerId, stage: Termination) -> Result<(), SignalError> {
        Err(SignalError::Failed {
            worker,
            stage,
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "signals require a Unix host"),
        })
    }
}
