//! Worker process spawning.
//!
//! # Responsibilities
//! - Start the worker with stdin closed and stdout/stderr piped into the log
//! - Provide the out-of-band message channel as file descriptor 3
//! - Detach the worker into its own session
//! - Expose the exit as a future the supervisor can watch

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use futures_util::future::BoxFuture;
use thiserror::Error;

use super::channel::WorkerChannel;
use super::registry::WorkerId;
use crate::config::WorkerConfig;

/// File descriptor number of the message channel inside the worker.
pub const CHANNEL_FD: i32 = 3;

/// Environment variable telling the worker where its message channel is.
pub const CHANNEL_FD_ENV: &str = "MONARCH_CHANNEL_FD";

/// What to run as the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub output_label: String,
}

impl WorkerSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            output_label: "worker".to_string(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&WorkerConfig> for WorkerSpec {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            cwd: config.cwd.clone(),
            env: config.env.clone(),
            output_label: config.output_label.clone(),
        }
    }
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, when the worker exited on its own.
    pub code: Option<i32>,
    /// Terminating signal, when the worker was killed.
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn killed(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// The exit could not be observed (wait failed).
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self {
                code: status.code(),
                signal: status.signal(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                code: status.code(),
                signal: None,
            }
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// A worker that is running.
pub struct SpawnedWorker {
    pub id: WorkerId,
    /// Resolves once the worker has exited and been reaped.
    pub exit: BoxFuture<'static, ExitOutcome>,
    pub channel: WorkerChannel,
}

impl fmt::Debug for SpawnedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedWorker").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Error starting a worker. Always a launch failure, never a crash.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawned worker has no process id")]
    NoPid,

    #[error("message channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("message channel setup failed: {0}")]
    Channel(#[source] std::io::Error),
}

/// Starts worker processes.
pub trait Spawner: Send {
    fn spawn(&mut self, spec: &WorkerSpec) -> Result<SpawnedWorker, LaunchError>;
}

/// Spawner running real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandSpawner;

#[cfg(unix)]
impl Spawner for CommandSpawner {
    fn spawn(&mut self, spec: &WorkerSpec) -> Result<SpawnedWorker, LaunchError> {
        use std::os::fd::AsRawFd;
        use std::os::unix::net::UnixStream;
        use std::process::Stdio;

        use tokio::process::Command;

        use super::output::label_lines;

        let (master_end, worker_end) = UnixStream::pair().map_err(LaunchError::Channel)?;
        let worker_fd = worker_end.as_raw_fd();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(CHANNEL_FD_ENV, CHANNEL_FD.to_string())
            .kill_on_drop(false);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        // Only async-signal-safe syscalls run between fork and exec
        unsafe {
            cmd.pre_exec(move || install_channel_fd(worker_fd));
        }

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        drop(worker_end);

        let Some(pid) = child.id() else {
            return Err(LaunchError::NoPid);
        };
        let id = WorkerId::new(pid);

        let channel = match WorkerChannel::bridge(master_end) {
            Ok(channel) => channel,
            Err(e) => {
                let _ = child.start_kill();
                return Err(LaunchError::Channel(e));
            }
        };

        if let Some(stdout) = child.stdout.take() {
            label_lines(spec.output_label.clone(), "stdout", id, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            label_lines(spec.output_label.clone(), "stderr", id, stderr);
        }

        let exit = Box::pin(async move {
            match child.wait().await {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    tracing::warn!(pid = %id, error = %e, "Waiting for worker failed");
                    ExitOutcome::unknown()
                }
            }
        });

        Ok(SpawnedWorker { id, exit, channel })
    }
}

/// Runs in the forked child: new session, channel socket moved to fd 3.
#[cfg(unix)]
fn install_channel_fd(fd: std::os::fd::RawFd) -> std::io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use nix::unistd::{dup2, setsid};

    setsid()?;
    if fd == CHANNEL_FD {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
    } else {
        dup2(fd, CHANNEL_FD)?;
    }
    Ok(())
}

#[cfg(not(unix))]
impl Spawner for CommandSpawner {
    fn spawn(&mut self, _spec: &WorkerSpec) -> Result<SpawnedWorker, LaunchError> {
        Err(LaunchError::ChannelUnavailable(
            "worker message channel requires a Unix host".to_string(),
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_with_channel_on_fd_3() {
        let spec = WorkerSpec::new("sh").args([
            "-c",
            r#"test "$MONARCH_CHANNEL_FD" = 3 && printf '{"hello":"master"}\n' >&3"#,
        ]);

        let mut worker = CommandSpawner.spawn(&spec).unwrap();
        assert!(worker.id.as_u32() > 0);

        let message = worker.channel.inbound.recv().await;
        assert_eq!(message, Some(serde_json::json!({"hello": "master"})));
        assert_eq!(worker.exit.await, ExitOutcome::exited(0));
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let spec = WorkerSpec::new("/nonexistent/monarch-worker-12345");
        let err = CommandSpawner.spawn(&spec).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[test]
    fn outcome_display() {
        assert_eq!(ExitOutcome::exited(2).to_string(), "exit code 2");
        assert_eq!(ExitOutcome::killed(9).to_string(), "signal 9");
        assert_eq!(ExitOutcome::unknown().to_string(), "unknown status");
    }
}
