//! Shared fakes for supervisor and election integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, oneshot};

use monarch::config::SupervisorConfig;
use monarch::supervisor::{
    ExitOutcome, LaunchError, Message, MessageRelay, MessageSender, SignalError, Signaller,
    SpawnedWorker, Spawner, SupervisorNotice, Termination, WorkerChannel, WorkerEnd, WorkerId,
};

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;
const EPERM: i32 = 1;

/// In-process stand-in for the OS: spawns fake workers and delivers fake signals.
#[derive(Clone, Default)]
pub struct FakeHost {
    inner: Arc<Mutex<HostState>>,
}

#[derive(Default)]
struct HostState {
    spawn_calls: u32,
    failing_launches: u32,
    next_pid: u32,
    ignore_sigterm: bool,
    reuse_pids: bool,
    failing_signals: Vec<Termination>,
    exits: HashMap<WorkerId, oneshot::Sender<ExitOutcome>>,
    ends: HashMap<WorkerId, WorkerEnd>,
    signals: Vec<(WorkerId, Termination)>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` spawn calls fail.
    pub fn fail_launches(&self, n: u32) {
        self.inner.lock().unwrap().failing_launches = n;
    }

    /// Workers survive SIGTERM and only die on SIGKILL.
    pub fn ignore_sigterm(&self, ignore: bool) {
        self.inner.lock().unwrap().ignore_sigterm = ignore;
    }

    /// Delivering `stage` fails with EPERM instead of reaching the worker.
    pub fn fail_signals(&self, stage: Termination) {
        self.inner.lock().unwrap().failing_signals.push(stage);
    }

    /// New workers take the lowest pid no live worker holds, as a busy OS may.
    pub fn reuse_pids(&self, reuse: bool) {
        self.inner.lock().unwrap().reuse_pids = reuse;
    }

    pub fn spawn_calls(&self) -> u32 {
        self.inner.lock().unwrap().spawn_calls
    }

    /// Every signal delivered so far, in order.
    pub fn signals(&self) -> Vec<(WorkerId, Termination)> {
        self.inner.lock().unwrap().signals.clone()
    }

    pub fn signals_to(&self, worker: WorkerId) -> Vec<Termination> {
        self.signals()
            .into_iter()
            .filter(|(id, _)| *id == worker)
            .map(|(_, stage)| stage)
            .collect()
    }

    pub fn is_alive(&self, worker: WorkerId) -> bool {
        self.inner.lock().unwrap().exits.contains_key(&worker)
    }

    /// Make a worker exit on its own.
    pub fn crash(&self, worker: WorkerId, code: i32) {
        self.exit(worker, ExitOutcome::exited(code));
    }

    /// Worker side of the message channel, once per worker.
    pub fn take_end(&self, worker: WorkerId) -> Option<WorkerEnd> {
        self.inner.lock().unwrap().ends.remove(&worker)
    }

    fn exit(&self, worker: WorkerId, outcome: ExitOutcome) -> bool {
        let tx = self.inner.lock().unwrap().exits.remove(&worker);
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn spawner(&self) -> FakeSpawner {
        FakeSpawner { host: self.clone() }
    }

    pub fn signaller(&self) -> Arc<FakeSignaller> {
        Arc::new(FakeSignaller { host: self.clone() })
    }
}

pub struct FakeSpawner {
    host: FakeHost,
}

impl Spawner for FakeSpawner {
    fn spawn(&mut self, spec: &monarch::supervisor::WorkerSpec) -> Result<SpawnedWorker, LaunchError> {
        let mut state = self.host.inner.lock().unwrap();
        state.spawn_calls += 1;

        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(LaunchError::Spawn {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }

        state.next_pid += 1;
        let id = if state.reuse_pids {
            (1001..)
                .map(WorkerId::new)
                .find(|id| !state.exits.contains_key(id))
                .unwrap()
        } else {
            WorkerId::new(1000 + state.next_pid)
        };
        let (exit_tx, exit_rx) = oneshot::channel();
        let (channel, end) = WorkerChannel::in_memory();
        state.exits.insert(id, exit_tx);
        state.ends.insert(id, end);

        Ok(SpawnedWorker {
            id,
            exit: exit_rx.map(|r| r.unwrap_or_else(|_| ExitOutcome::unknown())).boxed(),
            channel,
        })
    }
}

pub struct FakeSignaller {
    host: FakeHost,
}

impl Signaller for FakeSignaller {
    fn signal(&self, worker: WorkerId, stage: Termination) -> Result<(), SignalError> {
        let ignore_sigterm = {
            let mut state = self.host.inner.lock().unwrap();
            if !state.exits.contains_key(&worker) {
                return Err(SignalError::NoSuchProcess(worker));
            }
            state.signals.push((worker, stage));
            if state.failing_signals.contains(&stage) {
                return Err(SignalError::Failed {
                    worker,
                    stage,
                    source: io::Error::from_raw_os_error(EPERM),
                });
            }
            state.ignore_sigterm
        };

        match stage {
            Termination::Graceful if ignore_sigterm => {}
            Termination::Graceful => {
                self.host.exit(worker, ExitOutcome::killed(SIGTERM));
            }
            Termination::Forceful => {
                self.host.exit(worker, ExitOutcome::killed(SIGKILL));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum RelayEvent {
    Connected(WorkerId, MessageSender),
    Message(WorkerId, Message),
    Disconnected(WorkerId),
}

/// Relay that forwards everything it sees to the test.
pub struct RecordingRelay {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RecordingRelay {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl MessageRelay for RecordingRelay {
    fn connect(&self, worker: WorkerId, sender: MessageSender) {
        let _ = self.tx.send(RelayEvent::Connected(worker, sender));
    }

    fn on_message(&self, worker: WorkerId, message: Message) {
        let _ = self.tx.send(RelayEvent::Message(worker, message));
    }

    fn disconnect(&self, worker: WorkerId) {
        let _ = self.tx.send(RelayEvent::Disconnected(worker));
    }
}

/// Supervisor settings with small, round numbers.
pub fn test_config(max_bad_launches: u32) -> SupervisorConfig {
    SupervisorConfig {
        max_bad_launches,
        min_crash_duration_ms: 3_000,
        escalation_timeout_ms: 3_000,
        relaunch_base_delay_ms: 100,
        relaunch_max_delay_ms: 1_000,
    }
}

/// Wait for the first notice matching `pred`; panics after a minute of (virtual) time.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SupervisorNotice>, mut pred: F) -> SupervisorNotice
where
    F: FnMut(&SupervisorNotice) -> bool,
{
    within(Duration::from_secs(60), async {
        loop {
            let notice = rx.recv().await.expect("notice bus closed");
            if pred(&notice) {
                return notice;
            }
        }
    })
    .await
}

pub async fn launched(rx: &mut broadcast::Receiver<SupervisorNotice>) -> WorkerId {
    match wait_for(rx, |n| matches!(n, SupervisorNotice::Launched { .. })).await {
        SupervisorNotice::Launched { worker } => worker,
        _ => unreachable!(),
    }
}

pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .expect("timed out waiting")
}
