//! # ProcessSupervisor: single worker slot control loop.
//!
//! Every transition runs on one task consuming one event queue. Exit
//! watchers, channel readers and timers are separate tasks that only post
//! events, so the registry and record table need no locking.
//!
//! ## State machine
//! ```text
//!            ┌──────────────── relaunch (next turn) ───────────────┐
//!            ▼                                                     │
//! Idle ─► Launching ─► Running ─► unsolicited exit ─┬─ elapsed ≥ min ┘
//!            │            │                         └─ elapsed < min ─► Stopped (crash loop)
//!            │            └─► Killing ─► exit ─► Idle (no relaunch)
//!            └─ spawn error ─┬─ budget left ─► Idle ─► relaunch after backoff
//!                            └─ exhausted   ─► Stopped (budget)
//! ```
//!
//! ## Rules
//! - Every registered worker is killed before a new spawn
//! - A deliberately killed worker is never relaunched
//! - Relaunches are posted events, never inline calls
//! - Only the most recently scheduled launch runs
//! - After `Terminate` the slot stays parked: failed kills spend budget but
//!   schedule nothing until the next `Restart`

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use super::budget::SupervisorBudget;
use super::channel::{Message, MessageSender, WorkerChannel};
use super::escalator::TerminationEscalator;
use super::record::WorkerRecord;
use super::registry::{KillRegistry, KillSwitch, LaunchId, WorkerId};
use super::relay::MessageRelay;
use super::signaller::Signaller;
use super::spawner::{ExitOutcome, SpawnedWorker, Spawner, WorkerSpec};
use super::state::{FatalReason, SupervisorNotice, SupervisorState};
use crate::config::SupervisorConfig;
use crate::observability::metrics;
use crate::resilience::backoff::relaunch_delay;

/// Capacity of the notice bus; slow subscribers lag, they never block the loop.
const NOTICE_CAPACITY: usize = 256;

/// Input to the supervisor control loop.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Launch turn; stale unless `seq` is the latest scheduled launch.
    Launch { seq: u64 },
    Exited {
        launch: LaunchId,
        worker: WorkerId,
        outcome: ExitOutcome,
    },
    Message { worker: WorkerId, message: Message },
    Disconnected { worker: WorkerId },
    EscalationDue { launch: LaunchId },
    Command(SupervisorCommand),
}

/// Requests from outside the control loop.
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Kill every worker and launch a fresh one. Re-arms a stopped slot.
    Restart { escalation_timeout: Option<Duration> },
    /// Kill every worker without relaunching.
    Terminate,
    /// Kill every worker, wait for their exits, end the loop.
    Shutdown,
    /// Report the workers currently in the kill registry.
    LiveWorkers(oneshot::Sender<Vec<WorkerId>>),
}

/// The supervisor loop has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("supervisor is no longer running")]
pub struct SupervisorGone;

/// Cloneable control surface of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    events: mpsc::UnboundedSender<SupervisorEvent>,
    state: watch::Receiver<SupervisorState>,
    notices: broadcast::Sender<SupervisorNotice>,
}

impl SupervisorHandle {
    fn command(&self, command: SupervisorCommand) -> Result<(), SupervisorGone> {
        self.events
            .send(SupervisorEvent::Command(command))
            .map_err(|_| SupervisorGone)
    }

    /// Kill the current worker and launch a new one.
    pub fn restart(&self) -> Result<(), SupervisorGone> {
        self.command(SupervisorCommand::Restart {
            escalation_timeout: None,
        })
    }

    /// Restart with a different grace period for the workers being replaced.
    pub fn restart_with_escalation(&self, escalation_timeout: Duration) -> Result<(), SupervisorGone> {
        self.command(SupervisorCommand::Restart {
            escalation_timeout: Some(escalation_timeout),
        })
    }

    /// Kill the current worker without relaunching.
    ///
    /// A kill that fails still counts against the launch budget, and an
    /// exhausted budget still stops the supervisor, but no relaunch is
    /// scheduled until the next [`restart`](Self::restart).
    pub fn terminate(&self) -> Result<(), SupervisorGone> {
        self.command(SupervisorCommand::Terminate)
    }

    /// Kill every worker and stop the supervisor once they have exited.
    pub fn shutdown(&self) -> Result<(), SupervisorGone> {
        self.command(SupervisorCommand::Shutdown)
    }

    /// Workers currently registered for termination.
    pub async fn live_workers(&self) -> Result<Vec<WorkerId>, SupervisorGone> {
        let (tx, rx) = oneshot::channel();
        self.command(SupervisorCommand::LiveWorkers(tx))?;
        rx.await.map_err(|_| SupervisorGone)
    }

    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Subscribe to lifecycle notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorNotice> {
        self.notices.subscribe()
    }
}

/// Supervises exactly one worker slot.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    spec: WorkerSpec,
    spawner: Box<dyn Spawner>,
    relay: Arc<dyn MessageRelay>,
    escalator: TerminationEscalator,
    registry: KillRegistry,
    records: HashMap<LaunchId, WorkerRecord>,
    budget: SupervisorBudget,
    current: Option<LaunchId>,
    last_launch: LaunchId,
    launch_seq: u64,
    parked: bool,
    stopping: bool,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    state: watch::Sender<SupervisorState>,
    notices: broadcast::Sender<SupervisorNotice>,
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        spec: WorkerSpec,
        spawner: impl Spawner + 'static,
        signaller: Arc<dyn Signaller>,
        relay: Arc<dyn MessageRelay>,
    ) -> (Self, SupervisorHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SupervisorState::Idle);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = SupervisorHandle {
            events: events_tx.clone(),
            state: state_rx,
            notices: notices.clone(),
        };

        let supervisor = Self {
            budget: SupervisorBudget::new(config.max_bad_launches),
            escalator: TerminationEscalator::new(signaller, events_tx.clone()),
            config,
            spec,
            spawner: Box::new(spawner),
            relay,
            registry: KillRegistry::new(),
            records: HashMap::new(),
            current: None,
            last_launch: LaunchId::new(0),
            launch_seq: 0,
            parked: false,
            stopping: false,
            events_tx,
            events_rx,
            state,
            notices,
        };

        (supervisor, handle)
    }

    /// Launch the worker and supervise it until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            program = %self.spec.program,
            max_bad_launches = self.config.max_bad_launches,
            min_crash_duration_ms = self.config.min_crash_duration_ms,
            escalation_timeout_ms = self.config.escalation_timeout_ms,
            "Supervisor starting"
        );

        self.schedule_launch(Duration::ZERO);

        while let Some(event) = self.events_rx.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }

        tracing::info!("Supervisor stopped");
    }

    fn handle(&mut self, event: SupervisorEvent) -> ControlFlow<()> {
        match event {
            SupervisorEvent::Launch { seq } => {
                if seq == self.launch_seq {
                    self.launch(seq);
                }
            }
            SupervisorEvent::Exited {
                launch,
                worker,
                outcome,
            } => return self.on_exit(launch, worker, outcome),
            SupervisorEvent::Message { worker, message } => self.relay.on_message(worker, message),
            SupervisorEvent::Disconnected { worker } => {
                tracing::debug!(pid = %worker, "Worker disconnected");
                self.relay.disconnect(worker);
            }
            SupervisorEvent::EscalationDue { launch } => self.on_escalation_due(launch),
            SupervisorEvent::Command(command) => return self.on_command(command),
        }
        ControlFlow::Continue(())
    }

    fn on_command(&mut self, command: SupervisorCommand) -> ControlFlow<()> {
        match command {
            SupervisorCommand::Restart { escalation_timeout } => {
                if self.stopping {
                    return ControlFlow::Continue(());
                }
                if self.state.borrow().is_stopped() {
                    tracing::info!("Restart requested, re-arming stopped supervisor");
                    self.budget.reset();
                    self.publish(SupervisorNotice::Rearmed);
                    self.set_state(SupervisorState::Idle);
                } else {
                    tracing::info!("Restart requested");
                }
                self.parked = false;
                self.sweep(escalation_timeout);
                self.schedule_launch(Duration::ZERO);
            }
            SupervisorCommand::Terminate => {
                tracing::info!("Termination requested");
                self.parked = true;
                self.cancel_pending_launch();
                self.sweep(None);
                if self.records.is_empty() && !self.state.borrow().is_stopped() {
                    self.set_state(SupervisorState::Idle);
                }
            }
            SupervisorCommand::Shutdown => {
                tracing::info!(workers = self.records.len(), "Shutdown requested");
                self.stopping = true;
                self.cancel_pending_launch();
                self.sweep(None);
                if self.records.is_empty() {
                    return ControlFlow::Break(());
                }
            }
            SupervisorCommand::LiveWorkers(reply) => {
                let _ = reply.send(self.registry.workers());
            }
        }
        ControlFlow::Continue(())
    }

    /// Post a launch event, superseding any launch scheduled earlier.
    fn schedule_launch(&mut self, delay: Duration) {
        if self.stopping {
            return;
        }
        self.launch_seq += 1;
        let seq = self.launch_seq;

        if delay.is_zero() {
            let _ = self.events_tx.send(SupervisorEvent::Launch { seq });
        } else {
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(SupervisorEvent::Launch { seq });
            });
        }
    }

    fn cancel_pending_launch(&mut self) {
        self.launch_seq += 1;
    }

    fn launch(&mut self, seq: u64) {
        if self.stopping || self.state.borrow().is_stopped() {
            return;
        }

        // at most one worker per slot: previous instances go first
        self.sweep(None);
        if seq != self.launch_seq || self.state.borrow().is_stopped() {
            // a failed kill already rescheduled or stopped the slot
            return;
        }
        self.set_state(SupervisorState::Launching);

        match self.spawner.spawn(&self.spec) {
            Ok(worker) => self.on_spawned(worker),
            Err(e) => {
                metrics::record_launch_failure();
                self.on_failure(e.to_string());
            }
        }
    }

    fn on_spawned(&mut self, worker: SpawnedWorker) {
        let SpawnedWorker { id, exit, channel } = worker;
        let WorkerChannel {
            outbound,
            inbound,
            close,
        } = channel;
        let launched_at = Instant::now();
        self.last_launch = self.last_launch.next();
        let launch = self.last_launch;

        self.records
            .insert(launch, WorkerRecord::new(id, launch, launched_at, close));
        self.registry.register(KillSwitch::new(
            launch,
            id,
            self.config.escalation_timeout(),
        ));
        self.current = Some(launch);

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = exit.await;
            let _ = events.send(SupervisorEvent::Exited {
                launch,
                worker: id,
                outcome,
            });
        });

        let events = self.events_tx.clone();
        tokio::spawn(forward_inbound(id, inbound, events));

        self.relay.connect(id, MessageSender::new(outbound));
        self.budget.reset();

        metrics::record_launch();
        metrics::record_budget(self.budget.remaining());
        tracing::info!(pid = %id, %launch, "Worker launched");

        self.set_state(SupervisorState::Running { worker: id });
        self.publish(SupervisorNotice::Launched { worker: id });
    }

    /// A launch attempt failed: spend budget, then retry or stop.
    fn on_failure(&mut self, error: String) {
        let retry = self.budget.consume();
        metrics::record_budget(self.budget.remaining());
        tracing::warn!(
            error = %error,
            remaining = self.budget.remaining(),
            "Worker launch failed"
        );
        self.publish(SupervisorNotice::LaunchFailed {
            error: error.clone(),
            remaining: self.budget.remaining(),
        });

        if self.stopping {
            return;
        }

        if retry && self.parked {
            tracing::debug!("Slot parked after terminate, not relaunching");
        } else if retry {
            let delay = relaunch_delay(
                self.budget.failures(),
                self.config.relaunch_base_delay_ms,
                self.config.relaunch_max_delay_ms,
            );
            self.set_state(SupervisorState::Idle);
            self.publish(SupervisorNotice::RelaunchScheduled { delay });
            self.schedule_launch(delay);
        } else {
            self.fatal(FatalReason::BudgetExhausted {
                attempts: self.budget.max(),
                last_error: error,
            });
        }
    }

    fn on_exit(&mut self, launch: LaunchId, worker: WorkerId, outcome: ExitOutcome) -> ControlFlow<()> {
        self.registry.deregister(launch);
        let Some(mut record) = self.records.remove(&launch) else {
            tracing::debug!(pid = %worker, %launch, "Exit of unknown worker ignored");
            return ControlFlow::Continue(());
        };
        self.escalator.cancel(&mut record);

        let elapsed = record.elapsed(Instant::now());
        let deliberate = record.deliberate_kill;
        let was_current = self.current == Some(launch);
        if was_current {
            self.current = None;
        }

        if deliberate {
            tracing::info!(pid = %worker, %outcome, elapsed_ms = elapsed.as_millis() as u64, "Worker exited");
        } else {
            tracing::warn!(pid = %worker, %outcome, elapsed_ms = elapsed.as_millis() as u64, "Worker crashed");
        }
        metrics::record_exit(deliberate);
        self.publish(SupervisorNotice::Exited {
            worker,
            outcome,
            deliberate,
            elapsed,
        });

        if self.stopping {
            return if self.records.is_empty() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            };
        }

        if deliberate {
            let killing = matches!(*self.state.borrow(), SupervisorState::Killing { .. });
            if was_current && killing {
                self.set_state(SupervisorState::Idle);
            }
            return ControlFlow::Continue(());
        }

        if elapsed >= self.config.min_crash_duration() {
            self.set_state(SupervisorState::Idle);
            self.publish(SupervisorNotice::RelaunchScheduled {
                delay: Duration::ZERO,
            });
            self.schedule_launch(Duration::ZERO);
        } else {
            self.fatal(FatalReason::CrashLoop { worker, elapsed });
        }
        ControlFlow::Continue(())
    }

    fn on_escalation_due(&mut self, launch: LaunchId) {
        let Some(record) = self.records.get_mut(&launch) else {
            return;
        };
        let worker = record.id();

        match self.escalator.escalate(record) {
            Ok(true) => {
                tracing::warn!(pid = %worker, "Worker ignored graceful termination, sent SIGKILL");
                metrics::record_escalation();
                self.publish(SupervisorNotice::Escalated { worker });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(pid = %worker, error = %e, "Forceful termination failed");
                self.on_failure(e.to_string());
            }
        }
    }

    /// Kill every registered worker.
    fn sweep(&mut self, escalation_timeout: Option<Duration>) {
        for switch in self.registry.drain() {
            let switch = match escalation_timeout {
                Some(timeout) => switch.with_escalation_timeout(timeout),
                None => switch,
            };
            self.kill(switch);
        }
    }

    /// Invoke one kill switch: mark deliberate, then escalate.
    fn kill(&mut self, switch: KillSwitch) {
        let (launch, worker) = (switch.launch(), switch.worker());
        if !self.records.contains_key(&launch) {
            return;
        }

        if self.current == Some(launch) {
            self.set_state(SupervisorState::Killing { worker });
        }
        self.publish(SupervisorNotice::TerminationRequested { worker });

        let result = match self.records.get_mut(&launch) {
            Some(record) => {
                record.deliberate_kill = true;
                self.escalator.begin(record, switch.escalation_timeout())
            }
            None => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(pid = %worker, error = %e, "Graceful termination failed");
            self.on_failure(e.to_string());
        }
    }

    fn fatal(&mut self, reason: FatalReason) {
        tracing::error!(reason = %reason, "fatal: worker supervision stopped");
        metrics::record_fatal();
        self.set_state(SupervisorState::Stopped(reason.clone()));
        self.publish(SupervisorNotice::Fatal(reason));
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }

    fn publish(&self, notice: SupervisorNotice) {
        let _ = self.notices.send(notice);
    }
}

/// Post every worker message to the loop, then the disconnect.
async fn forward_inbound(
    worker: WorkerId,
    mut inbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
) {
    while let Some(message) = inbound.recv().await {
        if events.send(SupervisorEvent::Message { worker, message }).is_err() {
            return;
        }
    }
    let _ = events.send(SupervisorEvent::Disconnected { worker });
}
