//! Worker supervision subsystem.
//!
//! # Data Flow
//! ```text
//! core.rs (control loop, one task)
//!     Launch      → registry sweep → spawner.rs → record.rs + registry.rs
//!                                             ├─ exit watcher ─────► Exited
//!                                             ├─ channel.rs reader ► Message / Disconnected
//!                                             └─ output.rs (stdout/stderr → log)
//!     Exited      → deliberate? stay down : crash-loop check → relaunch or Stopped
//!     Kill        → escalator.rs → signaller.rs (SIGTERM, later SIGKILL)
//!     Messages    → relay.rs
//!     Spawn error → budget.rs → backoff relaunch or Stopped
//! ```
//!
//! # Design Decisions
//! - One worker slot; at most one registered worker at any time
//! - All state is owned by the control loop, no locks
//! - Spawning and signalling sit behind traits so tests drive fake processes

pub mod budget;
pub mod channel;
pub mod core;
pub mod escalator;
pub mod output;
pub mod record;
pub mod registry;
pub mod relay;
pub mod signaller;
pub mod spawner;
pub mod state;

pub use budget::SupervisorBudget;
pub use channel::{ChannelClosed, Message, MessageSender, WorkerChannel, WorkerEnd};
pub use self::core::{
    ProcessSupervisor, SupervisorCommand, SupervisorEvent, SupervisorGone, SupervisorHandle,
};
pub use escalator::TerminationEscalator;
pub use record::WorkerRecord;
pub use registry::{KillRegistry, KillSwitch, LaunchId, WorkerId};
pub use relay::{LoggingRelay, MessageRelay};
pub use signaller::{NixSignaller, SignalError, Signaller, Termination};
pub use spawner::{
    CommandSpawner, ExitOutcome, LaunchError, SpawnedWorker, Spawner, WorkerSpec, CHANNEL_FD,
    CHANNEL_FD_ENV,
};
pub use state::{FatalReason, SupervisorNotice, SupervisorState};
