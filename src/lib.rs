//! Single-instance process supervisor.
//!
//! The first candidate to bind the rendezvous address becomes master and
//! supervises one worker process; later candidates notify it and exit.

pub mod config;
pub mod election;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod supervisor;

pub use config::schema::MonarchConfig;
pub use election::{ElectionOutcome, Identity, LeaderElector};
pub use lifecycle::{Shutdown, TopLevelGuard};
pub use supervisor::{ProcessSupervisor, SupervisorHandle};
