//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Parse CLI → Load config → Validate → Logging → Guard → Elect
//!         Master   → supervise until SIGTERM/SIGQUIT
//!         Follower → exit 0
//!         Failure  → exit 1
//!
//! Guard (guard.rs):
//!     Panic hook + ignore-list signal handlers, for the whole process
//!
//! Signals (signals.rs):
//!     Ignore-list → "ignoring: <signal>"
//!     SIGTERM/SIGQUIT → orderly shutdown
//!
//! Shutdown (shutdown.rs):
//!     Lease dropped → rendezvous listener stops
//! ```

pub mod guard;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use guard::TopLevelGuard;
pub use shutdown::{Shutdown, ShutdownSignal};
