//! Leader election subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate starts
//!     → elector.rs binds the rendezvous address
//!         ├─ bound        → Master (listener.rs keeps answering later candidates)
//!         ├─ AddrInUse    → connect, send identity, read master identity → FollowerNotified
//!         └─ other errors → CommunicationFailure
//!
//! Wire (protocol.rs), one line each way:
//!     candidate → master:  "<app>:<pid>\n"
//!     master → candidate:  "<app>:<pid>\n"
//! ```
//!
//! # Design Decisions
//! - The OS bind call is the only arbiter; two racing binders cannot both win
//! - Loopback only, no authentication
//! - No retries, no heartbeat: one exchange then close

pub mod elector;
pub mod identity;
pub mod listener;
pub mod protocol;

use std::time::Duration;

use thiserror::Error;

pub use elector::{elect, ElectionOutcome, LeaderElector, MasterLease};
pub use identity::{Identity, IdentityParseError};

/// Errors that end an election without a verdict.
#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("rendezvous address {0:?} is invalid")]
    InvalidAddress(String),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("connect to master failed: {0}")]
    Connect(std::io::Error),

    #[error("connect to master timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    #[error("peer closed without replying")]
    NoReply,

    #[error("reply exceeds {} bytes", protocol::MAX_LINE)]
    Oversized,

    #[error(transparent)]
    Malformed(#[from] IdentityParseError),

    #[error("rendezvous I/O error: {0}")]
    Io(std::io::Error),
}
