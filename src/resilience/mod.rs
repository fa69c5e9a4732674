//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Launch failure in the supervisor:
//!     → budget decremented (supervisor::budget)
//!     → backoff.rs (delay before the next attempt)
//!     → relaunch event posted after the delay
//! ```
//!
//! # Design Decisions
//! - Transient crashes relaunch immediately; only failed launches back off
//! - Jittered backoff prevents thundering herd

pub mod backoff;
