//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor, elector, guard:
//!     → tracing events (logging.rs: stdout + optional file)
//!     → counters and gauges (metrics.rs: optional Prometheus endpoint)
//!
//! Worker stdout/stderr:
//!     → re-emitted as tracing events under target `monarch::worker`
//! ```

pub mod logging;
pub mod metrics;
