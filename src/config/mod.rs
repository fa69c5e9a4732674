//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (lifecycle::startup)
//!     → validation.rs (semantic checks)
//!     → MonarchConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ElectionConfig;
pub use schema::GuardConfig;
pub use schema::MonarchConfig;
pub use schema::ObservabilityConfig;
pub use schema::SupervisorConfig;
pub use schema::WorkerConfig;
