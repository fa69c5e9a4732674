//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Keep the rendezvous endpoint on loopback
//! - Validate value ranges (budgets and timeouts > 0, delays ordered)
//! - Reject signal names that cannot be ignored
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonarchConfig → Result<(), Vec<ValidationError>>
//! - Runs after CLI overrides are applied, before anything binds or spawns

use std::net::SocketAddr;
use std::str::FromStr;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::config::schema::MonarchConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("app_name must not be empty")]
    EmptyAppName,

    #[error("election.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("election.bind_address {0} is not a loopback address")]
    NotLoopback(SocketAddr),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("supervisor.relaunch_base_delay_ms ({base}) exceeds relaunch_max_delay_ms ({max})")]
    DelayOrder { base: u64, max: u64 },

    #[error("worker.program must be set")]
    MissingProgram,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("guard.ignored_signals: unknown signal {0:?}")]
    UnknownSignal(String),

    #[error("guard.ignored_signals: {0} cannot be caught")]
    UncatchableSignal(String),
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &MonarchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app_name.trim().is_empty() {
        errors.push(ValidationError::EmptyAppName);
    }

    match config.election.bind_address.parse::<SocketAddr>() {
        Ok(addr) if !addr.ip().is_loopback() => errors.push(ValidationError::NotLoopback(addr)),
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::InvalidBindAddress(
            config.election.bind_address.clone(),
        )),
    }

    let positive = [
        ("election.connect_timeout_ms", config.election.connect_timeout_ms),
        ("election.reply_timeout_ms", config.election.reply_timeout_ms),
        ("supervisor.max_bad_launches", u64::from(config.supervisor.max_bad_launches)),
        ("supervisor.escalation_timeout_ms", config.supervisor.escalation_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let sup = &config.supervisor;
    if sup.relaunch_base_delay_ms > sup.relaunch_max_delay_ms {
        errors.push(ValidationError::DelayOrder {
            base: sup.relaunch_base_delay_ms,
            max: sup.relaunch_max_delay_ms,
        });
    }

    if config.worker.program.trim().is_empty() {
        errors.push(ValidationError::MissingProgram);
    }

    for name in &config.guard.ignored_signals {
        match Signal::from_str(name) {
            Ok(Signal::SIGKILL) | Ok(Signal::SIGSTOP) => {
                errors.push(ValidationError::UncatchableSignal(name.clone()))
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::UnknownSignal(name.clone())),
        }
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> MonarchConfig {
        let mut config = MonarchConfig::default();
        config.worker.program = "/bin/true".into();
        config
    }

    #[test]
    fn defaults_with_program_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.election.bind_address = "0.0.0.0:1113".into();
        config.supervisor.max_bad_launches = 0;
        config.supervisor.relaunch_base_delay_ms = 10_000;
        config.worker.program.clear();
        config.guard.ignored_signals = vec!["SIGKILL".into(), "SIGNOPE".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::MissingProgram));
        assert!(errors.contains(&ValidationError::Zero("supervisor.max_bad_launches")));
        assert!(errors.contains(&ValidationError::UnknownSignal("SIGNOPE".into())));
    }

    #[test]
    fn rejects_unparseable_address() {
        let mut config = valid();
        config.election.bind_address = "localhost".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidBindAddress("localhost".into())]);
    }
}
