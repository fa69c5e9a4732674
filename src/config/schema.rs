//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the supervisor.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Root configuration for a master candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonarchConfig {
    /// Application name, the first half of every process identity.
    pub app_name: String,

    /// Rendezvous endpoint and election timeouts.
    pub election: ElectionConfig,

    /// Restart budget, crash-loop threshold and kill escalation.
    pub supervisor: SupervisorConfig,

    /// The program supervised as the worker.
    pub worker: WorkerConfig,

    /// Process-wide signal handling.
    pub guard: GuardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for MonarchConfig {
    fn default() -> Self {
        Self {
            app_name: "monarch".to_string(),
            election: ElectionConfig::default(),
            supervisor: SupervisorConfig::default(),
            worker: WorkerConfig::default(),
            guard: GuardConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Leader election configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Loopback address every candidate binds or connects to.
    pub bind_address: String,

    /// Time allowed for connecting to an existing master, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed for the identity exchange, in milliseconds.
    pub reply_timeout_ms: u64,

    /// Restart the worker whenever a later candidate notifies the master.
    pub restart_worker_on_notify: bool,
}

impl ElectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1113".to_string(),
            connect_timeout_ms: 3_000,
            reply_timeout_ms: 3_000,
            restart_worker_on_notify: true,
        }
    }
}

/// Worker supervision policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Consecutive launch failures tolerated before giving up.
    pub max_bad_launches: u32,

    /// A worker exiting unsolicited sooner than this is a crash loop, in milliseconds.
    pub min_crash_duration_ms: u64,

    /// Grace period between SIGTERM and SIGKILL, in milliseconds.
    pub escalation_timeout_ms: u64,

    /// Base delay for relaunching after a launch failure, in milliseconds.
    pub relaunch_base_delay_ms: u64,

    /// Cap for the relaunch delay, in milliseconds.
    pub relaunch_max_delay_ms: u64,
}

impl SupervisorConfig {
    pub fn min_crash_duration(&self) -> Duration {
        Duration::from_millis(self.min_crash_duration_ms)
    }

    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_millis(self.escalation_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_bad_launches: 10,
            min_crash_duration_ms: 3_000,
            escalation_timeout_ms: 3_000,
            relaunch_base_delay_ms: 250,
            relaunch_max_delay_ms: 5_000,
        }
    }
}

/// Worker program definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable path or name resolved through `PATH`.
    pub program: String,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Working directory (inherited when unset).
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,

    /// Label attached to the worker's stdout/stderr lines in the log.
    pub output_label: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            output_label: "worker".to_string(),
        }
    }
}

/// Top-level guard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Signals that are logged and otherwise ignored.
    pub ignored_signals: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            ignored_signals: vec!["SIGINT".to_string(), "SIGUSR2".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Append-only log file written alongside stdout.
    pub log_file: Option<PathBuf>,

    /// Prometheus exporter bind address; metrics are not exported when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: MonarchConfig = toml::from_str(
            r#"
            [supervisor]
            max_bad_launches = 3

            [worker]
            program = "/usr/bin/env"
            "#,
        )
        .unwrap();

        assert_eq!(config.supervisor.max_bad_launches, 3);
        assert_eq!(config.supervisor.min_crash_duration(), Duration::from_secs(3));
        assert_eq!(config.election.bind_address, "127.0.0.1:1113");
        assert_eq!(config.worker.output_label, "worker");
        assert_eq!(config.guard.ignored_signals, vec!["SIGINT", "SIGUSR2"]);
    }
}
