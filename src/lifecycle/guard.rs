//! Process-wide safety net installed once by the master.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;

use nix::sys::signal::Signal;
use tokio::task::JoinHandle;

use super::signals::{ignore_signals, parse_signals, SignalInstallError};
use crate::config::GuardConfig;

/// Logs panics and swallows the configured signals for as long as it lives.
///
/// A panic inside a tokio task is reported here and contained by the
/// runtime, so the master keeps supervising.
#[derive(Debug)]
pub struct TopLevelGuard {
    ignored: Vec<Signal>,
    handlers: Vec<JoinHandle<()>>,
}

impl TopLevelGuard {
    pub fn install(config: &GuardConfig) -> Result<Self, SignalInstallError> {
        let ignored = parse_signals(&config.ignored_signals)?;
        let handlers = ignore_signals(&ignored)?;

        std::panic::set_hook(Box::new(log_panic));

        tracing::debug!(ignored = ?ignored, "Top-level guard installed");
        Ok(Self { ignored, handlers })
    }

    /// Signals currently being swallowed.
    pub fn ignored(&self) -> &[Signal] {
        &self.ignored
    }
}

impl Drop for TopLevelGuard {
    fn drop(&mut self) {
        for handler in &self.handlers {
            handler.abort();
        }
    }
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let payload = panic_message(info);
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_string());
    let backtrace = Backtrace::capture();

    tracing::error!(
        panic = %payload,
        location = %location,
        "uncaught panic\n{}",
        backtrace
    );
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_panic_is_contained() {
        let guard = TopLevelGuard::install(&GuardConfig {
            ignored_signals: vec!["SIGUSR2".into()],
        })
        .unwrap();
        assert_eq!(guard.ignored(), &[Signal::SIGUSR2]);

        let result = tokio::spawn(async { panic!("boom") }).await;
        assert!(result.unwrap_err().is_panic());

        let _ = std::panic::take_hook();
    }
}
