//! OS signal handling for the master process.
//!
//! - Ignore-list signals are caught and logged, nothing else
//! - SIGTERM and SIGQUIT request an orderly shutdown unless ignored
//!
//! Installing a tokio handler replaces the default disposition, which is
//! what makes an ignored SIGINT harmless.

use std::str::FromStr;

use nix::sys::signal::Signal;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SignalInstallError {
    #[error("unknown signal {0:?}")]
    Unknown(String),

    #[error("cannot handle {signal}: {source}")]
    Register {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve signal names such as `SIGINT`.
pub fn parse_signals(names: &[String]) -> Result<Vec<Signal>, SignalInstallError> {
    names
        .iter()
        .map(|name| Signal::from_str(name).map_err(|_| SignalInstallError::Unknown(name.clone())))
        .collect()
}

/// Catch each signal and log it instead of acting on it.
#[cfg(unix)]
pub fn ignore_signals(signals: &[Signal]) -> Result<Vec<JoinHandle<()>>, SignalInstallError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut handles = Vec::with_capacity(signals.len());
    for &sig in signals {
        let mut stream = signal(SignalKind::from_raw(sig as i32))
            .map_err(|source| SignalInstallError::Register { signal: sig, source })?;

        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                tracing::info!(signal = %sig, "ignoring: {}", sig);
            }
        }));
    }
    Ok(handles)
}

#[cfg(not(unix))]
pub fn ignore_signals(_signals: &[Signal]) -> Result<Vec<JoinHandle<()>>, SignalInstallError> {
    Ok(Vec::new())
}

/// Complete when SIGTERM or SIGQUIT arrives, skipping any that are ignored.
///
/// Never completes if both are on the ignore-list.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal(ignored: &[Signal]) -> std::io::Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = if ignored.contains(&Signal::SIGTERM) {
        None
    } else {
        Some(signal(SignalKind::terminate())?)
    };
    let mut sigquit = if ignored.contains(&Signal::SIGQUIT) {
        None
    } else {
        Some(signal(SignalKind::quit())?)
    };

    tokio::select! {
        Some(_) = recv(&mut sigterm) => Ok(Signal::SIGTERM),
        Some(_) = recv(&mut sigquit) => Ok(Signal::SIGQUIT),
        else => std::future::pending().await,
    }
}

#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => None,
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal(_ignored: &[Signal]) -> std::io::Result<Signal> {
    tokio::signal::ctrl_c().await?;
    Ok(Signal::SIGTERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        let signals = parse_signals(&["SIGINT".into(), "SIGUSR2".into()]).unwrap();
        assert_eq!(signals, vec![Signal::SIGINT, Signal::SIGUSR2]);
    }

    #[test]
    fn rejects_unknown_name() {
        let err = parse_signals(&["SIGNOPE".into()]).unwrap_err();
        assert!(matches!(err, SignalInstallError::Unknown(name) if name == "SIGNOPE"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ignored_signal_does_not_kill_the_process() {
        let handles = ignore_signals(&[Signal::SIGUSR2]).unwrap();
        nix::sys::signal::raise(Signal::SIGUSR2).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handles[0].is_finished());
        for handle in handles {
            handle.abort();
        }
    }
}
