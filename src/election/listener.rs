//! Rendezvous listener held by the elected master.
//!
//! # Responsibilities
//! - Own the bound rendezvous socket for the lifetime of the lease
//! - Answer every later candidate with the master's identity
//! - Bound concurrent handshakes via semaphore
//! - Forward each candidate identity to the lease holder

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time;

use super::protocol::{read_identity, write_identity};
use super::{ElectionError, Identity};
use crate::lifecycle::ShutdownSignal;

/// Handshakes served concurrently before further accepts wait.
const MAX_PENDING_HANDSHAKES: usize = 16;

/// Pause after a failed accept; errors such as EMFILE repeat immediately.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl ListenerError {
    /// True when another process already owns the endpoint.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, ListenerError::Bind(e) if e.kind() == std::io::ErrorKind::AddrInUse)
    }

    pub fn into_io(self) -> std::io::Error {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => e,
        }
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bound rendezvous endpoint answering later candidates.
pub struct RendezvousListener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Identity sent to every candidate.
    identity: Identity,
    /// Limit on one candidate's identity line.
    reply_timeout: Duration,
    /// Semaphore bounding in-flight handshakes.
    handshake_limit: Arc<Semaphore>,
}

impl RendezvousListener {
    /// Bind the rendezvous address. Fails if another candidate already holds it.
    pub async fn bind(
        addr: SocketAddr,
        identity: Identity,
        reply_timeout: Duration,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            process = %identity,
            address = %local_addr,
            "Rendezvous listener bound"
        );

        Ok(Self {
            inner: listener,
            identity,
            reply_timeout,
            handshake_limit: Arc::new(Semaphore::new(MAX_PENDING_HANDSHAKES)),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept candidates until shutdown, reporting each identity on `followers`.
    pub async fn serve(
        self,
        followers: mpsc::UnboundedSender<Identity>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            let permit = tokio::select! {
                permit = self.handshake_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.triggered() => break,
            };

            let accepted = tokio::select! {
                accepted = self.inner.accept() => accepted.map_err(ListenerError::Accept),
                _ = shutdown.triggered() => break,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(process = %self.identity, error = %e, "Rendezvous accept failed");
                    drop(permit);
                    if pause_after_accept_error(&mut shutdown).await.is_break() {
                        break;
                    }
                    continue;
                }
            };

            let identity = self.identity.clone();
            let reply_timeout = self.reply_timeout;
            let followers = followers.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match answer(stream, &identity, reply_timeout).await {
                    Ok(candidate) => {
                        tracing::info!(
                            process = %identity,
                            candidate = %candidate,
                            "notified by later candidate"
                        );
                        let _ = followers.send(candidate);
                    }
                    Err(e) => {
                        tracing::debug!(
                            process = %identity,
                            peer_addr = %peer,
                            error = %e,
                            "Rendezvous handshake incomplete"
                        );
                    }
                }
            });
        }

        tracing::debug!(process = %self.identity, "Rendezvous listener stopped");
    }
}

/// Wait out [`ACCEPT_ERROR_BACKOFF`] unless shutdown arrives first.
async fn pause_after_accept_error(shutdown: &mut ShutdownSignal) -> ControlFlow<()> {
    tokio::select! {
        _ = time::sleep(ACCEPT_ERROR_BACKOFF) => ControlFlow::Continue(()),
        _ = shutdown.triggered() => ControlFlow::Break(()),
    }
}

/// Read the candidate's identity, then reply with ours whatever it sent.
async fn answer(
    stream: TcpStream,
    identity: &Identity,
    reply_timeout: Duration,
) -> Result<Identity, ElectionError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let candidate = match time::timeout(reply_timeout, read_identity(&mut reader)).await {
        Ok(result) => result,
        Err(_) => Err(ElectionError::ReplyTimeout(reply_timeout)),
    };

    write_identity(&mut write_half, identity)
        .await
        .map_err(ElectionError::Io)?;

    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    #[tokio::test(start_paused = true)]
    async fn accept_error_pauses_before_retrying() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let started = time::Instant::now();
        let flow = pause_after_accept_error(&mut signal).await;

        assert!(flow.is_continue());
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_accept_pause_short() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        shutdown.trigger();

        let started = time::Instant::now();
        let flow = pause_after_accept_error(&mut signal).await;

        assert!(flow.is_break());
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }
}
