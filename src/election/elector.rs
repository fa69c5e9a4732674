//! Leader election by rendezvous on a fixed loopback endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;

use super::listener::RendezvousListener;
use super::protocol::{read_identity, write_identity};
use super::{ElectionError, Identity};
use crate::config::ElectionConfig;
use crate::lifecycle::Shutdown;

/// Result of one election, produced once per process.
#[derive(Debug)]
pub enum ElectionOutcome {
    /// This process holds the endpoint and must run the supervisor.
    Master(MasterLease),
    /// Another master exists and has been told about us.
    FollowerNotified(Identity),
    /// Neither binding nor notifying worked; nothing may be supervised.
    CommunicationFailure(ElectionError),
}

impl ElectionOutcome {
    pub fn is_master(&self) -> bool {
        matches!(self, ElectionOutcome::Master(_))
    }
}

/// Mastership held for as long as this value lives.
///
/// The rendezvous listener keeps answering later candidates in the
/// background. Dropping the lease stops it and frees the endpoint.
#[derive(Debug)]
pub struct MasterLease {
    local_addr: SocketAddr,
    followers: mpsc::UnboundedReceiver<Identity>,
    shutdown: Shutdown,
}

impl MasterLease {
    /// Address the rendezvous listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next candidate that contacted this master.
    pub async fn next_follower(&mut self) -> Option<Identity> {
        self.followers.recv().await
    }
}

impl Drop for MasterLease {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Runs the bind-or-connect election for one candidate.
pub struct LeaderElector {
    identity: Identity,
    connect_timeout: Duration,
    reply_timeout: Duration,
    bind_address: String,
}

impl LeaderElector {
    pub fn new(config: &ElectionConfig, identity: Identity) -> Self {
        Self {
            identity,
            connect_timeout: config.connect_timeout(),
            reply_timeout: config.reply_timeout(),
            bind_address: config.bind_address.clone(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Decide whether this process is the master.
    ///
    /// Never retried: a failure here cannot be told apart from an unrelated
    /// program owning the port.
    pub async fn elect(&self) -> ElectionOutcome {
        let addr: SocketAddr = match self.bind_address.parse() {
            Ok(addr) => addr,
            Err(_) => {
                return ElectionOutcome::CommunicationFailure(ElectionError::InvalidAddress(
                    self.bind_address.clone(),
                ))
            }
        };

        match RendezvousListener::bind(addr, self.identity.clone(), self.reply_timeout).await {
            Ok(listener) => self.hold(listener, addr),
            Err(e) if e.is_addr_in_use() => {
                tracing::debug!(process = %self.identity, address = %addr, "Endpoint taken, notifying master");
                match self.notify_master(addr).await {
                    Ok(leader) => ElectionOutcome::FollowerNotified(leader),
                    Err(e) => ElectionOutcome::CommunicationFailure(e),
                }
            }
            Err(e) => ElectionOutcome::CommunicationFailure(ElectionError::Bind(e.into_io())),
        }
    }

    fn hold(&self, listener: RendezvousListener, addr: SocketAddr) -> ElectionOutcome {
        let local_addr = listener.local_addr().unwrap_or(addr);
        let shutdown = Shutdown::new();
        let (followers_tx, followers) = mpsc::unbounded_channel();
        tokio::spawn(listener.serve(followers_tx, shutdown.subscribe()));

        ElectionOutcome::Master(MasterLease {
            local_addr,
            followers,
            shutdown,
        })
    }

    /// Tell the current master we exist and learn who it is.
    async fn notify_master(&self, addr: SocketAddr) -> Result<Identity, ElectionError> {
        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ElectionError::Connect(e)),
            Err(_) => return Err(ElectionError::ConnectTimeout(self.connect_timeout)),
        };

        let (read_half, mut write_half) = stream.into_split();
        write_identity(&mut write_half, &self.identity)
            .await
            .map_err(ElectionError::Io)?;

        let mut reader = BufReader::new(read_half);
        match time::timeout(self.reply_timeout, read_identity(&mut reader)).await {
            Ok(reply) => reply,
            Err(_) => Err(ElectionError::ReplyTimeout(self.reply_timeout)),
        }
    }
}

/// Run one election with the given configuration.
pub async fn elect(config: &ElectionConfig, identity: Identity) -> ElectionOutcome {
    LeaderElector::new(config, identity).elect().await
}
