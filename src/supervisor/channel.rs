//! Out-of-band message channel between the master and its worker.
//!
//! # Responsibilities
//! - Carry opaque JSON messages in both directions
//! - Let the supervisor close the master → worker direction on kill
//! - Bridge a Unix socket (worker fd 3) onto in-process queues
//!
//! # Design Decisions
//! - Newline-delimited JSON on the socket; malformed lines are dropped
//! - Closing shuts down the write half only; the worker sees EOF

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Application message relayed between master and worker.
pub type Message = serde_json::Value;

/// The worker's message channel has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker message channel is closed")]
pub struct ChannelClosed;

/// Cloneable sender for messages addressed to the worker.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageSender {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub fn send(&self, message: Message) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Master side of a worker's message channel.
#[derive(Debug)]
pub struct WorkerChannel {
    /// Messages to the worker.
    pub outbound: mpsc::UnboundedSender<Message>,
    /// Messages from the worker; ends when the worker disconnects.
    pub inbound: mpsc::UnboundedReceiver<Message>,
    /// Dropping or firing this closes the channel towards the worker.
    pub close: oneshot::Sender<()>,
}

/// Worker side of an in-process channel.
#[derive(Debug)]
pub struct WorkerEnd {
    /// Messages sent by the master.
    pub from_master: mpsc::UnboundedReceiver<Message>,
    /// Messages for the master. Dropping it disconnects the worker.
    pub to_master: mpsc::UnboundedSender<Message>,
    /// Resolves once the master closed the channel.
    pub closed: oneshot::Receiver<()>,
}

impl WorkerChannel {
    /// Channel backed by in-process queues, for embedding and tests.
    pub fn in_memory() -> (WorkerChannel, WorkerEnd) {
        let (outbound, from_master) = mpsc::unbounded_channel();
        let (to_master, inbound) = mpsc::unbounded_channel();
        let (close, closed) = oneshot::channel();
        (
            WorkerChannel {
                outbound,
                inbound,
                close,
            },
            WorkerEnd {
                from_master,
                to_master,
                closed,
            },
        )
    }

    /// Bridge the master end of a socket pair onto a [`WorkerChannel`].
    #[cfg(unix)]
    pub fn bridge(stream: std::os::unix::net::UnixStream) -> std::io::Result<WorkerChannel> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        stream.set_nonblocking(true)?;
        let stream = tokio::net::UnixStream::from_std(stream)?;
        let (read_half, mut write_half) = stream.into_split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (close, mut close_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let mut line = match serde_json::to_vec(&message) {
                            Ok(line) => line,
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping unserializable message");
                                continue;
                            }
                        };
                        line.push(b'\n');
                        if write_half.write_all(&line).await.is_err() {
                            break;
                        }
                    }
                    _ = &mut close_rx => break,
                }
            }
            let _ = write_half.shutdown().await;
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Message>(&line) {
                    Ok(message) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed worker message"),
                }
            }
        });

        Ok(WorkerChannel {
            outbound,
            inbound,
            close,
        })
    }
}
