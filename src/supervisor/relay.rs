//! Message relay seam between the supervisor and the application.

use std::sync::Mutex;

use super::channel::{ChannelClosed, Message, MessageSender};
use super::registry::WorkerId;

/// Receives the worker's message channel lifecycle.
///
/// Called from the supervisor's control loop, so implementations must not block.
pub trait MessageRelay: Send + Sync {
    /// A worker was spawned; `sender` reaches it until it is killed or exits.
    fn connect(&self, worker: WorkerId, sender: MessageSender);

    /// The worker sent a message.
    fn on_message(&self, worker: WorkerId, message: Message);

    /// The worker closed its end of the channel.
    fn disconnect(&self, worker: WorkerId);
}

/// Relay that logs worker messages and keeps the latest sender.
#[derive(Debug, Default)]
pub struct LoggingRelay {
    current: Mutex<Option<(WorkerId, MessageSender)>>,
}

impl LoggingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a message to the most recently connected worker.
    pub fn send(&self, message: Message) -> Result<(), ChannelClosed> {
        let current = self.current.lock().map_err(|_| ChannelClosed)?;
        match current.as_ref() {
            Some((_, sender)) => sender.send(message),
            None => Err(ChannelClosed),
        }
    }
}

impl MessageRelay for LoggingRelay {
    fn connect(&self, worker: WorkerId, sender: MessageSender) {
        tracing::debug!(pid = %worker, "Worker channel connected");
        if let Ok(mut current) = self.current.lock() {
            *current = Some((worker, sender));
        }
    }

    fn on_message(&self, worker: WorkerId, message: Message) {
        tracing::info!(pid = %worker, %message, "Worker message");
    }

    fn disconnect(&self, worker: WorkerId) {
        tracing::debug!(pid = %worker, "Worker channel disconnected");
        if let Ok(mut current) = self.current.lock() {
            if matches!(current.as_ref(), Some((id, _)) if *id == worker) {
                *current = None;
            }
        }
    }
}
