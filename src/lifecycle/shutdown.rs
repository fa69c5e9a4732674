//! Latched stop flag for tasks that live as long as a master lease.

use tokio::sync::watch;

/// Stop flag that stays raised once set.
///
/// Late subscribers observe an earlier trigger, and repeated triggers
/// collapse into one.
#[derive(Debug)]
pub struct Shutdown {
    flag: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            flag: self.flag.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.flag.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once the flag is raised or its owner is dropped.
    pub async fn triggered(&mut self) {
        let _ = self.flag.wait_for(|raised| *raised).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn repeated_trigger_wakes_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), a.triggered())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.triggered())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn subscriber_after_trigger_still_stops() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut late = shutdown.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_owner_releases_subscribers() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn untriggered_signal_stays_pending() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let waited = tokio::time::timeout(Duration::from_millis(50), signal.triggered()).await;
        assert!(waited.is_err());
    }
}
