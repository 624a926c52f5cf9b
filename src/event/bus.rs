use std::sync::Arc;

use tokio::sync::broadcast;

use super::ChangeEvent;

/// In-memory fan-out point between event producers (executor, watcher) and
/// the notification channel.
///
/// Cloning is cheap; every clone publishes into the same channel. There is no
/// replay: a receiver only sees events published after it subscribed.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<ChangeEvent>>,
}

impl EventBus {
    /// `capacity` bounds how far a slow receiver may lag before it starts losing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish without blocking. Returns how many receivers the event reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::debug!(
            kind = event.kind().verb(),
            path = event.path(),
            dir = event.target().is_dir(),
            "publish"
        );
        // Err only means nobody is listening right now.
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
