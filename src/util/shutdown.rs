//! Graceful shutdown handling.

use tokio::sync::broadcast;

/// Broadcasts a shutdown notification to every subscribed task.
///
/// Clones share the same underlying channel, so any clone can signal
/// and all receivers observe it.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Notify all subscribers. Signalling with no subscribers is a no-op.
    pub fn signal(&self) {
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
