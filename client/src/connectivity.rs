//! Online/offline signal.
//!
//! The client never detects network reachability itself: the embedding
//! application owns that and flips this switch. Everything in the sync
//! engine reads the current value before touching the remote, and the
//! reconnect task watches for the offline→online edge.

use tokio::sync::watch;

/// Shared connectivity flag.
#[derive(Debug)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    /// Create a new signal with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Report the current state, as last set by the embedder.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip the state. Called by the embedding application.
    pub fn set_online(&self, online: bool) {
        if self.tx.send_replace(online) != online {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_sees_transitions() {
        let conn = Connectivity::new(false);
        let mut rx = conn.watch();
        assert!(!conn.is_online());

        conn.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(conn.is_online());
    }
}
