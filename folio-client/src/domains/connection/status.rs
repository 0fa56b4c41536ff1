use std::sync::Arc;

use tokio::sync::watch;

/// Connectivity as observed by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub is_open: bool,
    /// Reason the most recent connection ended, cleared on open.
    pub last_error: Option<String>,
    /// Connection attempts made so far, including the first.
    pub attempts: u64,
}

/// Process-wide "connected" signal for UI indicators.
///
/// Cloning is cheap and every clone observes the same state. Only the
/// connection manager writes to it.
#[derive(Debug, Clone)]
pub struct ConnectivityStatus {
    sender: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectivityStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityStatus {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ConnectionState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.sender.borrow().clone()
    }

    /// Check the flag without cloning the state
    pub fn is_connected(&self) -> bool {
        self.sender.borrow().is_open
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.subscribe()
    }

    /// Wait until the flag equals `connected`.
    pub async fn wait_for(&self, connected: bool) {
        let mut receiver = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|state| state.is_open == connected).await;
    }

    pub(crate) fn begin_attempt(&self) -> u64 {
        let mut attempt = 0;
        self.sender.send_modify(|state| {
            state.attempts += 1;
            attempt = state.attempts;
        });
        attempt
    }

    pub(crate) fn mark_open(&self) {
        self.sender.send_if_modified(|state| {
            let changed = !state.is_open || state.last_error.is_some();
            state.is_open = true;
            state.last_error = None;
            changed
        });
    }

    pub(crate) fn mark_closed(&self, error: Option<String>) {
        self.sender.send_modify(|state| {
            state.is_open = false;
            if error.is_some() {
                state.last_error = error;
            }
        });
    }
}
