//! Presence output on a `tokio::sync::watch` channel.
//!
//! The bridge loop publishes the "any client connected" flag every tick.
//! Subscribers see the latest value; a log line is written only when the
//! value actually changes.

use tokio::sync::watch;
use tracing::info;

use serial_bridge_core::PresenceSink;

/// [`PresenceSink`] backed by a watch channel.
#[derive(Debug)]
pub struct WatchPresence {
    tx: watch::Sender<bool>,
    last: Option<bool>,
}

impl WatchPresence {
    /// Creates the sink and a first receiver.  The initial value is `false`.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx, last: None }, rx)
    }

    /// Another receiver for the same signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl PresenceSink for WatchPresence {
    fn publish(&mut self, connected: bool) {
        // send_replace works with zero receivers and marks the value as seen
        // again, so every tick is a publication.
        self.tx.send_replace(connected);
        if self.last != Some(connected) {
            info!(
                "client presence: {}",
                if connected { "connected" } else { "none" }
            );
            self.last = Some(connected);
        }
    }
}
