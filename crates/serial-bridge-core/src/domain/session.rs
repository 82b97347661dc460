//! Session: one admitted network client.
//!
//! # Liveness (state machine)
//!
//! ```text
//! Connected ──[error | disconnect | timeout]──► Disconnected (terminal)
//! ```
//!
//! A session is always created `Connected`.  Once it is `Disconnected` it
//! stays that way; the registry removes it on the next cleanup pass, which
//! drops the session and with it the owned [`SessionLink`].

use std::fmt;

use uuid::Uuid;

use crate::ports::SessionLink;

/// Routing key for events that belong to a session.
pub type SessionId = Uuid;

/// Whether a session's connection is still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connected,
    Disconnected,
}

/// An admitted client connection.
pub struct Session {
    id: SessionId,
    identifier: String,
    liveness: Liveness,
    link: Box<dyn SessionLink>,
}

impl Session {
    /// Creates a `Connected` session that exclusively owns `link`.
    pub fn new(id: SessionId, identifier: impl Into<String>, link: Box<dyn SessionLink>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            liveness: Liveness::Connected,
            link,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Diagnostic name of the peer (derived from its network address).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn is_connected(&self) -> bool {
        self.liveness == Liveness::Connected
    }

    /// Moves the session to `Disconnected`.
    ///
    /// Returns `true` only for the call that performed the transition; any
    /// later call is a no-op returning `false`.
    pub fn mark_disconnected(&mut self) -> bool {
        let transitioned = self.liveness == Liveness::Connected;
        self.liveness = Liveness::Disconnected;
        transitioned
    }

    /// Hands `chunk` to the link without waiting for delivery.
    pub fn send(&mut self, chunk: &[u8]) {
        self.link.write(chunk);
    }

    /// Force-closes the link.  The link itself is released on drop.
    pub fn force_close(&mut self) {
        self.link.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("liveness", &self.liveness)
            .finish_non_exhaustive()
    }
}
