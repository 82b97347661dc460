//! ConnectionAcceptor: decides whether a connection attempt becomes a session.
//!
//! With `allow_multi_client = false` only one client may be registered at a
//! time.  A registered session counts until cleanup removes it, even if it
//! has already faulted, so a replacement client is admitted only after the
//! tick that reclaims the old one.

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::registry::SessionRegistry;
use crate::domain::session::{Session, SessionId};
use crate::ports::IncomingConnection;

/// Result of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// A session was created and appended to the registry.
    Registered(SessionId),
    /// The single-client policy refused the attempt; the connection is closed.
    Rejected,
    /// The handle was unusable; nothing happened.
    Ignored,
}

/// Admission policy for new connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAcceptor {
    allow_multi_client: bool,
}

impl ConnectionAcceptor {
    pub fn new(allow_multi_client: bool) -> Self {
        Self { allow_multi_client }
    }

    /// Admits or rejects `incoming`.
    pub fn accept(
        &self,
        registry: &mut SessionRegistry,
        incoming: Box<dyn IncomingConnection>,
    ) -> AcceptOutcome {
        if !incoming.is_open() {
            debug!("ignoring unusable incoming connection handle");
            return AcceptOutcome::Ignored;
        }

        let identifier = incoming.peer_identifier();

        if !self.allow_multi_client && !registry.is_empty() {
            info!("not accepting new connection from {identifier}, only one client allowed");
            incoming.reject();
            return AcceptOutcome::Rejected;
        }

        let id = Uuid::new_v4();
        let link = incoming.attach(id);
        info!(session = %id, "new client connected from {identifier}");
        registry.register(Session::new(id, identifier, link));
        AcceptOutcome::Registered(id)
    }
}
