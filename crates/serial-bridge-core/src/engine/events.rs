//! Events produced by the network reactor.
//!
//! Socket callbacks do not touch bridge state directly.  They are turned into
//! [`BridgeEvent`]s, queued, and applied one at a time by
//! [`BridgeLoop::apply`](super::bridge_loop::BridgeLoop::apply), so the
//! registry and the inbound buffer only ever change on the loop's thread.

use std::fmt;

use crate::domain::session::SessionId;
use crate::ports::IncomingConnection;

/// Why a session stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A socket read or write failed.
    Error,
    /// The remote peer closed the connection.
    Disconnect,
    /// The connection was idle for longer than the configured limit.
    Timeout,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FaultKind::Error => "socket error",
            FaultKind::Disconnect => "remote disconnect",
            FaultKind::Timeout => "idle timeout",
        };
        f.write_str(text)
    }
}

/// One unit of work for the bridge loop.
pub enum BridgeEvent {
    /// A connection attempt arrived on the listener.
    Accepted(Box<dyn IncomingConnection>),
    /// A session received bytes from its client.
    DataReceived { session: SessionId, bytes: Vec<u8> },
    /// A session's connection failed, closed or timed out.
    Faulted { session: SessionId, kind: FaultKind },
}

impl fmt::Debug for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::Accepted(incoming) => f
                .debug_tuple("Accepted")
                .field(&incoming.peer_identifier())
                .finish(),
            BridgeEvent::DataReceived { session, bytes } => f
                .debug_struct("DataReceived")
                .field("session", session)
                .field("len", &bytes.len())
                .finish(),
            BridgeEvent::Faulted { session, kind } => f
                .debug_struct("Faulted")
                .field("session", session)
                .field("kind", kind)
                .finish(),
        }
    }
}
