//! Collaborator traits at the edges of the bridge engine.
//!
//! The engine never touches a socket or a UART directly.  Everything it needs
//! from the outside world is expressed here:
//!
//! - [`SerialPeer`] – the raw byte-stream device (bounded reads, writes).
//! - [`IncomingConnection`] – a freshly accepted network connection that has
//!   not been turned into a session yet.
//! - [`SessionLink`] – the owned handle of an accepted session, used for
//!   fire-and-forget outbound writes and forced close.
//! - [`PresenceSink`] – the "any client connected" status output.
//!
//! The `tokio`/`serialport` backed implementations live in the `serial-bridge`
//! binary crate; [`mock`] provides in-memory doubles for tests.

use std::io;

use thiserror::Error;

use crate::domain::session::SessionId;

pub mod mock;

/// Error type for the serial side of a tick.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The serial driver reported an I/O failure.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The serial driver accepted zero bytes of a non-empty write.
    #[error("serial peer accepted no bytes; {remaining} byte(s) still pending")]
    WriteStalled { remaining: usize },
}

/// A raw serial byte stream.
///
/// Implementations must not block in [`read`](SerialPeer::read) when called
/// with at most [`available`](SerialPeer::available) bytes.
pub trait SerialPeer: Send {
    /// Number of bytes that can be read right now without waiting.
    fn available(&mut self) -> io::Result<usize>;

    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes a prefix of `buf`, returning how many bytes were accepted.
    ///
    /// Short writes are allowed; the caller keeps retrying with the rest.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// The owned network handle of a registered session.
///
/// Dropping the link must release the underlying connection.
pub trait SessionLink: Send {
    /// Queues `chunk` for delivery to the client.
    ///
    /// Never blocks and never reports failure to the caller: a broken
    /// connection surfaces later as a `Faulted` event for this session.
    fn write(&mut self, chunk: &[u8]);

    /// Closes the connection immediately, without a graceful handshake.
    fn close(&mut self);
}

/// A network connection that was accepted but not yet admitted.
pub trait IncomingConnection: Send {
    /// `false` when the handle no longer refers to a usable connection
    /// (for example the peer vanished between accept and admission).
    fn is_open(&self) -> bool;

    /// Diagnostic name of the remote peer, derived from its address.
    fn peer_identifier(&self) -> String;

    /// Admits the connection as session `session_id` and wires its event
    /// sources (data received, error, disconnect, timeout) to that id.
    fn attach(self: Box<Self>, session_id: SessionId) -> Box<dyn SessionLink>;

    /// Closes the connection without creating a session.
    fn reject(self: Box<Self>);
}

/// Receives the presence signal once per tick.
#[cfg_attr(test, mockall::automock)]
pub trait PresenceSink: Send {
    fn publish(&mut self, connected: bool);
}
