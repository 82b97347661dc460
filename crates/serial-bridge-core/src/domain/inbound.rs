//! InboundBuffer: client bytes waiting to be written to the serial peer.
//!
//! All sessions append to the same buffer, so bytes from one client keep
//! their receive order and bytes from different clients are ordered by when
//! their append happened.  The bridge loop is the single consumer.

use std::io;

use crate::ports::{SerialError, SerialPeer};

/// Initial capacity of the buffer; it grows on demand.
const INITIAL_CAPACITY: usize = 128;

/// Shared, append-only queue of bytes bound for the serial peer.
#[derive(Debug)]
pub struct InboundBuffer {
    bytes: Vec<u8>,
}

impl Default for InboundBuffer {
    fn default() -> Self {
        Self {
            bytes: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }
}

impl InboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `payload` at the end.  Empty payloads are ignored.
    pub fn append(&mut self, payload: &[u8]) {
        self.bytes.extend_from_slice(payload);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes the current contents to `serial` and removes what was written.
    ///
    /// The length is snapshotted first; short writes are retried until the
    /// whole snapshot is accepted.  On failure only the prefix that the peer
    /// did accept is removed, so nothing is lost or duplicated and the rest
    /// is retried on the next drain.
    ///
    /// Returns the number of bytes written.
    pub fn drain_to<S>(&mut self, serial: &mut S) -> Result<usize, SerialError>
    where
        S: SerialPeer + ?Sized,
    {
        let snapshot = self.bytes.len();
        let mut written = 0;

        let outcome = loop {
            if written == snapshot {
                break Ok(written);
            }
            match serial.write(&self.bytes[written..snapshot]) {
                Ok(0) => {
                    break Err(SerialError::WriteStalled {
                        remaining: snapshot - written,
                    })
                }
                Ok(n) => written += n.min(snapshot - written),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(SerialError::Io(e)),
            }
        };

        self.bytes.drain(..written);
        outcome
    }
}
