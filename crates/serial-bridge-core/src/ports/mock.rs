//! In-memory collaborators for unit and integration testing.
//!
//! Every mock keeps its state behind an `Arc<Mutex<..>>` so a test can hand
//! the mock (or a [`LinkTap`]) to the engine and still inspect what
//! happened afterwards.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use super::{IncomingConnection, PresenceSink, SerialPeer, SessionLink};
use crate::domain::session::SessionId;

// ── Serial peer ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SerialState {
    input: VecDeque<u8>,
    written: Vec<u8>,
    read_sizes: Vec<usize>,
    write_calls: usize,
    max_write: Option<usize>,
    write_error: Option<io::ErrorKind>,
    read_error: Option<io::ErrorKind>,
    available_error: Option<io::ErrorKind>,
}

/// A scripted serial device.
///
/// Bytes passed to [`push_input`](Self::push_input) become readable; every
/// byte the engine writes is recorded.  Clones share the same device.
#[derive(Debug, Clone, Default)]
pub struct MockSerialPeer {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerialPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `bytes` available for reading, after anything already pending.
    pub fn push_input(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes.iter().copied());
    }

    /// Bytes that have been pushed but not read yet.
    pub fn pending_input(&self) -> usize {
        self.lock().input.len()
    }

    /// Everything written to the device so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Returns everything written so far and forgets it.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().written)
    }

    /// Length of every `read` call the engine made.
    pub fn read_sizes(&self) -> Vec<usize> {
        self.lock().read_sizes.clone()
    }

    /// Number of `write` calls the engine made.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Caps how many bytes a single `write` call accepts.
    pub fn limit_writes_to(&self, max: usize) {
        self.lock().max_write = Some(max);
    }

    /// Makes every subsequent `write` fail with `kind`.
    pub fn fail_writes_with(&self, kind: io::ErrorKind) {
        self.lock().write_error = Some(kind);
    }

    /// Makes every subsequent `read` fail with `kind`.
    pub fn fail_reads_with(&self, kind: io::ErrorKind) {
        self.lock().read_error = Some(kind);
    }

    /// Makes every subsequent `available` check fail with `kind`.
    pub fn fail_available_with(&self, kind: io::ErrorKind) {
        self.lock().available_error = Some(kind);
    }

    /// Restores normal behaviour (no write cap, no injected failures).
    pub fn heal(&self) {
        let mut state = self.lock();
        state.max_write = None;
        state.write_error = None;
        state.read_error = None;
        state.available_error = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SerialState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl SerialPeer for MockSerialPeer {
    fn available(&mut self) -> io::Result<usize> {
        let state = self.lock();
        match state.available_error {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(state.input.len()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if let Some(kind) = state.read_error {
            return Err(io::Error::from(kind));
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        state.read_sizes.push(n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.write_calls += 1;
        if let Some(kind) = state.write_error {
            return Err(io::Error::from(kind));
        }
        let n = buf.len().min(state.max_write.unwrap_or(usize::MAX));
        state.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

// ── Network connections ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LinkRecord {
    chunks: Vec<Vec<u8>>,
    close_count: usize,
    released: bool,
    rejected: bool,
    attached: Option<SessionId>,
}

/// Read-only view of what happened to a [`MockIncoming`] and its link.
#[derive(Debug, Clone)]
pub struct LinkTap {
    record: Arc<Mutex<LinkRecord>>,
}

impl LinkTap {
    /// Every chunk written to the link, one entry per `write` call.
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.lock().chunks.clone()
    }

    /// All bytes written to the link, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.lock().chunks.concat()
    }

    /// Returns all bytes written so far and forgets them.
    pub fn take_received(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().chunks).concat()
    }

    /// How many times `close` was called on the link.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// `true` once the link was dropped or the connection rejected.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn is_rejected(&self) -> bool {
        self.lock().rejected
    }

    /// The session id the connection was admitted as, if any.
    pub fn attached_session(&self) -> Option<SessionId> {
        self.lock().attached
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkRecord> {
        self.record.lock().expect("lock poisoned")
    }
}

/// A pending connection from a fake peer.
pub struct MockIncoming {
    identifier: String,
    open: bool,
    record: Arc<Mutex<LinkRecord>>,
}

impl MockIncoming {
    /// Creates a usable connection from `identifier` and its tap.
    pub fn new(identifier: &str) -> (Self, LinkTap) {
        Self::build(identifier, true)
    }

    /// Creates a connection whose handle is already unusable.
    pub fn invalid(identifier: &str) -> (Self, LinkTap) {
        Self::build(identifier, false)
    }

    fn build(identifier: &str, open: bool) -> (Self, LinkTap) {
        let record = Arc::new(Mutex::new(LinkRecord::default()));
        let tap = LinkTap {
            record: Arc::clone(&record),
        };
        let incoming = Self {
            identifier: identifier.to_string(),
            open,
            record,
        };
        (incoming, tap)
    }
}

impl IncomingConnection for MockIncoming {
    fn is_open(&self) -> bool {
        self.open
    }

    fn peer_identifier(&self) -> String {
        self.identifier.clone()
    }

    fn attach(self: Box<Self>, session_id: SessionId) -> Box<dyn SessionLink> {
        self.record.lock().expect("lock poisoned").attached = Some(session_id);
        Box::new(MockLink {
            record: Arc::clone(&self.record),
        })
    }

    fn reject(self: Box<Self>) {
        let mut record = self.record.lock().expect("lock poisoned");
        record.rejected = true;
        record.released = true;
    }
}

/// The [`SessionLink`] handed out by [`MockIncoming::attach`].
pub struct MockLink {
    record: Arc<Mutex<LinkRecord>>,
}

impl SessionLink for MockLink {
    fn write(&mut self, chunk: &[u8]) {
        self.record
            .lock()
            .expect("lock poisoned")
            .chunks
            .push(chunk.to_vec());
    }

    fn close(&mut self) {
        self.record.lock().expect("lock poisoned").close_count += 1;
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        if let Ok(mut record) = self.record.lock() {
            record.released = true;
        }
    }
}

// ── Presence ──────────────────────────────────────────────────────────────────

/// Records every published presence value.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresence {
    published: Arc<Mutex<Vec<bool>>>,
}

impl RecordingPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<bool> {
        self.published.lock().expect("lock poisoned").clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.history().last().copied()
    }
}

impl PresenceSink for RecordingPresence {
    fn publish(&mut self, connected: bool) {
        self.published.lock().expect("lock poisoned").push(connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_mock_serial_reads_pushed_input_in_order() {
        let mut serial = MockSerialPeer::new();
        serial.push_input(b"abc");
        serial.push_input(b"de");

        let mut buf = [0u8; 4];
        let n = serial.read(&mut buf).unwrap();

        assert_eq!(&buf[..n], b"abcd");
        assert_eq!(serial.available().unwrap(), 1);
        assert_eq!(serial.read_sizes(), vec![4]);
    }

    #[test]
    fn test_mock_serial_write_limit_produces_short_writes() {
        let mut serial = MockSerialPeer::new();
        serial.limit_writes_to(2);

        let n = serial.write(b"hello").unwrap();

        assert_eq!(n, 2);
        assert_eq!(serial.written(), b"he");
    }

    #[test]
    fn test_mock_serial_write_failure_and_heal() {
        let mut serial = MockSerialPeer::new();
        serial.fail_writes_with(io::ErrorKind::BrokenPipe);
        assert!(serial.write(b"x").is_err());

        serial.heal();
        assert_eq!(serial.write(b"x").unwrap(), 1);
        assert_eq!(serial.write_calls(), 2);
    }

    #[test]
    fn test_mock_serial_read_failures_leave_input_pending() {
        let mut serial = MockSerialPeer::new();
        serial.push_input(b"abc");
        serial.fail_reads_with(io::ErrorKind::BrokenPipe);
        serial.fail_available_with(io::ErrorKind::NotConnected);

        let mut buf = [0u8; 3];
        assert!(serial.available().is_err());
        assert!(serial.read(&mut buf).is_err());
        assert_eq!(serial.pending_input(), 3);

        serial.heal();
        assert_eq!(serial.available().unwrap(), 3);
    }

    #[test]
    fn test_mock_link_records_writes_close_and_release() {
        let (incoming, tap) = MockIncoming::new("10.0.0.7");
        let id = Uuid::new_v4();

        let mut link = Box::new(incoming).attach(id);
        link.write(b"one");
        link.write(b"two");
        link.close();
        drop(link);

        assert_eq!(tap.attached_session(), Some(id));
        assert_eq!(tap.chunks(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(tap.close_count(), 1);
        assert!(tap.is_released());
    }

    #[test]
    fn test_mock_incoming_reject_marks_released() {
        let (incoming, tap) = MockIncoming::new("10.0.0.8");
        Box::new(incoming).reject();
        assert!(tap.is_rejected());
        assert!(tap.is_released());
        assert_eq!(tap.attached_session(), None);
    }

    #[test]
    fn test_recording_presence_keeps_history() {
        let mut presence = RecordingPresence::new();
        presence.publish(false);
        presence.publish(true);
        assert_eq!(presence.history(), vec![false, true]);
        assert_eq!(presence.last(), Some(true));
    }
}
