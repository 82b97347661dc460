//! BridgeLoop: the tick-driven core of the bridge.
//!
//! The loop owns every piece of mutable state (registry, inbound buffer,
//! serial peer).  Two entry points change it:
//!
//! - [`BridgeLoop::apply`] consumes one reactor event (new connection, data
//!   received, fault).
//! - [`BridgeLoop::tick`] runs the periodic phases, always in this order:
//!
//! ```text
//! 1. cleanup   – drop Disconnected sessions (stable, exactly once)
//! 2. presence  – publish !registry.is_empty()
//! 3. fan-out   – serial → every live session, ≤128 bytes per read
//! 4. drain     – inbound buffer → serial, short writes retried
//! ```
//!
//! A tick runs to completion: no event is applied in the middle of it.

use std::io;

use tracing::{debug, trace, warn};

use super::acceptor::{AcceptOutcome, ConnectionAcceptor};
use super::events::BridgeEvent;
use crate::domain::inbound::InboundBuffer;
use crate::domain::registry::SessionRegistry;
use crate::ports::{PresenceSink, SerialError, SerialPeer};

/// Largest chunk read from the serial peer in one call.
pub const SERIAL_CHUNK_SIZE: usize = 128;

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions removed by cleanup.
    pub removed: usize,
    /// Presence value published this tick.
    pub presence: bool,
    /// Chunks read from the serial peer and fanned out.
    pub chunks_out: usize,
    /// Bytes read from the serial peer and fanned out.
    pub bytes_out: usize,
    /// Bytes drained from the inbound buffer to the serial peer.
    pub bytes_in: usize,
}

/// The bridge between one serial peer and many network sessions.
pub struct BridgeLoop<S, P> {
    serial: S,
    presence: P,
    acceptor: ConnectionAcceptor,
    registry: SessionRegistry,
    inbound: InboundBuffer,
}

impl<S: SerialPeer, P: PresenceSink> BridgeLoop<S, P> {
    pub fn new(serial: S, presence: P, allow_multi_client: bool) -> Self {
        Self {
            serial,
            presence,
            acceptor: ConnectionAcceptor::new(allow_multi_client),
            registry: SessionRegistry::new(),
            inbound: InboundBuffer::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn inbound(&self) -> &InboundBuffer {
        &self.inbound
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Applies one reactor event.
    ///
    /// Returns the admission outcome for `Accepted` events, `None` otherwise.
    pub fn apply(&mut self, event: BridgeEvent) -> Option<AcceptOutcome> {
        match event {
            BridgeEvent::Accepted(incoming) => {
                Some(self.acceptor.accept(&mut self.registry, incoming))
            }
            BridgeEvent::DataReceived { session, bytes } => {
                if bytes.is_empty() {
                    return None;
                }
                match self.registry.get(session) {
                    Some(s) if s.is_connected() => {
                        trace!(session = %session, len = bytes.len(), "client data queued");
                        self.inbound.append(&bytes);
                    }
                    _ => trace!(session = %session, "dropping data for unknown or closed session"),
                }
                None
            }
            BridgeEvent::Faulted { session, kind } => {
                if let Some(s) = self.registry.get_mut(session) {
                    if s.mark_disconnected() {
                        debug!(session = %session, "client {} faulted: {kind}", s.identifier());
                    }
                }
                None
            }
        }
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Runs one complete tick.
    pub fn tick(&mut self) -> TickReport {
        let removed = self.registry.cleanup().len();
        let presence = self.update_presence();
        let (chunks_out, bytes_out) = self.serial_read();
        let bytes_in = self.serial_write();

        TickReport {
            removed,
            presence,
            chunks_out,
            bytes_out,
            bytes_in,
        }
    }

    /// Publishes the presence signal, whether or not it changed.
    fn update_presence(&mut self) -> bool {
        let connected = !self.registry.is_empty();
        self.presence.publish(connected);
        connected
    }

    /// Fans serial input out to every live session until the peer has no
    /// more data immediately available.
    fn serial_read(&mut self) -> (usize, usize) {
        let mut buf = [0u8; SERIAL_CHUNK_SIZE];
        let mut chunks = 0;
        let mut bytes = 0;

        loop {
            let available = match self.serial.available() {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("serial availability check failed: {e}");
                    break;
                }
            };

            let want = available.min(SERIAL_CHUNK_SIZE);
            let len = match self.serial.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("serial read failed: {e}");
                    break;
                }
            };

            let delivered = self.registry.broadcast(&buf[..len]);
            trace!(len, delivered, "serial chunk fanned out");
            chunks += 1;
            bytes += len;
        }

        (chunks, bytes)
    }

    /// Drains the inbound buffer into the serial peer.
    fn serial_write(&mut self) -> usize {
        if self.inbound.is_empty() {
            return 0;
        }
        let before = self.inbound.len();
        match self.inbound.drain_to(&mut self.serial) {
            Ok(written) => written,
            Err(e) => {
                let written = before - self.inbound.len();
                match e {
                    SerialError::WriteStalled { remaining } => {
                        debug!("serial write stalled; {remaining} byte(s) kept for next tick")
                    }
                    SerialError::Io(e) => warn!(
                        "serial write failed after {written} byte(s): {e}; {} byte(s) kept",
                        self.inbound.len()
                    ),
                }
                written
            }
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Force-closes every session and discards the registry.
    ///
    /// Safe to call repeatedly; returns how many sessions were closed.
    pub fn shutdown(&mut self) -> usize {
        let closed = self.registry.shutdown();
        if closed > 0 {
            debug!("closed {closed} client connection(s) on shutdown");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::FaultKind;
    use crate::ports::mock::{LinkTap, MockIncoming, MockSerialPeer, RecordingPresence};
    use crate::ports::MockPresenceSink;
    use crate::SessionId;

    type TestLoop = BridgeLoop<MockSerialPeer, RecordingPresence>;

    fn make_loop(allow_multi_client: bool) -> (TestLoop, MockSerialPeer, RecordingPresence) {
        let serial = MockSerialPeer::new();
        let presence = RecordingPresence::new();
        let bridge = BridgeLoop::new(serial.clone(), presence.clone(), allow_multi_client);
        (bridge, serial, presence)
    }

    fn connect(bridge: &mut TestLoop, identifier: &str) -> (Option<SessionId>, LinkTap) {
        let (incoming, tap) = MockIncoming::new(identifier);
        let outcome = bridge.apply(BridgeEvent::Accepted(Box::new(incoming)));
        let id = match outcome {
            Some(AcceptOutcome::Registered(id)) => Some(id),
            _ => None,
        };
        (id, tap)
    }

    fn data(session: SessionId, bytes: &[u8]) -> BridgeEvent {
        BridgeEvent::DataReceived {
            session,
            bytes: bytes.to_vec(),
        }
    }

    // ── Presence ──────────────────────────────────────────────────────────────

    #[test]
    fn test_presence_is_republished_every_tick() {
        let (mut bridge, _serial, presence) = make_loop(true);

        bridge.tick();
        bridge.tick();
        connect(&mut bridge, "a");
        bridge.tick();
        bridge.tick();

        assert_eq!(presence.history(), vec![false, false, true, true]);
    }

    #[test]
    fn test_presence_is_computed_after_cleanup() {
        let (mut bridge, _serial, presence) = make_loop(true);
        let (Some(id), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        bridge.apply(BridgeEvent::Faulted {
            session: id,
            kind: FaultKind::Disconnect,
        });

        let report = bridge.tick();

        assert_eq!(report.removed, 1);
        assert!(!report.presence);
        assert_eq!(presence.last(), Some(false));
    }

    #[test]
    fn test_presence_sink_called_once_per_tick() {
        let mut sink = MockPresenceSink::new();
        sink.expect_publish()
            .withf(|connected| !*connected)
            .times(3)
            .return_const(());
        let mut bridge = BridgeLoop::new(MockSerialPeer::new(), sink, false);

        for _ in 0..3 {
            bridge.tick();
        }
    }

    // ── Fan-out ───────────────────────────────────────────────────────────────

    #[test]
    fn test_serial_bytes_reach_every_live_session_in_order() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (_, tap_a) = connect(&mut bridge, "a");
        let (_, tap_b) = connect(&mut bridge, "b");
        serial.push_input(b"hello");

        let report = bridge.tick();

        assert_eq!(report.bytes_out, 5);
        assert_eq!(report.chunks_out, 1);
        assert_eq!(tap_a.chunks(), vec![b"hello".to_vec()]);
        assert_eq!(tap_b.chunks(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_serial_reads_are_bounded_to_chunk_size() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (_, tap) = connect(&mut bridge, "a");
        let input: Vec<u8> = (0..300u16).map(|i| (i % 251) as u8).collect();
        serial.push_input(&input);

        let report = bridge.tick();

        assert_eq!(serial.read_sizes(), vec![128, 128, 44]);
        assert_eq!(report.chunks_out, 3);
        assert_eq!(tap.received(), input);
        assert_eq!(serial.pending_input(), 0);
    }

    #[test]
    fn test_serial_input_is_consumed_with_no_clients() {
        let (mut bridge, serial, _presence) = make_loop(true);
        serial.push_input(b"nobody listening");

        let report = bridge.tick();

        assert_eq!(report.bytes_out, 16);
        assert_eq!(serial.pending_input(), 0);
    }

    #[test]
    fn test_faulted_session_gets_no_output_after_cleanup() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), tap_a) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        let (_, tap_b) = connect(&mut bridge, "b");
        serial.push_input(b"1");
        bridge.tick();

        bridge.apply(BridgeEvent::Faulted {
            session: a,
            kind: FaultKind::Error,
        });
        serial.push_input(b"2");
        bridge.tick();

        assert_eq!(tap_a.received(), b"1");
        assert!(tap_a.is_released());
        assert_eq!(tap_b.received(), b"12");
    }

    // ── Inbound drain ─────────────────────────────────────────────────────────

    #[test]
    fn test_client_data_is_drained_to_serial_on_next_tick() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };

        bridge.apply(data(a, b"AT"));
        bridge.apply(data(a, b"Z\r\n"));
        assert!(serial.written().is_empty());

        let report = bridge.tick();

        assert_eq!(report.bytes_in, 5);
        assert_eq!(serial.written(), b"ATZ\r\n");
        assert!(bridge.inbound().is_empty());
    }

    #[test]
    fn test_interleaved_clients_keep_per_client_order() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _pa) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        let (Some(b), _pb) = connect(&mut bridge, "b") else {
            panic!("connect failed");
        };

        bridge.apply(data(a, b"a1"));
        bridge.apply(data(b, b"b1"));
        bridge.apply(data(a, b"a2"));
        bridge.tick();

        assert_eq!(serial.written(), b"a1b1a2");
    }

    #[test]
    fn test_empty_and_unknown_payloads_are_ignored() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };

        bridge.apply(data(a, b""));
        bridge.apply(data(SessionId::new_v4(), b"stranger"));
        bridge.tick();

        assert!(serial.written().is_empty());
        assert_eq!(serial.write_calls(), 0);
    }

    #[test]
    fn test_data_after_fault_is_not_queued() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };

        bridge.apply(data(a, b"before"));
        bridge.apply(BridgeEvent::Faulted {
            session: a,
            kind: FaultKind::Timeout,
        });
        bridge.apply(data(a, b"after"));
        bridge.tick();

        assert_eq!(serial.written(), b"before");
    }

    #[test]
    fn test_short_serial_writes_do_not_drop_bytes() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        serial.limit_writes_to(1);

        bridge.apply(data(a, b"slow-uart"));
        let report = bridge.tick();

        assert_eq!(report.bytes_in, 9);
        assert_eq!(serial.write_calls(), 9);
        assert_eq!(serial.written(), b"slow-uart");
    }

    #[test]
    fn test_failed_serial_write_keeps_bytes_for_next_tick() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), _tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        serial.fail_writes_with(io::ErrorKind::TimedOut);

        bridge.apply(data(a, b"retry-me"));
        let report = bridge.tick();
        assert_eq!(report.bytes_in, 0);
        assert_eq!(bridge.inbound().len(), 8);

        serial.heal();
        let report = bridge.tick();
        assert_eq!(report.bytes_in, 8);
        assert_eq!(serial.written(), b"retry-me");
    }

    #[test]
    fn test_serial_read_failure_skips_fanout_but_still_drains() {
        // Arrange
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        serial.push_input(b"pending");
        serial.fail_reads_with(io::ErrorKind::BrokenPipe);
        bridge.apply(data(a, b"ok"));

        // Act
        let report = bridge.tick();

        // Assert
        assert_eq!(report.chunks_out, 0);
        assert_eq!(report.bytes_out, 0);
        assert_eq!(report.bytes_in, 2);
        assert_eq!(serial.written(), b"ok");
        assert!(tap.received().is_empty());
        assert_eq!(serial.pending_input(), 7);

        serial.heal();
        let report = bridge.tick();
        assert_eq!(report.bytes_out, 7);
        assert_eq!(tap.received(), b"pending");
    }

    #[test]
    fn test_serial_availability_failure_skips_fanout_but_still_drains() {
        let (mut bridge, serial, _presence) = make_loop(true);
        let (Some(a), tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };
        serial.push_input(b"xy");
        serial.fail_available_with(io::ErrorKind::NotConnected);
        bridge.apply(data(a, b"abc"));

        let report = bridge.tick();
        assert_eq!(report.bytes_out, 0);
        assert_eq!(report.bytes_in, 3);
        assert!(serial.read_sizes().is_empty());

        serial.heal();
        bridge.tick();
        assert_eq!(tap.received(), b"xy");
    }

    // ── Faults & shutdown ─────────────────────────────────────────────────────

    #[test]
    fn test_repeated_faults_are_idempotent() {
        let (mut bridge, _serial, _presence) = make_loop(true);
        let (Some(a), tap) = connect(&mut bridge, "a") else {
            panic!("connect failed");
        };

        for kind in [FaultKind::Error, FaultKind::Disconnect, FaultKind::Timeout] {
            bridge.apply(BridgeEvent::Faulted { session: a, kind });
        }
        assert_eq!(bridge.tick().removed, 1);
        assert_eq!(bridge.tick().removed, 0);
        assert!(tap.is_released());
        assert_eq!(tap.close_count(), 0);
    }

    #[test]
    fn test_shutdown_closes_all_sessions_once() {
        let (mut bridge, _serial, _presence) = make_loop(true);
        let (_, tap_a) = connect(&mut bridge, "a");
        let (_, tap_b) = connect(&mut bridge, "b");

        assert_eq!(bridge.shutdown(), 2);
        assert_eq!(bridge.shutdown(), 0);

        assert_eq!(tap_a.close_count(), 1);
        assert_eq!(tap_b.close_count(), 1);
        assert!(bridge.registry().is_empty());
    }

    #[test]
    fn test_shutdown_with_no_sessions_is_noop() {
        let (mut bridge, _serial, _presence) = make_loop(false);
        assert_eq!(bridge.shutdown(), 0);
    }
}
