//! # serial-bridge-core
//!
//! Connection lifecycle and byte fan-out engine for a serial-to-network bridge.
//!
//! One serial peer (a UART attached sensor, modem or debug console) is shared
//! by zero or more network clients.  Bytes read from the serial peer are
//! broadcast to every connected client; bytes received from any client are
//! queued and forwarded to the serial peer.
//!
//! This crate contains no sockets and no serial drivers.  It talks to the
//! outside world exclusively through the traits in [`ports`], which keeps every
//! rule in here testable with the in-memory doubles from [`ports::mock`].
//!
//! # Architecture overview
//!
//! ```text
//!   network reactor (tokio tasks)            serial driver
//!        │ BridgeEvent                            ▲ │
//!        ▼                                        │ ▼
//!   ┌──────────────────────── BridgeLoop ────────────────────────┐
//!   │ apply(event)   → ConnectionAcceptor / Session liveness     │
//!   │                → InboundBuffer::append                     │
//!   │ tick()         1. SessionRegistry::cleanup                 │
//!   │                2. presence = !registry.is_empty()          │
//!   │                3. serial → every live Session (fan-out)    │
//!   │                4. InboundBuffer → serial (drain)           │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **`domain`** – `Session`, `SessionRegistry` and `InboundBuffer`: the only
//!   mutable state of the bridge.
//! - **`engine`** – the typed event model, the connection acceptor and the
//!   tick-driven [`BridgeLoop`].
//! - **`ports`** – the collaborator traits (`SerialPeer`, `SessionLink`,
//!   `IncomingConnection`, `PresenceSink`) plus mock implementations.

pub mod domain;
pub mod engine;
pub mod ports;

pub use domain::inbound::InboundBuffer;
pub use domain::registry::SessionRegistry;
pub use domain::session::{Liveness, Session, SessionId};
pub use engine::acceptor::{AcceptOutcome, ConnectionAcceptor};
pub use engine::bridge_loop::{BridgeLoop, TickReport, SERIAL_CHUNK_SIZE};
pub use engine::events::{BridgeEvent, FaultKind};
pub use ports::{IncomingConnection, PresenceSink, SerialError, SerialPeer, SessionLink};
