//! Infrastructure layer for serial-bridge.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and accepting client connections
//! - Per-session reader tasks that turn socket activity into `BridgeEvent`s
//! - Non-blocking fan-out writes straight onto client sockets
//! - Opening the serial device with the configured line settings
//! - Publishing the presence signal
//!
//! # What does NOT belong here?
//!
//! - Session bookkeeping and fan-out (that is `serial-bridge-core`)
//! - Configuration parsing (that is the domain layer)

pub mod presence;
pub mod serial_port;
pub mod tcp_server;

pub use presence::WatchPresence;
pub use serial_port::{SerialOpenError, SystemSerialPort};
pub use tcp_server::{LinkSettings, NetworkError, TcpAcceptor};
