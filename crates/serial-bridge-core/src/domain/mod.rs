//! Domain layer: the mutable state of the bridge.
//!
//! - **`session`** – one admitted network client and its liveness.
//! - **`registry`** – the ordered list of sessions and its cleanup pass.
//! - **`inbound`** – the shared queue of client bytes bound for the serial peer.
//!
//! Nothing here performs I/O on its own; sockets and the serial device are
//! reached only through the traits in [`crate::ports`].

pub mod inbound;
pub mod registry;
pub mod session;
