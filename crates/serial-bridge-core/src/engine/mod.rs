//! Engine layer: turns reactor events and periodic ticks into state changes
//! and byte movement.
//!
//! - **`events`** – the typed events a network reactor feeds into the loop.
//! - **`acceptor`** – admission of new connections under the client policy.
//! - **`bridge_loop`** – the tick driver: cleanup, presence, fan-out, drain.

pub mod acceptor;
pub mod bridge_loop;
pub mod events;
