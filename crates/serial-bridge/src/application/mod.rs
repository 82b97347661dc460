//! Application layer for serial-bridge.
//!
//! Connects the infrastructure adapters to the `BridgeLoop` engine and runs
//! the loop until shutdown.

pub mod service;

pub use service::{drive, pump_events, BridgeService, EVENT_QUEUE_DEPTH};
