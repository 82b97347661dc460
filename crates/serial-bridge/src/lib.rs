//! serial-bridge library crate.
//!
//! Runtime around the `serial-bridge-core` engine: configuration, the tokio
//! TCP reactor, the serial device adapter and the service that drives the
//! bridge loop.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! TCP clients
//!         ↕
//! [serial-bridge]
//!   ├── domain/           BridgeConfig (TOML + defaults)
//!   ├── application/      BridgeService: event pump + tick loop
//!   └── infrastructure/
//!         ├── tcp_server/   Accept loop, per-session reader tasks
//!         ├── serial_port/  SerialPeer over the `serialport` crate
//!         └── presence/     Presence published on a tokio watch channel
//!         ↕
//! Serial device
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O beyond reading the config file.
//! - `application` owns the bridge loop thread and wires the layers together.
//! - `infrastructure` implements the `serial_bridge_core::ports` traits.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: the bridge service.
pub mod application;

/// Infrastructure layer: TCP reactor, serial device, presence output.
pub mod infrastructure;
