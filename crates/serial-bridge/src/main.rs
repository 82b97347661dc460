//! Serial-to-TCP bridge: entry point.
//!
//! Opens one serial device and exposes it on a TCP port.  Everything the
//! device sends is broadcast to every connected client in chunks of at most
//! 128 bytes; everything a client sends is written to the device.
//!
//! # Usage
//!
//! ```text
//! serial-bridge [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>          TOML config file
//!   -d, --device <PATH>          Serial device, e.g. /dev/ttyUSB0
//!       --baud <RATE>            Serial baud rate
//!   -p, --port <PORT>            TCP listener port [default from config: 6638]
//!       --bind <ADDR>            TCP bind address [default from config: 0.0.0.0]
//!       --single-client          Reject new clients while one is connected
//!       --client-timeout <SECS>  Disconnect idle clients (0 disables)
//!       --tick-ms <MS>           Bridge loop period
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Flag         |
//! |------------------------|--------------|
//! | `SERIAL_BRIDGE_CONFIG` | `--config`   |
//! | `SERIAL_BRIDGE_DEVICE` | `--device`   |
//! | `SERIAL_BRIDGE_PORT`   | `--port`     |
//! | `SERIAL_BRIDGE_BIND`   | `--bind`     |
//!
//! Precedence is: command line, then environment, then config file, then the
//! built-in defaults.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use serial_bridge::application::BridgeService;
use serial_bridge::domain::{load_config, BridgeConfig};
use serial_bridge::infrastructure::SystemSerialPort;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial-to-TCP bridge.
#[derive(Debug, Parser)]
#[command(
    name = "serial-bridge",
    about = "Expose a serial device to TCP clients",
    version
)]
struct Cli {
    /// TOML config file.  Flags below override values read from it.
    #[arg(short, long, env = "SERIAL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path.
    #[arg(short, long, env = "SERIAL_BRIDGE_DEVICE")]
    device: Option<String>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// TCP port clients connect to.
    #[arg(short, long, env = "SERIAL_BRIDGE_PORT")]
    port: Option<u16>,

    /// IP address to bind the listener to.
    #[arg(long, env = "SERIAL_BRIDGE_BIND")]
    bind: Option<String>,

    /// Allow only one connected client at a time.
    #[arg(long)]
    single_client: bool,

    /// Disconnect clients that stay silent for this many seconds (0 disables).
    #[arg(long)]
    client_timeout: Option<u64>,

    /// Bridge loop period in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,
}

impl Cli {
    /// Loads the config file (if any), applies the flag overrides and
    /// validates the result.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(device) = self.device {
            config.serial.device = device;
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if self.single_client {
            config.server.allow_multi_client = false;
        }
        if let Some(secs) = self.client_timeout {
            config.server.client_timeout_secs = secs;
        }
        if let Some(ms) = self.tick_ms {
            config.server.tick_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("serial bridge {} starting", env!("CARGO_PKG_VERSION"));

    let serial = SystemSerialPort::open(&config.serial)?;

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let service = BridgeService::start(&config, serial, Arc::clone(&running)).await?;
    service.wait().await?;

    info!("serial bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
