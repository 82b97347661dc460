//! Bridge service: wires the TCP reactor, the serial device and the presence
//! output to a [`BridgeLoop`] and runs it until shutdown.
//!
//! # Threading
//!
//! ```text
//! tokio runtime                         blocking thread
//! ─────────────                         ───────────────
//! accept loop ──┬── mpsc<BridgeEvent> ──► drive():
//! reader tasks ─┘                           pump_events → tick → sleep
//!                                              │
//! client sockets ◄──── try_write ◄─────────────┘ (fan-out)
//! ```
//!
//! The bridge loop owns the serial device, the session registry and the
//! inbound buffer.  Reactor tasks only ever send events, so every state
//! change happens between ticks, on one thread.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use serial_bridge_core::{BridgeEvent, BridgeLoop, PresenceSink, SerialPeer};

use crate::domain::config::BridgeConfig;
use crate::infrastructure::presence::WatchPresence;
use crate::infrastructure::tcp_server::{LinkSettings, TcpAcceptor};

/// Capacity of the reactor → bridge loop event channel.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// A running bridge.
pub struct BridgeService {
    local_addr: SocketAddr,
    presence: watch::Receiver<bool>,
    accept_task: JoinHandle<()>,
    driver: JoinHandle<usize>,
}

impl BridgeService {
    /// Binds the listener and starts the accept loop and the bridge loop.
    ///
    /// Both stop once `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is invalid or cannot be bound.
    pub async fn start<S>(
        config: &BridgeConfig,
        serial: S,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<Self>
    where
        S: SerialPeer + 'static,
    {
        let listen_addr = config.listen_addr()?;
        let acceptor = TcpAcceptor::bind(listen_addr).await?;
        let local_addr = acceptor.local_addr();
        log_configuration(config, local_addr);

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let settings = LinkSettings {
            idle_timeout: config.client_timeout(),
        };
        let accept_task = acceptor.spawn(settings, events_tx, Arc::clone(&running));

        let (presence_sink, presence) = WatchPresence::new();
        let bridge = BridgeLoop::new(serial, presence_sink, config.server.allow_multi_client);
        let tick = config.tick_interval();
        let driver =
            tokio::task::spawn_blocking(move || drive(bridge, events_rx, tick, running));

        Ok(Self {
            local_addr,
            presence,
            accept_task,
            driver,
        })
    }

    /// The address clients connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receiver for the presence signal, updated every tick.
    pub fn presence(&self) -> watch::Receiver<bool> {
        self.presence.clone()
    }

    /// Waits for the bridge loop to finish and returns how many client
    /// connections were closed at shutdown.
    pub async fn wait(self) -> anyhow::Result<usize> {
        let closed = self.driver.await.context("bridge loop thread panicked")?;
        self.accept_task.abort();
        Ok(closed)
    }
}

fn log_configuration(config: &BridgeConfig, local_addr: SocketAddr) {
    info!("serial bridge:");
    info!("  address: {local_addr}");
    info!("  serial: {} ({})", config.serial.device, config.serial);
    info!(
        "  multiple clients: {}",
        if config.server.allow_multi_client { "allowed" } else { "single client only" }
    );
    match config.client_timeout() {
        Some(t) => info!("  client idle timeout: {}s", t.as_secs()),
        None => info!("  client idle timeout: disabled"),
    }
    debug!("  tick interval: {:?}", config.tick_interval());
}

// ── Bridge loop driver ────────────────────────────────────────────────────────

/// Applies every event currently queued, without waiting.
///
/// Returns `false` once the channel is closed and empty, meaning the reactor
/// is gone.
pub fn pump_events<S: SerialPeer, P: PresenceSink>(
    bridge: &mut BridgeLoop<S, P>,
    events: &mut mpsc::Receiver<BridgeEvent>,
) -> bool {
    loop {
        match events.try_recv() {
            Ok(event) => {
                bridge.apply(event);
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Runs the bridge loop on the calling thread until `running` is cleared or
/// the reactor goes away, then closes every session.
///
/// Returns the number of sessions closed at shutdown.
pub fn drive<S: SerialPeer, P: PresenceSink>(
    mut bridge: BridgeLoop<S, P>,
    mut events: mpsc::Receiver<BridgeEvent>,
    tick: Duration,
    running: Arc<AtomicBool>,
) -> usize {
    debug!("bridge loop started (tick {tick:?})");

    while running.load(Ordering::Relaxed) {
        if !pump_events(&mut bridge, &mut events) {
            warn!("network reactor stopped; shutting down bridge loop");
            break;
        }
        bridge.tick();
        std::thread::sleep(tick);
    }

    let closed = bridge.shutdown();
    info!("bridge loop stopped; closed {closed} client connection(s)");
    closed
}

// ── Tests ─────────────────────────────────────────────────────────────────────
