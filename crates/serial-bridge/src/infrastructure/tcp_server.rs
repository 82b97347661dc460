//! TCP reactor: accept loop, per-session reader tasks and socket writes.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener on the configured address.
//! 2. Accepting client connections and handing each one to the bridge loop as
//!    a [`BridgeEvent::Accepted`] carrying a [`TcpIncoming`].
//! 3. Once the bridge loop admits a connection, running a **reader** task for
//!    it: socket bytes → [`BridgeEvent::DataReceived`], and a single
//!    [`BridgeEvent::Faulted`] when the peer disconnects, errors or idles out.
//! 4. Writing fan-out chunks from the bridge loop thread with non-blocking
//!    `try_write`; there is no per-client buffering beyond the socket's own.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! The bridge loop itself runs on a blocking thread; nothing in here ever
//! touches the session registry.  All state changes travel as events.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use serial_bridge_core::{BridgeEvent, FaultKind, IncomingConnection, SessionId, SessionLink};

/// How long one `accept()` waits before the loop re-checks `running`.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Size of the per-session socket read buffer.
const READ_BUFFER_SIZE: usize = 1024;

/// Error type for the network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The listener could not be bound (port in use, no permission, ...).
    #[error("failed to bind TCP listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound listener could not report its own address.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Per-session transport settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSettings {
    /// Fault a session with [`FaultKind::Timeout`] after this long without
    /// receiving anything.  `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// A bound TCP listener that has not started accepting yet.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Binds the listener on `addr`.  Port `0` picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr().map_err(NetworkError::LocalAddr)?;
        info!("listening for clients on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound, with the real port when `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept loop on the current runtime.
    ///
    /// Every accepted connection is sent on `events`.  The loop ends when
    /// `running` is cleared or the receiving side of `events` is dropped.
    pub fn spawn(
        self,
        settings: LinkSettings,
        events: mpsc::Sender<BridgeEvent>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(accept_loop(self.listener, settings, events, running))
    }
}

async fn accept_loop(
    listener: TcpListener,
    settings: LinkSettings,
    events: mpsc::Sender<BridgeEvent>,
    running: Arc<AtomicBool>,
) {
    let runtime = Handle::current();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("incoming connection from {peer}");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not set TCP_NODELAY for {peer}: {e}");
                }
                let incoming = TcpIncoming {
                    stream,
                    peer,
                    settings,
                    events: events.clone(),
                    runtime: runtime.clone(),
                };
                if events
                    .send(BridgeEvent::Accepted(Box::new(incoming)))
                    .await
                    .is_err()
                {
                    debug!("bridge loop has stopped; stopping accept loop");
                    break;
                }
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Incoming connection ───────────────────────────────────────────────────────

/// An accepted socket waiting for the bridge loop's admission decision.
pub struct TcpIncoming {
    stream: TcpStream,
    peer: SocketAddr,
    settings: LinkSettings,
    events: mpsc::Sender<BridgeEvent>,
    runtime: Handle,
}

impl fmt::Debug for TcpIncoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpIncoming")
            .field("peer", &self.peer)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl IncomingConnection for TcpIncoming {
    fn is_open(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }

    fn peer_identifier(&self) -> String {
        self.peer.ip().to_string()
    }

    fn attach(self: Box<Self>, session: SessionId) -> Box<dyn SessionLink> {
        let TcpIncoming {
            stream,
            peer,
            settings,
            events,
            runtime,
        } = *self;

        let (read_half, write_half) = stream.into_split();
        let reader = runtime.spawn(read_loop(
            read_half,
            session,
            settings.idle_timeout,
            events.clone(),
        ));

        Box::new(TcpLink {
            peer,
            session,
            writer: Some(write_half),
            reader,
            events,
            dropping: false,
        })
    }

    fn reject(self: Box<Self>) {
        debug!("closing rejected connection from {}", self.peer);
        drop(self.stream);
    }
}

// ── Session link ──────────────────────────────────────────────────────────────

/// Outbound handle of an admitted session.
///
/// Writes go straight to the socket with `try_write` and never wait: whatever
/// the kernel send buffer cannot take right now is dropped for this client.
/// The socket is released when the link is closed or dropped.
pub struct TcpLink {
    peer: SocketAddr,
    session: SessionId,
    writer: Option<OwnedWriteHalf>,
    reader: JoinHandle<()>,
    events: mpsc::Sender<BridgeEvent>,
    /// Set while output is being dropped because the socket is not writable.
    dropping: bool,
}

impl TcpLink {
    fn report_write_failure(&mut self, error: io::Error) {
        debug!(session = %self.session, "write error: {error}");
        self.writer = None;
        let fault = BridgeEvent::Faulted {
            session: self.session,
            kind: FaultKind::Error,
        };
        if self.events.try_send(fault).is_err() {
            trace!(session = %self.session, "event queue full; reader will report the fault");
        }
    }
}

impl SessionLink for TcpLink {
    fn write(&mut self, chunk: &[u8]) {
        let Some(writer) = &self.writer else {
            return;
        };

        let mut sent = 0;
        let result = loop {
            if sent == chunk.len() {
                break Ok(());
            }
            match writer.try_write(&chunk[sent..]) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(()) => {
                if self.dropping {
                    debug!(peer = %self.peer, "client caught up; output resumed");
                    self.dropping = false;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if !self.dropping {
                    warn!(peer = %self.peer, "client is not keeping up; dropping output");
                    self.dropping = true;
                }
                trace!(peer = %self.peer, "dropped {} byte(s)", chunk.len() - sent);
            }
            Err(e) => self.report_write_failure(e),
        }
    }

    fn close(&mut self) {
        self.writer = None;
        self.reader.abort();
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ── Per-session tasks ─────────────────────────────────────────────────────────

async fn read_loop(
    mut reader: OwnedReadHalf,
    session: SessionId,
    idle_timeout: Option<Duration>,
    events: mpsc::Sender<BridgeEvent>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let kind = loop {
        let read = match idle_timeout {
            Some(limit) => match timeout(limit, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => break FaultKind::Timeout,
            },
            None => reader.read(&mut buf).await,
        };

        match read {
            Ok(0) => break FaultKind::Disconnect,
            Ok(n) => {
                trace!(%session, "received {n} byte(s)");
                let event = BridgeEvent::DataReceived {
                    session,
                    bytes: buf[..n].to_vec(),
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(%session, "read error: {e}");
                break FaultKind::Error;
            }
        }
    };

    debug!(%session, "session faulted: {kind}");
    let _ = events.send(BridgeEvent::Faulted { session, kind }).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
