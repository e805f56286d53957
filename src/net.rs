//! Socket and shutdown plumbing.
//!
//! Every socket the engine touches goes through the narrow [`PacketConn`] /
//! [`Netstack`] pair so tests can substitute a deterministic in-memory
//! network for the real UDP stack. The production implementation is a thin
//! wrapper over tokio's `UdpSocket`; all timing goes through `tokio::time`
//! so the test clock can be paused.
//!
//! Shutdown is cooperative: every long-running loop holds a
//! [`ShutdownSignal`] and returns at its next wake once the paired
//! [`Shutdown`] handle fires. Sockets are owned by the loops (or records)
//! that read them and close when those owners go away.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::watch;
use tracing::debug;

/// Default port of the rendezvous relay, baked into the build.
pub const DEFAULT_RELAY_PORT: u16 = 14761;

/// One unconnected datagram socket.
///
/// `send_to` must be safe to call from multiple tasks concurrently; the
/// engine interleaves rendezvous, punch, and forwarding sends on one
/// socket. tokio's `UdpSocket` satisfies this natively.
#[async_trait]
pub trait PacketConn: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Factory for [`PacketConn`]s. The engine allocates its public socket and
/// every per-peer loopback socket through this.
#[async_trait]
pub trait Netstack: Send + Sync {
    async fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>>;
}

/// The real UDP stack.
pub struct SystemNet;

#[async_trait]
impl Netstack for SystemNet {
    async fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>> {
        let socket = UdpSocket::bind(addr).await?;
        let conn: Arc<dyn PacketConn> = Arc::new(socket);
        Ok(conn)
    }
}

#[async_trait]
impl PacketConn for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Binds the public socket, preferring `preferred` and falling back to an
/// ephemeral port when it is already taken. `preferred = 0` binds an
/// ephemeral port directly.
pub(crate) async fn bind_public(
    net: &dyn Netstack,
    preferred: u16,
) -> io::Result<Arc<dyn PacketConn>> {
    let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    match net.bind(SocketAddr::new(any, preferred)).await {
        Ok(conn) => Ok(conn),
        Err(err) if preferred != 0 => {
            debug!(port = preferred, error = %err, "preferred port taken, using an ephemeral port");
            net.bind(SocketAddr::new(any, 0)).await
        }
        Err(err) => Err(err),
    }
}

/// Resolves the relay `host` or `host:port` string to an IPv4 endpoint.
/// The relay endpoint is resolved once at startup and treated as
/// immutable afterwards.
pub(crate) async fn resolve_relay(relay: &str) -> Result<SocketAddr> {
    let target = if relay.contains(':') {
        relay.to_string()
    } else {
        format!("{relay}:{DEFAULT_RELAY_PORT}")
    };
    let result = lookup_host(target.as_str())
        .await
        .with_context(|| format!("failed to resolve relay {relay}"))?
        .find(|addr| addr.is_ipv4())
        .with_context(|| format!("relay {relay} has no IPv4 address"));
    result
}

/// Resolves a remote host (IPv4 literal or hostname) to its IPv4 address.
pub(crate) async fn resolve_host_v4(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let addr = lookup_host((host, 0u16))
        .await
        .with_context(|| format!("failed to resolve host {host}"))?
        .find(|addr| addr.is_ipv4())
        .with_context(|| format!("host {host} has no IPv4 address"))?;
    match addr.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(_) => unreachable!("filtered to IPv4 above"),
    }
}

/// Fires the paired [`ShutdownSignal`]s. Dropping the handle without
/// triggering counts as shutdown too, so an engine can never outlive its
/// owner.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Cloneable shutdown observer held by every engine loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    /// Signals every loop to stop at its next wake.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered (or the handle dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
