//! Client role: the single-peer engine.
//!
//! One UDP socket serves every plane at once: announcements toward the
//! relay, hole punches toward the remote peer, and the loopback leg toward
//! the local application. Inbound datagrams are classified purely by
//! source address:
//!
//! - from the relay: port-learning chatter, ignored once discovery is done
//! - from the remote peer: framed data, forwarded to the local application
//!   when the tag marks it as such
//! - from a loopback-range source: local application output, tagged and
//!   forwarded to the remote peer
//!
//! The client is a thin specialisation of the server's classifier: one
//! fixed peer, no peer table, no fan-out, no idle timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn};

use crate::endpoint::{self, Endpoint};
use crate::net::{self, Netstack, PacketConn, ShutdownSignal, SystemNet};
use crate::rendezvous::{announce_loop, punch_loop};
use crate::wire;

/// Preferred local port for the public socket, giving the local
/// application a stable loopback target. Falls back to an ephemeral port
/// when taken; the chosen port is logged either way.
pub const DEFAULT_CLIENT_PORT: u16 = 41254;

/// Client-role parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay `host` or `host:port`.
    pub relay: String,
    /// Remote peer host: IPv4 literal or hostname.
    pub remote_host: String,
    /// Remote application port, as announced to the relay.
    pub remote_port: u16,
}

/// The client engine. [`Client::bind`] performs all fatal startup
/// acquisition; [`Client::run`] drives the rendezvous, discovery, and
/// forwarding phases until shutdown.
pub struct Client {
    conn: Arc<dyn PacketConn>,
    relay: SocketAddr,
    remote: Endpoint,
}

impl Client {
    /// Binds on the real UDP stack.
    pub async fn bind(config: &ClientConfig) -> Result<Self> {
        Self::bind_on(Arc::new(SystemNet), config).await
    }

    /// Binds on an explicit network stack. Tests substitute a
    /// deterministic in-memory network here.
    pub async fn bind_on(net: Arc<dyn Netstack>, config: &ClientConfig) -> Result<Self> {
        let relay = net::resolve_relay(&config.relay).await?;
        let remote_ip = net::resolve_host_v4(&config.remote_host)
            .await
            .context("failed to resolve remote host")?;
        let conn = net::bind_public(net.as_ref(), DEFAULT_CLIENT_PORT)
            .await
            .context("failed to bind public socket")?;

        let port = conn.local_addr().context("public socket has no local address")?.port();
        info!("listening, connect the application to 127.0.0.1:{port}");

        Ok(Self {
            conn,
            relay,
            remote: Endpoint::new(remote_ip, config.remote_port),
        })
    }

    /// Local port of the public socket; the loopback port the application
    /// should send to.
    pub fn local_port(&self) -> u16 {
        self.conn.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }

    /// Runs the engine until the shutdown signal fires.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<()> {
        let announce = wire::client_announce(self.remote);
        let announcer = tokio::spawn(announce_loop(
            self.conn.clone(),
            self.relay,
            announce.to_vec(),
            shutdown.clone(),
        ));

        // The announce loop is already refreshing the relay mapping; block
        // here until the relay reports the peer's external port.
        let remote = tokio::select! {
            _ = shutdown.cancelled() => {
                announcer.abort();
                return Ok(());
            }
            port = self.discover() => Endpoint::new(self.remote.ip(), port),
        };
        info!(peer = %remote, "peer endpoint learned, forwarding active");

        let puncher = tokio::spawn(punch_loop(
            self.conn.clone(),
            remote.socket_addr(),
            shutdown.clone(),
        ));

        self.forward(remote.socket_addr(), &shutdown).await;

        announcer.abort();
        puncher.abort();
        info!("engine stopped");
        Ok(())
    }

    /// Blocks until the relay reports the remote peer's external port.
    /// Datagrams from other sources are not processed during this phase;
    /// relay frames of the wrong length are logged and discarded.
    async fn discover(&self) -> u16 {
        let mut buf = [0u8; wire::RECV_BUFFER];
        loop {
            let (len, from) = match self.conn.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "receive failed");
                    continue;
                }
            };
            if from != self.relay {
                continue;
            }
            match wire::parse_port_reply(&buf[..len]) {
                Some(port) => return port,
                None => warn!(len, "discarding relay frame of unexpected size"),
            }
        }
    }

    /// The forwarding plane: classifies inbound datagrams by source and
    /// shuttles payloads between the remote peer and the most recently
    /// seen local application endpoint.
    async fn forward(&self, remote: SocketAddr, shutdown: &ShutdownSignal) {
        // Reads land at offset 1 so the local-to-remote path can stamp the
        // tag into byte 0 without copying the payload.
        let mut buf = [0u8; 1 + wire::RECV_BUFFER];
        let mut local: Option<SocketAddr> = None;

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return,
                received = self.conn.recv_from(&mut buf[1..]) => received,
            };
            let (len, from) = match received {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "receive failed");
                    continue;
                }
            };

            if from == self.relay {
                // Port learning is over; residual relay chatter is noise.
                continue;
            }

            if from == remote {
                if len == 0 || buf[1] != wire::TAG_DATA {
                    // Punches and unknown tags end here.
                    continue;
                }
                let Some(local) = local else {
                    debug!("peer data before any local source is known, dropping");
                    continue;
                };
                trace!(len = len - 1, "peer -> application");
                if let Err(err) = self.conn.send_to(&buf[2..1 + len], local).await {
                    warn!(application = %local, error = %err, "application send failed");
                }
            } else if endpoint::is_local_source(from.ip()) {
                if len > wire::MAX_PAYLOAD {
                    warn!(from = %from, len, "dropping oversize application datagram");
                    continue;
                }
                // Last writer wins: any loopback-range source becomes the
                // application endpoint.
                local = Some(from);
                buf[0] = wire::TAG_DATA;
                trace!(len, "application -> peer");
                if let Err(err) = self.conn.send_to(&buf[..1 + len], remote).await {
                    warn!(peer = %remote, error = %err, "peer send failed");
                }
            }
        }
    }
}
