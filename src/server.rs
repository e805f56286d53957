//! Server role: the multi-peer engine.
//!
//! The public socket receives relay adverts, peer punches, and framed peer
//! data all on one port. Each remote peer gets its own loopback socket
//! toward the local application, so the application observes every peer
//! as a distinct loopback source and can address replies per peer.
//!
//! Two tables with different lifecycles back the engine. The mapping
//! table (see [`crate::rendezvous`]) holds relay-advertised candidate
//! endpoints and only decides who receives punch traffic. The peer table
//! holds records for endpoints that actually sent data-plane traffic,
//! together with the resources owned on their behalf: the loopback socket
//! and the task draining it. A record's socket is closed exactly once,
//! enforced by removing the record from the table before teardown.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lru::LruCache;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::endpoint::Endpoint;
use crate::net::{self, Netstack, PacketConn, ShutdownSignal, SystemNet};
use crate::rendezvous::{keepalive_loop, MappingTable};
use crate::wire::{self, TAG_DATA};

/// Peers idle longer than this are evicted and their sockets closed.
pub const PEER_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of the idle sweep, interleaved with public-socket reads.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on simultaneously active peers. Overflow evicts the least
/// recently active peer rather than growing the table.
pub const MAX_PEERS: usize = 256;

/// Server-role parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Relay `host` or `host:port`.
    pub relay: String,
    /// Port the local application listens on.
    pub app_port: u16,
}

/// An actively conversing remote peer and the resources owned on its
/// behalf: the loopback socket the application sees it as, and the pump
/// task draining that socket back toward the peer.
struct PeerRecord {
    conn: Arc<dyn PacketConn>,
    last_activity: Instant,
    pump: JoinHandle<()>,
}

impl Drop for PeerRecord {
    fn drop(&mut self) {
        // Eviction tears down the pump; the loopback socket closes when
        // the pump's reference goes away with it.
        self.pump.abort();
    }
}

type PeerTable = Mutex<LruCache<Endpoint, PeerRecord>>;

/// The server engine. [`Server::bind`] performs all fatal startup
/// acquisition; [`Server::run`] drives the keepalive, discovery, and
/// forwarding phases until shutdown.
pub struct Server {
    net: Arc<dyn Netstack>,
    conn: Arc<dyn PacketConn>,
    relay: SocketAddr,
    app_port: u16,
    peers: Arc<PeerTable>,
    mappings: Arc<MappingTable>,
}

impl Server {
    /// Binds on the real UDP stack.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        Self::bind_on(Arc::new(SystemNet), config).await
    }

    /// Binds on an explicit network stack. Tests substitute a
    /// deterministic in-memory network here.
    pub async fn bind_on(net: Arc<dyn Netstack>, config: &ServerConfig) -> Result<Self> {
        let relay = net::resolve_relay(&config.relay).await?;
        let conn = net::bind_public(net.as_ref(), 0)
            .await
            .context("failed to bind public socket")?;

        let cap = MAX_PEERS.try_into().expect("MAX_PEERS must be non-zero");
        info!("listening, hosting application port {}", config.app_port);

        Ok(Self {
            net,
            conn,
            relay,
            app_port: config.app_port,
            peers: Arc::new(Mutex::new(LruCache::new(cap))),
            mappings: Arc::new(MappingTable::new()),
        })
    }

    /// Local address of the public socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.conn.local_addr().context("public socket has no local address")
    }

    /// Runs the engine until the shutdown signal fires.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<()> {
        // Announcements and mapping-driven punches start immediately; the
        // forwarding plane waits for the relay to report our public IP.
        let keepalive = tokio::spawn(keepalive_loop(
            self.conn.clone(),
            self.relay,
            wire::server_announce(self.app_port).to_vec(),
            self.mappings.clone(),
            shutdown.clone(),
        ));

        let public_ip = tokio::select! {
            _ = shutdown.cancelled() => {
                keepalive.abort();
                return Ok(());
            }
            ip = self.discover() => ip,
        };
        info!(public_ip = %public_ip, "public address learned, forwarding active");

        self.forward(&shutdown).await;

        keepalive.abort();
        // Dropping the records aborts every pump and closes its socket.
        self.peers.lock().expect("peer table poisoned").clear();
        info!("engine stopped");
        Ok(())
    }

    /// Blocks until the relay's first valid advert and returns this
    /// host's public IPv4. Mapping updates from that advert are ingested
    /// so punching starts without waiting for the next one. Datagrams
    /// from other sources are not processed during this phase.
    async fn discover(&self) -> Ipv4Addr {
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
            match wire::parse_advert(&buf[..len]) {
                Some(advert) => {
                    self.ingest_mappings(&advert.peers);
                    return advert.public_ip;
                }
                None => warn!(len, "discarding relay frame of unexpected size"),
            }
        }
    }

    fn ingest_mappings(&self, peers: &[Endpoint]) {
        for &peer in peers {
            if self.mappings.advertise(peer) {
                debug!(peer = %peer, "relay advertised new candidate peer");
            }
        }
    }

    /// The forwarding plane: public-socket reads interleaved with the
    /// idle sweep.
    async fn forward(&self, shutdown: &ShutdownSignal) {
        let mut sweep = time::interval(SWEEP_INTERVAL);
        sweep.tick().await; // skip the immediate first tick

        // Reads land at offset 1; the peer path never uses byte 0, but
        // keeping one layout for every data-plane buffer is simpler.
        let mut buf = [0u8; 1 + wire::RECV_BUFFER];
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sweep.tick() => {
                    self.sweep_idle();
                    continue;
                }
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
                match wire::parse_advert(&buf[1..1 + len]) {
                    Some(advert) => self.ingest_mappings(&advert.peers),
                    None => warn!(len, "discarding relay frame of unexpected size"),
                }
                continue;
            }

            let Some(peer) = Endpoint::from_socket_addr(from) else {
                // The wire protocol cannot name non-IPv4 peers.
                continue;
            };
            self.handle_peer(peer, &buf[1..1 + len]).await;
        }
    }

    /// Peer-path classification for one inbound datagram (already known
    /// not to come from the relay). `frame` is tag plus payload.
    async fn handle_peer(&self, peer: Endpoint, frame: &[u8]) {
        let known = {
            let mut peers = self.peers.lock().expect("peer table poisoned");
            match peers.get_mut(&peer) {
                Some(record) => {
                    // Any traffic from a known peer counts as activity,
                    // punches included.
                    record.last_activity = Instant::now();
                    Some(record.conn.clone())
                }
                None => None,
            }
        };

        let Some(conn) = known else {
            // First datagram from a new endpoint: allocate its resources
            // but do not forward it; it is most likely the punch anyway.
            self.add_peer(peer).await;
            return;
        };

        if let [TAG_DATA, payload @ ..] = frame {
            if !payload.is_empty() {
                let app = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.app_port);
                trace!(peer = %peer, len = payload.len(), "peer -> application");
                if let Err(err) = conn.send_to(payload, app).await {
                    warn!(peer = %peer, error = %err, "application send failed");
                }
            }
        }
    }

    /// Creates the record for a newly seen peer: a fresh ephemeral
    /// loopback socket plus the pump task that drains it.
    async fn add_peer(&self, peer: Endpoint) {
        let loopback = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let conn = match self.net.bind(loopback).await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(peer = %peer, error = %err, "failed to allocate loopback socket");
                return;
            }
        };

        let pump = tokio::spawn(pump_loopback(
            peer,
            conn.clone(),
            self.conn.clone(),
            self.peers.clone(),
        ));
        let record = PeerRecord { conn, last_activity: Instant::now(), pump };

        let mut peers = self.peers.lock().expect("peer table poisoned");
        if let Some((evicted, _)) = peers.push(peer, record) {
            if evicted != peer {
                info!(peer = %evicted, "peer table full, dropping least recently active peer");
            }
        }
        info!(peer = %peer, "peer connected");
    }

    /// Evicts peers idle longer than [`PEER_IDLE_TIMEOUT`]. Removing the
    /// record aborts its pump, which closes the loopback socket.
    fn sweep_idle(&self) {
        let mut peers = self.peers.lock().expect("peer table poisoned");
        let idle: Vec<Endpoint> = peers
            .iter()
            .filter(|(_, record)| record.last_activity.elapsed() > PEER_IDLE_TIMEOUT)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in idle {
            peers.pop(&endpoint);
            info!(peer = %endpoint, "peer disconnected (idle timeout)");
        }
    }
}

/// Drains one peer's loopback socket: every application datagram goes
/// back to the peer tagged as data. On read error the pump evicts its own
/// record and exits; the sweeper may already have done so, in which case
/// the pop is a no-op and the socket was closed on eviction.
async fn pump_loopback(
    peer: Endpoint,
    conn: Arc<dyn PacketConn>,
    public: Arc<dyn PacketConn>,
    peers: Arc<PeerTable>,
) {
    let mut buf = [0u8; 1 + wire::RECV_BUFFER];
    loop {
        let (len, _) = match conn.recv_from(&mut buf[1..]).await {
            Ok(received) => received,
            Err(err) => {
                debug!(peer = %peer, error = %err, "loopback read failed");
                break;
            }
        };
        if len > wire::MAX_PAYLOAD {
            warn!(peer = %peer, len, "dropping oversize application datagram");
            continue;
        }
        buf[0] = TAG_DATA;
        trace!(peer = %peer, len, "application -> peer");
        if let Err(err) = public.send_to(&buf[..1 + len], peer.socket_addr()).await {
            warn!(peer = %peer, error = %err, "peer send failed");
        }
    }

    if peers.lock().expect("peer table poisoned").pop(&peer).is_some() {
        info!(peer = %peer, "peer disconnected (loopback closed)");
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{self, Duration};

    use super::*;
    use crate::net::memory::MemoryNet;
    use crate::net::Shutdown;
    use crate::wire::TAG_PUNCH;

    const RELAY: &str = "203.0.113.1:14761";
    const PEER_A: &str = "198.51.100.9:10000";
    const PEER_B: &str = "198.51.100.10:20000";
    const APP: &str = "127.0.0.1:7000";

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn config() -> ServerConfig {
        ServerConfig { relay: RELAY.to_string(), app_port: 7000 }
    }

    /// Advert frame for 2.0.0.1 plus the given peer records.
    fn advert(peers: &[&str]) -> Vec<u8> {
        let mut frame = vec![0xCE, 0xCC, 0xCC, 0xCD];
        for peer in peers {
            let addr = addr(peer);
            frame.extend_from_slice(&addr.port().to_be_bytes());
            match addr.ip() {
                IpAddr::V4(ip) => frame.extend_from_slice(&ip.octets()),
                IpAddr::V6(_) => unreachable!(),
            }
        }
        frame
    }

    async fn recv_within(
        conn: &Arc<dyn PacketConn>,
        window: Duration,
    ) -> Option<(Vec<u8>, SocketAddr)> {
        let mut buf = [0u8; 8192];
        match time::timeout(window, conn.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => Some((buf[..len].to_vec(), from)),
            _ => None,
        }
    }

    /// Receives, skipping punch keepalives.
    async fn recv_data(conn: &Arc<dyn PacketConn>) -> Option<(Vec<u8>, SocketAddr)> {
        for _ in 0..64 {
            match recv_within(conn, Duration::from_millis(600)).await {
                Some((frame, _)) if frame == [TAG_PUNCH] => continue,
                other => return other,
            }
        }
        None
    }

    /// Binds a server on a memory net, walks it through discovery with an
    /// advert naming `peers`, and returns (relay conn, server public addr,
    /// shutdown handle).
    async fn discovered_server(
        net: &MemoryNet,
        peers: &[&str],
    ) -> (Arc<dyn PacketConn>, SocketAddr, Shutdown) {
        let relay = net.bind(addr(RELAY)).await.unwrap();

        let server = Server::bind_on(Arc::new(net.clone()), &config()).await.unwrap();
        let public = server.local_addr().unwrap();

        let (shutdown, signal) = Shutdown::new();
        tokio::spawn(server.run(signal));

        // S2: the announcement carries the application port.
        let (frame, from) = recv_within(&relay, Duration::from_millis(550)).await.unwrap();
        assert_eq!(frame, [0x1B, 0x58]);
        assert_eq!(from, public);
        relay.send_to(&advert(peers), from).await.unwrap();

        (relay, public, shutdown)
    }

    /// Introduces a peer to a discovered server: a punch creates the
    /// record without being forwarded.
    async fn join_peer(net: &MemoryNet, public: SocketAddr, peer: &str) -> Arc<dyn PacketConn> {
        let conn = net.bind(addr(peer)).await.unwrap();
        conn.send_to(&[TAG_PUNCH], public).await.unwrap();
        // The punch back from the keepalive loop confirms the mapping.
        conn
    }

    #[tokio::test(start_paused = true)]
    async fn advertised_peer_receives_punches() {
        let net = MemoryNet::new();
        let peer = net.bind(addr(PEER_A)).await.unwrap();
        let (_relay, _public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        for _ in 0..10 {
            let (frame, _) = recv_within(&peer, Duration::from_millis(550))
                .await
                .expect("punch missed the 550 ms deadline");
            assert_eq!(frame, [TAG_PUNCH]);
        }
        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_adverts_do_not_duplicate_candidates() {
        let net = MemoryNet::new();
        let peer = net.bind(addr(PEER_A)).await.unwrap();
        let (relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        for _ in 0..5 {
            relay.send_to(&advert(&[PEER_A]), public).await.unwrap();
        }

        // One punch per pass, not one per advert.
        let (frame, _) = recv_within(&peer, Duration::from_millis(550)).await.unwrap();
        assert_eq!(frame, [TAG_PUNCH]);
        let window_start = time::Instant::now();
        let mut punches = 1usize;
        while window_start.elapsed() < Duration::from_secs(2) {
            if recv_within(&peer, Duration::from_millis(550)).await.is_some() {
                punches += 1;
            }
        }
        assert!(punches <= 6, "expected ~1 punch per 500 ms pass, got {punches}");

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn peer_data_fans_out_to_application() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        // S3: the punch creates the record; the framed payload reaches the
        // application from the peer's own loopback source.
        let peer = join_peer(&net, public, PEER_A).await;
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();

        let (payload, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"hi");
        assert!(l1.ip().is_loopback());
        assert_ne!(l1, addr(APP));

        // The application's reply routes back through L1 to the peer.
        app.send_to(b"ok", l1).await.unwrap();
        let (frame, from) = recv_data(&peer).await.unwrap();
        assert_eq!(frame, [TAG_DATA, b'o', b'k']);
        assert_eq!(from, public);

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn first_peer_datagram_is_not_forwarded() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        // Even a data-tagged first datagram only creates the record.
        let peer = net.bind(addr(PEER_A)).await.unwrap();
        peer.send_to(&[TAG_DATA, b'x'], public).await.unwrap();
        assert!(recv_within(&app, Duration::from_secs(2)).await.is_none());

        // The second one is forwarded.
        peer.send_to(&[TAG_DATA, b'y'], public).await.unwrap();
        let (payload, _) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"y");

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn punch_refreshes_activity_but_is_not_forwarded() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        let peer = join_peer(&net, public, PEER_A).await;

        // S4: punches and unknown tags never reach the application...
        peer.send_to(&[TAG_PUNCH], public).await.unwrap();
        peer.send_to(&[0xAB, 1, 2], public).await.unwrap();
        peer.send_to(&[TAG_DATA], public).await.unwrap(); // empty payload
        assert!(recv_within(&app, Duration::from_secs(2)).await.is_none());

        // ...but they do count as activity: keep punching past the idle
        // timeout and the peer must survive the sweep.
        for _ in 0..30 {
            time::sleep(Duration::from_millis(500)).await;
            peer.send_to(&[TAG_PUNCH], public).await.unwrap();
        }
        peer.send_to(&[TAG_DATA, b'z'], public).await.unwrap();
        let (payload, _) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"z");

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_isolates_two_peers() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A, PEER_B]).await;

        let peer_a = join_peer(&net, public, PEER_A).await;
        let peer_b = join_peer(&net, public, PEER_B).await;

        peer_a.send_to(&[TAG_DATA, b'a'], public).await.unwrap();
        let (payload, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"a");

        peer_b.send_to(&[TAG_DATA, b'b'], public).await.unwrap();
        let (payload, l2) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"b");

        // Two distinct loopback sources, one per peer.
        assert_ne!(l1, l2);

        // Replies route by loopback source, crossed on purpose.
        app.send_to(b"to-b", l2).await.unwrap();
        app.send_to(b"to-a", l1).await.unwrap();
        let (frame, _) = recv_data(&peer_b).await.unwrap();
        assert_eq!(frame, [TAG_DATA, b't', b'o', b'-', b'b']);
        let (frame, _) = recv_data(&peer_a).await.unwrap();
        assert_eq!(frame, [TAG_DATA, b't', b'o', b'-', b'a']);

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_peer_is_evicted_and_socket_closed() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        let peer = join_peer(&net, public, PEER_A).await;
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();
        let (_, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert!(net.is_bound(l1));

        // S5: the peer goes idle past the timeout; the next sweep pass
        // evicts it and closes its loopback socket.
        time::sleep(Duration::from_secs(21)).await;
        time::sleep(Duration::from_millis(10)).await;
        assert!(!net.is_bound(l1));

        // Application datagrams to the dead socket vanish; the peer gets
        // nothing but stale punches at most.
        app.send_to(b"late", l1).await.unwrap();
        assert!(recv_data(&peer).await.is_none());

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn loopback_read_error_evicts_peer() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        let peer = join_peer(&net, public, PEER_A).await;
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();
        let (_, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();

        // Kill the loopback socket under the pump; the pump must remove
        // the record itself.
        net.unbind(l1);
        time::sleep(Duration::from_millis(10)).await;

        // A fresh datagram from the same endpoint recreates the record on
        // a new loopback socket.
        peer.send_to(&[TAG_DATA, b'x'], public).await.unwrap(); // recreates
        peer.send_to(&[TAG_DATA, b'y'], public).await.unwrap();
        let (payload, l2) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert_eq!(payload, b"y");
        assert_ne!(l1, l2);

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn oversize_application_datagram_is_dropped() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        let peer = join_peer(&net, public, PEER_A).await;
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();
        let (_, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();

        app.send_to(&vec![0x5A; wire::MAX_PAYLOAD + 1], l1).await.unwrap();
        assert!(recv_data(&peer).await.is_none());

        // The largest valid payload still flows.
        app.send_to(&vec![0x5A; wire::MAX_PAYLOAD], l1).await.unwrap();
        let (frame, _) = recv_data(&peer).await.unwrap();
        assert_eq!(frame.len(), 1 + wire::MAX_PAYLOAD);
        assert_eq!(frame[0], TAG_DATA);

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn peers_are_ignored_before_discovery() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let _relay = net.bind(addr(RELAY)).await.unwrap();

        let server = Server::bind_on(Arc::new(net.clone()), &config()).await.unwrap();
        let public = server.local_addr().unwrap();
        let (shutdown, signal) = Shutdown::new();
        tokio::spawn(server.run(signal));

        // No advert yet: peer traffic must not create records or forward.
        let peer = net.bind(addr(PEER_A)).await.unwrap();
        peer.send_to(&[TAG_PUNCH], public).await.unwrap();
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();
        assert!(recv_within(&app, Duration::from_secs(2)).await.is_none());

        shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_peer_sockets() {
        let net = MemoryNet::new();
        let app = net.bind(addr(APP)).await.unwrap();
        let (_relay, public, shutdown) = discovered_server(&net, &[PEER_A]).await;

        let peer = join_peer(&net, public, PEER_A).await;
        peer.send_to(&[TAG_DATA, b'h', b'i'], public).await.unwrap();
        let (_, l1) = recv_within(&app, Duration::from_secs(2)).await.unwrap();
        assert!(net.is_bound(l1));

        shutdown.trigger();
        time::sleep(Duration::from_millis(10)).await;
        assert!(!net.is_bound(l1));
    }
}
