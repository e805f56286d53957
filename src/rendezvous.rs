//! Rendezvous and hole-punch cadence loops.
//!
//! Both roles retransmit their announcement to the relay every 500 ms for
//! as long as the engine runs: the relay may drop frames, and the
//! retransmission itself is what keeps the NAT mapping toward the relay
//! alive. No reply is ever required to keep transmitting.
//!
//! The server additionally punches every candidate peer endpoint the relay
//! has advertised, sweeping entries it has not seen re-advertised within
//! [`MAPPING_TIMEOUT`]. The client punches its single remote endpoint once
//! that endpoint's external port is known.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::net::{PacketConn, ShutdownSignal};
use crate::wire::PUNCH_FRAME;

/// Interval between relay announcements and between hole punches.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(500);

/// Candidate endpoints not re-advertised within this window stop
/// receiving punch traffic.
pub const MAPPING_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on relay-advertised candidate endpoints tracked at once.
/// Overflow evicts the stalest candidate rather than growing the table.
pub const MAX_MAPPINGS: usize = 1024;

/// Relay-advertised candidate peers and when each was last advertised.
///
/// Shared between the server's relay-ingest path (inserts) and its
/// keepalive loop (sweeps and punch fan-out). The lock is held only for
/// table lookups, never across I/O.
pub(crate) struct MappingTable {
    entries: Mutex<LruCache<Endpoint, Instant>>,
}

impl MappingTable {
    pub(crate) fn new() -> Self {
        let cap = MAX_MAPPINGS.try_into().expect("MAX_MAPPINGS must be non-zero");
        Self { entries: Mutex::new(LruCache::new(cap)) }
    }

    /// Records a relay advert for `endpoint`, refreshing its timestamp.
    /// Returns true when the endpoint was not already tracked; repeated
    /// adverts never create duplicate entries.
    pub(crate) fn advertise(&self, endpoint: Endpoint) -> bool {
        let mut entries = self.entries.lock().expect("mapping table poisoned");
        let newly_seen = !entries.contains(&endpoint);
        entries.put(endpoint, Instant::now());
        newly_seen
    }

    /// Drops entries older than [`MAPPING_TIMEOUT`] and returns the
    /// endpoints still due punch traffic.
    pub(crate) fn sweep_and_collect(&self) -> Vec<Endpoint> {
        let mut entries = self.entries.lock().expect("mapping table poisoned");
        let expired: Vec<Endpoint> = entries
            .iter()
            .filter(|(_, advertised)| advertised.elapsed() > MAPPING_TIMEOUT)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in &expired {
            entries.pop(endpoint);
            debug!(peer = %endpoint, "candidate peer expired");
        }
        entries.iter().map(|(endpoint, _)| *endpoint).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Client announce loop: one announcement frame to the relay every 500 ms
/// until shutdown. The frame is built once at loop entry.
pub(crate) async fn announce_loop(
    conn: Arc<dyn PacketConn>,
    relay: SocketAddr,
    frame: Vec<u8>,
    shutdown: ShutdownSignal,
) {
    loop {
        if let Err(err) = conn.send_to(&frame, relay).await {
            warn!(relay = %relay, error = %err, "relay announce failed");
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = time::sleep(ANNOUNCE_INTERVAL) => {}
        }
    }
}

/// Punch loop: one [`PUNCH_FRAME`] to `target` every 500 ms until
/// shutdown, opening and then refreshing the NAT pinhole toward it.
pub(crate) async fn punch_loop(
    conn: Arc<dyn PacketConn>,
    target: SocketAddr,
    shutdown: ShutdownSignal,
) {
    loop {
        if let Err(err) = conn.send_to(&PUNCH_FRAME, target).await {
            warn!(peer = %target, error = %err, "hole punch failed");
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = time::sleep(ANNOUNCE_INTERVAL) => {}
        }
    }
}

/// Server keepalive loop. Each pass sweeps stale mappings, re-announces
/// the application port to the relay, then punches every remaining
/// candidate endpoint. The next wake is scheduled at `500 ms − elapsed`,
/// clamped at zero, so the cadence does not drift with send latency.
pub(crate) async fn keepalive_loop(
    conn: Arc<dyn PacketConn>,
    relay: SocketAddr,
    announce: Vec<u8>,
    mappings: Arc<MappingTable>,
    shutdown: ShutdownSignal,
) {
    loop {
        let pass_started = Instant::now();

        let targets = mappings.sweep_and_collect();
        if let Err(err) = conn.send_to(&announce, relay).await {
            warn!(relay = %relay, error = %err, "relay announce failed");
        }
        for endpoint in targets {
            if let Err(err) = conn.send_to(&PUNCH_FRAME, endpoint.socket_addr()).await {
                warn!(peer = %endpoint, error = %err, "hole punch failed");
            }
        }

        let wait = ANNOUNCE_INTERVAL.saturating_sub(pass_started.elapsed());
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = time::sleep(wait) => {}
        }
    }
}
