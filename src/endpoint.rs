//! Endpoint keys and source-address classification.
//!
//! Every peer-facing table in the engine is keyed on an [`Endpoint`]: an
//! IPv4 address plus a UDP port, stored as the raw six bytes that also
//! travel on the wire. The relay protocol cannot express anything but
//! IPv4, so non-IPv4 sources are rejected at the key boundary.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

/// An (IPv4 address, UDP port) pair.
///
/// Hashing and equality are over the raw address octets and port, so the
/// key is constant-size and cheap to copy into tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    octets: [u8; 4],
    port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { octets: ip.octets(), port }
    }

    /// Extracts the IPv4 key from a socket address.
    ///
    /// IPv4-mapped IPv6 addresses (as produced by dual-stack listeners)
    /// are unmapped; native IPv6 sources are not representable on the
    /// wire and yield `None`.
    pub fn from_socket_addr(addr: SocketAddr) -> Option<Self> {
        match addr.ip() {
            IpAddr::V4(ip) => Some(Self::new(ip, addr.port())),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(|ip| Self::new(ip, addr.port())),
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.octets)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip(), self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// True for sources the client treats as the local application: loopback
/// IPv4 (127.0.0.0/8) or the IPv6 ULA range (fc00::/7).
///
/// The ULA branch is only reachable on a dual-stack listener; an
/// IPv4-only socket never observes it.
pub(crate) fn is_local_source(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => ip.octets()[0] == 127,
        IpAddr::V6(ip) => (ip.octets()[0] & 0xfe) == 0xfc,
    }
}
