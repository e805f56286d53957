//! Relay wire protocol and data-plane framing.
//!
//! The relay speaks a tiny, stateless, length-discriminated UDP protocol.
//! All multi-byte fields are big-endian. Four frames exist:
//!
//! | Direction | Payload | Meaning |
//! |-----------|---------|---------|
//! | client → relay | port(2) ‖ IPv4(4) | "Advertise me; I want to reach this endpoint." |
//! | relay → client | port(2) | "Your peer is mapped to this external port." |
//! | server → relay | port(2) | "Advertise my application port." |
//! | relay → server | masked IPv4(4) ‖ N × (port(2) ‖ IPv4(4)) | "Your public address, and the peers asking for you." |
//!
//! On the data plane a single leading tag byte multiplexes frame kinds on
//! one socket: [`TAG_DATA`] marks forwarded application payloads,
//! [`TAG_PUNCH`] marks one-byte hole-punch keepalives. Unknown tags are
//! dropped by the forwarding planes.

use std::net::Ipv4Addr;

use crate::endpoint::Endpoint;

/// Tag byte prefixed to every forwarded application payload.
pub const TAG_DATA: u8 = 0xCC;

/// Tag byte of a hole-punch keepalive.
pub const TAG_PUNCH: u8 = 0xCD;

/// The complete punch datagram: a single tag byte.
pub const PUNCH_FRAME: [u8; 1] = [TAG_PUNCH];

/// Usable receive space per socket. Datagrams that fill it past the
/// largest forwardable frame are dropped.
pub const RECV_BUFFER: usize = 4096;

/// Largest forwardable application payload; one byte of the buffer is
/// reserved for the tag.
pub const MAX_PAYLOAD: usize = RECV_BUFFER - 1;

/// Mask XORed over the four public-IP bytes of a relay advert. Defeats
/// naive middlebox matching on literal address bytes inside the payload;
/// it is not a security measure.
const ADVERT_IP_MASK: u8 = 0xCC;

/// Size of one advert peer record: port(2) ‖ IPv4(4).
const ADVERT_RECORD: usize = 6;

/// Builds the client announcement: the remote endpoint the client wants
/// to reach.
pub fn client_announce(remote: Endpoint) -> [u8; 6] {
    let mut frame = [0u8; 6];
    frame[..2].copy_from_slice(&remote.port().to_be_bytes());
    frame[2..].copy_from_slice(&remote.ip().octets());
    frame
}

/// Builds the server announcement: the local application port.
pub fn server_announce(app_port: u16) -> [u8; 2] {
    app_port.to_be_bytes()
}

/// Parses the relay's reply to a client announcement: the peer's external
/// port. Any other length is a protocol error and yields `None`.
pub fn parse_port_reply(frame: &[u8]) -> Option<u16> {
    match frame {
        [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// A decoded relay advert: this host's public IPv4 plus the peers
/// currently asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advert {
    pub public_ip: Ipv4Addr,
    pub peers: Vec<Endpoint>,
}

/// Parses a relay advert: four masked public-IP bytes followed by zero or
/// more peer records. Yields `None` unless the length is at least 4 and
/// congruent to 4 modulo 6.
pub fn parse_advert(frame: &[u8]) -> Option<Advert> {
    if frame.len() < 4 || (frame.len() - 4) % ADVERT_RECORD != 0 {
        return None;
    }

    let mut ip = [0u8; 4];
    for (masked, out) in frame[..4].iter().zip(ip.iter_mut()) {
        *out = masked ^ ADVERT_IP_MASK;
    }

    let peers = frame[4..]
        .chunks_exact(ADVERT_RECORD)
        .map(|record| {
            let port = u16::from_be_bytes([record[0], record[1]]);
            let ip = Ipv4Addr::new(record[2], record[3], record[4], record[5]);
            Endpoint::new(ip, port)
        })
        .collect();

    Some(Advert { public_ip: Ipv4Addr::from(ip), peers })
}
