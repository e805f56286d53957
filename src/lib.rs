//! # Pinhole - UDP relay-assisted NAT traversal proxy
//!
//! Pinhole gives a peer-to-peer UDP application (typically a game) a
//! direct-looking connection between two players who are both behind NAT.
//! Both sides rendezvous through a small public relay whose only job is to
//! observe each side's public (address, port) and tell the other about it;
//! from then on the engines punch UDP pinholes toward each other and
//! forward application datagrams locally, so the unmodified application
//! just sees a UDP peer on loopback.
//!
//! ## Roles
//!
//! - **Client**: one public socket, one remote peer. The local game
//!   connects to the engine's loopback port (41254 when free) and its
//!   datagrams are tunneled to the host.
//! - **Server**: one public socket, many remote peers. Each peer gets its
//!   own ephemeral loopback socket toward the hosted application, so the
//!   game's server sees every remote player as a distinct loopback source.
//!
//! ## Quick start
//!
//! ```ignore
//! let client = Client::bind(&ClientConfig {
//!     relay: "relay.example.net".into(),
//!     remote_host: "203.0.113.7".into(),
//!     remote_port: 34000,
//! }).await?;
//!
//! let (shutdown, signal) = Shutdown::new();
//! tokio::spawn(client.run(signal));
//! // ... point the game at 127.0.0.1:41254 ...
//! shutdown.trigger();
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `client` | Single-peer engine: discovery gate and forwarding plane |
//! | `server` | Multi-peer engine: peer table, loopback fan-out, idle sweep |
//! | `rendezvous` | Announce, punch, and keepalive cadence loops |
//! | `wire` | Relay protocol codec and data-plane tag framing |
//! | `endpoint` | IPv4 endpoint keys and source classification |
//! | `net` | Socket abstraction, resolution, shutdown plumbing |
//!
//! ## Security model
//!
//! There is none, deliberately: the protocol is cleartext and any source
//! matching the expected relay or peer endpoint is trusted. That is
//! acceptable for the game-helper threat model this crate targets and
//! must be re-evaluated before reusing the engine elsewhere.

mod client;
mod endpoint;
mod net;
mod rendezvous;
mod server;
pub mod wire;

pub use client::{Client, ClientConfig, DEFAULT_CLIENT_PORT};
pub use endpoint::Endpoint;
pub use net::{Netstack, PacketConn, Shutdown, ShutdownSignal, SystemNet, DEFAULT_RELAY_PORT};
pub use rendezvous::{ANNOUNCE_INTERVAL, MAPPING_TIMEOUT};
pub use server::{Server, ServerConfig, PEER_IDLE_TIMEOUT};
