//! Skirmish Link -- resilient peer connection management.
//!
//! A [`PeerLink`] owns the transport lifecycle for one two-party
//! session: address acquisition, host/guest establishment, heartbeat,
//! automatic reconnect with exponential backoff, offline buffering, and
//! outbound rate limiting. All mutable state lives in a single driver
//! task, so subscriber callbacks and timer bodies execute serially.

pub mod config;
pub mod listeners;
pub mod memory;
pub mod outbox;
pub mod quic;
pub mod session;
pub mod transport;

pub use config::LinkConfig;
pub use listeners::Subscription;
pub use memory::{FlakyTransport, MemoryNet, MemoryTransport};
pub use quic::QuicTransport;
pub use session::{PeerLink, Role};
pub use transport::{ConnEvent, Endpoint, LinkError, PeerAddr, PeerConn, Transport};
