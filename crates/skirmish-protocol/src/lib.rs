//! Skirmish Protocol -- wire types, frame codec, message validation,
//! canonical state serialization.
//!
//! One logical channel per two-party session. Frames on the wire are a
//! 4-byte big-endian length prefix followed by serde JSON.

pub mod canonical;
pub mod codec;
pub mod fingerprint;
pub mod messages;
pub mod tls;
pub mod validate;

pub use canonical::{to_canonical_string, CanonicalError};
pub use codec::FrameCodec;
pub use messages::*;

/// Seconds between heartbeat pings (host side).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Seconds of pong silence before the link is declared stale.
pub const PONG_TIMEOUT_SECS: u64 = 15;

/// Seconds between guest-issued full-state sync requests.
pub const RESYNC_INTERVAL_SECS: u64 = 60;

/// Redial attempts before a reconnect sequence is declared failed.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Reconnect backoff base in milliseconds: delay = 2^attempt * base.
pub const RECONNECT_BACKOFF_BASE_MS: u64 = 1_000;

/// Outbound messages admitted per rolling one-second window.
pub const RATE_LIMIT_PER_SEC: usize = 10;

/// Messages retained while disconnected before the oldest is evicted.
pub const OUTBOX_CAPACITY: usize = 50;

/// Serialized payload size that triggers a large-message warning.
pub const LARGE_PAYLOAD_BYTES: usize = 512 * 1024;

/// Maximum frame size accepted on the wire.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// QUIC idle timeout in seconds (must exceed the pong timeout so the
/// application-level watchdog fires first).
pub const QUIC_IDLE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
