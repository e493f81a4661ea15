//! Link tuning.
//!
//! Every timing and size constant of the link layer is configuration
//! with the protocol default, so deployments can measure real payload
//! sizes and adjust rather than live with hard constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use skirmish_protocol as proto;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Seconds between heartbeat pings (host side).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds of pong silence before the link is declared stale.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    /// Seconds between guest-issued full-state sync requests.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    /// Redial attempts before a reconnect is declared failed.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Backoff base in milliseconds: delay = 2^attempt * base.
    #[serde(default = "default_reconnect_backoff_base_ms")]
    pub reconnect_backoff_base_ms: u64,
    /// Outbound messages admitted per rolling one-second window.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: usize,
    /// Messages buffered while disconnected before eviction.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Serialized payload size that triggers a large-message warning.
    #[serde(default = "default_large_payload_bytes")]
    pub large_payload_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_base_ms: default_reconnect_backoff_base_ms(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            outbox_capacity: default_outbox_capacity(),
            large_payload_bytes: default_large_payload_bytes(),
        }
    }
}

impl LinkConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Exponential backoff delay for the given attempt (attempts start
    /// at 1).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.reconnect_backoff_base_ms.saturating_mul(factor))
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    proto::HEARTBEAT_INTERVAL_SECS
}
fn default_pong_timeout_secs() -> u64 {
    proto::PONG_TIMEOUT_SECS
}
fn default_resync_interval_secs() -> u64 {
    proto::RESYNC_INTERVAL_SECS
}
fn default_max_reconnect_attempts() -> u32 {
    proto::MAX_RECONNECT_ATTEMPTS
}
fn default_reconnect_backoff_base_ms() -> u64 {
    proto::RECONNECT_BACKOFF_BASE_MS
}
fn default_rate_limit_per_sec() -> usize {
    proto::RATE_LIMIT_PER_SEC
}
fn default_outbox_capacity() -> usize {
    proto::OUTBOX_CAPACITY
}
fn default_large_payload_bytes() -> usize {
    proto::LARGE_PAYLOAD_BYTES
}
