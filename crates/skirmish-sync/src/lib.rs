//! Skirmish Sync -- decides, per role, how locally-originated actions
//! and state mutations propagate across the peer link.
//!
//! The role strategy is selected once at session start: the host is
//! the single writer of ground truth and broadcasts debounced
//! snapshots; the guest forwards actions and follows; a solo session
//! applies everything locally with no network involvement.

pub mod debounce;
pub mod session;
pub mod store;
pub mod strategy;

pub use debounce::BroadcastDebounce;
pub use session::{spawn_sync_task, SyncCommand, SyncHandle, SyncSession};
pub use store::InMemoryBattleStore;
pub use strategy::{BattleStore, SyncConfig, SyncEffect, SyncNotice};
