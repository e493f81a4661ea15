//! Role strategies.
//!
//! All role-conditional behavior lives behind one interface with three
//! variants, selected once at session start: `Authoritative` (host),
//! `Follower` (guest), `LocalOnly` (solo play). Strategies are sans-IO:
//! they mutate the store and return effects for the caller to execute.

use std::collections::HashSet;
use std::time::Duration;

use skirmish_protocol::{fingerprint, BattleState, Crew, Message, PlayerAction};
use tokio::time::Instant;

use crate::debounce::BroadcastDebounce;

/// Tuning for the sync layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Debounce window for authoritative state broadcasts.
    pub broadcast_debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broadcast_debounce: Duration::from_millis(100),
        }
    }
}

/// The application's battle state, as seen by the sync layer: an
/// opaque snapshot that actions mutate and inbound snapshots replace.
pub trait BattleStore: Send {
    fn apply_action(&mut self, action: &PlayerAction);
    fn replace_snapshot(&mut self, battle: BattleState);
    fn snapshot(&self) -> Option<BattleState>;
}

/// Something the caller must do: put a message on the wire, or tell the
/// application what happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    Send(Message),
    Notice(SyncNotice),
}

/// Application-facing outcomes of sync processing.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// The peer shared a crew roster.
    CrewReceived(Crew),
    /// A battle snapshot arrived and replaced local state.
    BattleStarted,
    /// The authoritative snapshot was applied locally.
    SnapshotApplied { fingerprint: String },
    /// A local action was applied to the canonical state.
    ActionApplied,
    /// A local action is waiting for host confirmation.
    ActionPending { actor_id: String },
}

pub(crate) trait SyncStrategy: Send {
    fn handle_local_action(
        &mut self,
        action: PlayerAction,
        store: &mut dyn BattleStore,
        now: Instant,
    ) -> Vec<SyncEffect>;

    /// A battle-state mutation outside the action path.
    fn handle_local_mutation(&mut self, now: Instant) -> Vec<SyncEffect>;

    fn handle_start_battle(
        &mut self,
        battle: BattleState,
        store: &mut dyn BattleStore,
    ) -> Vec<SyncEffect>;

    fn handle_inbound(
        &mut self,
        message: Message,
        store: &mut dyn BattleStore,
        now: Instant,
    ) -> Vec<SyncEffect>;

    /// The peer asked for a fresh authoritative snapshot.
    fn handle_sync_request(&mut self, store: &mut dyn BattleStore) -> Vec<SyncEffect>;

    fn next_deadline(&self) -> Option<Instant>;

    fn fire_deadline(&mut self, now: Instant, store: &mut dyn BattleStore) -> Vec<SyncEffect>;

    fn pending_actors(&self) -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// Authoritative (host)
// ============================================================================

/// The single writer of ground truth. Local actions apply immediately;
/// every mutation schedules a debounced `BATTLE_UPDATE` carrying the
/// snapshot as of fire time.
pub(crate) struct Authoritative {
    debounce: BroadcastDebounce,
}

impl Authoritative {
    pub(crate) fn new(config: &SyncConfig) -> Self {
        Self {
            debounce: BroadcastDebounce::new(config.broadcast_debounce),
        }
    }

    fn snapshot_update(store: &mut dyn BattleStore) -> Option<Message> {
        store
            .snapshot()
            .map(|battle| Message::BattleUpdate { battle })
    }
}

impl SyncStrategy for Authoritative {
    fn handle_local_action(
        &mut self,
        action: PlayerAction,
        store: &mut dyn BattleStore,
        now: Instant,
    ) -> Vec<SyncEffect> {
        store.apply_action(&action);
        self.debounce.touch(now);
        vec![SyncEffect::Notice(SyncNotice::ActionApplied)]
    }

    fn handle_local_mutation(&mut self, now: Instant) -> Vec<SyncEffect> {
        self.debounce.touch(now);
        Vec::new()
    }

    fn handle_start_battle(
        &mut self,
        battle: BattleState,
        store: &mut dyn BattleStore,
    ) -> Vec<SyncEffect> {
        store.replace_snapshot(battle.clone());
        self.debounce.cancel();
        vec![
            SyncEffect::Send(Message::StartBattle { battle }),
            SyncEffect::Notice(SyncNotice::BattleStarted),
        ]
    }

    fn handle_inbound(
        &mut self,
        message: Message,
        store: &mut dyn BattleStore,
        now: Instant,
    ) -> Vec<SyncEffect> {
        match message {
            Message::PlayerAction { action } => {
                tracing::debug!(actor = action.actor_id(), "sync: applying peer action");
                self.handle_local_action(action, store, now)
            }
            Message::CrewShare { crew } => {
                vec![SyncEffect::Notice(SyncNotice::CrewReceived(crew))]
            }
            Message::StartBattle { .. } | Message::BattleUpdate { .. } => {
                // One writer of ground truth: a snapshot from the
                // follower is never applied.
                tracing::warn!("sync: ignoring snapshot from non-authoritative peer");
                Vec::new()
            }
            Message::Ping | Message::Pong | Message::RequestSync => Vec::new(),
        }
    }

    fn handle_sync_request(&mut self, store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        match Self::snapshot_update(store) {
            Some(update) => vec![SyncEffect::Send(update)],
            None => Vec::new(),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    fn fire_deadline(&mut self, now: Instant, store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        if !self.debounce.fire(now) {
            return Vec::new();
        }
        match Self::snapshot_update(store) {
            Some(update) => vec![SyncEffect::Send(update)],
            None => Vec::new(),
        }
    }
}

// ============================================================================
// Follower (guest)
// ============================================================================

/// Never writes ground truth. Local actions are marked pending for the
/// acting fighter and forwarded; snapshots from the host replace local
/// state and clear the pending markers.
pub(crate) struct Follower {
    pending: HashSet<String>,
}

impl Follower {
    pub(crate) fn new() -> Self {
        Self {
            pending: HashSet::new(),
        }
    }

    fn apply_snapshot(
        &mut self,
        battle: BattleState,
        store: &mut dyn BattleStore,
        started: bool,
    ) -> Vec<SyncEffect> {
        let print = fingerprint::of(&battle).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "sync: snapshot fingerprint unavailable");
            String::new()
        });
        tracing::debug!(fingerprint = %print, "sync: snapshot applied");

        store.replace_snapshot(battle);
        self.pending.clear();

        let notice = if started {
            SyncNotice::BattleStarted
        } else {
            SyncNotice::SnapshotApplied { fingerprint: print }
        };
        vec![SyncEffect::Notice(notice)]
    }
}

impl SyncStrategy for Follower {
    fn handle_local_action(
        &mut self,
        action: PlayerAction,
        _store: &mut dyn BattleStore,
        _now: Instant,
    ) -> Vec<SyncEffect> {
        let actor_id = action.actor_id().to_string();
        self.pending.insert(actor_id.clone());
        vec![
            SyncEffect::Send(Message::PlayerAction { action }),
            SyncEffect::Notice(SyncNotice::ActionPending { actor_id }),
        ]
    }

    fn handle_local_mutation(&mut self, _now: Instant) -> Vec<SyncEffect> {
        tracing::warn!("sync: follower ignoring local state mutation");
        Vec::new()
    }

    fn handle_start_battle(
        &mut self,
        _battle: BattleState,
        _store: &mut dyn BattleStore,
    ) -> Vec<SyncEffect> {
        tracing::warn!("sync: follower cannot start a battle");
        Vec::new()
    }

    fn handle_inbound(
        &mut self,
        message: Message,
        store: &mut dyn BattleStore,
        _now: Instant,
    ) -> Vec<SyncEffect> {
        match message {
            Message::BattleUpdate { battle } => self.apply_snapshot(battle, store, false),
            Message::StartBattle { battle } => self.apply_snapshot(battle, store, true),
            Message::CrewShare { crew } => {
                vec![SyncEffect::Notice(SyncNotice::CrewReceived(crew))]
            }
            Message::PlayerAction { .. } => {
                tracing::warn!("sync: follower ignoring peer action");
                Vec::new()
            }
            Message::Ping | Message::Pong | Message::RequestSync => Vec::new(),
        }
    }

    fn handle_sync_request(&mut self, _store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        Vec::new()
    }

    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn fire_deadline(&mut self, _now: Instant, _store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        Vec::new()
    }

    fn pending_actors(&self) -> Vec<String> {
        let mut actors: Vec<String> = self.pending.iter().cloned().collect();
        actors.sort_unstable();
        actors
    }
}

// ============================================================================
// LocalOnly (solo)
// ============================================================================

/// No multiplayer session: actions apply immediately, nothing touches
/// the network.
pub(crate) struct LocalOnly;

impl SyncStrategy for LocalOnly {
    fn handle_local_action(
        &mut self,
        action: PlayerAction,
        store: &mut dyn BattleStore,
        _now: Instant,
    ) -> Vec<SyncEffect> {
        store.apply_action(&action);
        vec![SyncEffect::Notice(SyncNotice::ActionApplied)]
    }

    fn handle_local_mutation(&mut self, _now: Instant) -> Vec<SyncEffect> {
        Vec::new()
    }

    fn handle_start_battle(
        &mut self,
        battle: BattleState,
        store: &mut dyn BattleStore,
    ) -> Vec<SyncEffect> {
        store.replace_snapshot(battle);
        vec![SyncEffect::Notice(SyncNotice::BattleStarted)]
    }

    fn handle_inbound(
        &mut self,
        _message: Message,
        _store: &mut dyn BattleStore,
        _now: Instant,
    ) -> Vec<SyncEffect> {
        Vec::new()
    }

    fn handle_sync_request(&mut self, _store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        Vec::new()
    }

    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn fire_deadline(&mut self, _now: Instant, _store: &mut dyn BattleStore) -> Vec<SyncEffect> {
        Vec::new()
    }
}
