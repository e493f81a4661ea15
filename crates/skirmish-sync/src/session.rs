//! SyncSession -- sans-IO orchestration facade, plus the task that
//! glues it to a [`PeerLink`].
//!
//! The facade mutates the store and returns effects; the task executes
//! them (sends over the link, forwards notices to the application) and
//! drives the debounce deadline.

use skirmish_link::{PeerLink, Role};
use skirmish_protocol::{fingerprint, BattleState, Crew, Message, PlayerAction};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::strategy::{
    Authoritative, BattleStore, Follower, LocalOnly, SyncConfig, SyncEffect, SyncNotice,
    SyncStrategy,
};

/// Orchestrates one battle session over one link role.
pub struct SyncSession<S: BattleStore> {
    store: S,
    strategy: Box<dyn SyncStrategy>,
}

impl<S: BattleStore> SyncSession<S> {
    /// Select the role strategy once for the whole session. `None`
    /// means solo play: no network involvement at all.
    pub fn new(role: Option<Role>, store: S, config: SyncConfig) -> Self {
        let strategy: Box<dyn SyncStrategy> = match role {
            Some(Role::Host) => Box::new(Authoritative::new(&config)),
            Some(Role::Guest) => Box::new(Follower::new()),
            None => Box::new(LocalOnly),
        };
        Self { store, strategy }
    }

    /// A locally-originated fighter action.
    pub fn submit_action(&mut self, action: PlayerAction, now: Instant) -> Vec<SyncEffect> {
        self.strategy.handle_local_action(action, &mut self.store, now)
    }

    /// A battle-state mutation outside the action path.
    pub fn notify_mutation(&mut self, now: Instant) -> Vec<SyncEffect> {
        self.strategy.handle_local_mutation(now)
    }

    /// Begin a battle with the given initial state.
    pub fn start_battle(&mut self, battle: BattleState) -> Vec<SyncEffect> {
        self.strategy.handle_start_battle(battle, &mut self.store)
    }

    /// Share a crew roster with the peer. Either side may do this.
    pub fn share_crew(&mut self, crew: Crew) -> Vec<SyncEffect> {
        vec![SyncEffect::Send(Message::CrewShare { crew })]
    }

    /// A validated message from the peer.
    pub fn handle_message(&mut self, message: Message, now: Instant) -> Vec<SyncEffect> {
        self.strategy.handle_inbound(message, &mut self.store, now)
    }

    /// The peer asked for a fresh authoritative snapshot.
    pub fn handle_sync_request(&mut self) -> Vec<SyncEffect> {
        self.strategy.handle_sync_request(&mut self.store)
    }

    /// Deadline of the next scheduled broadcast, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.strategy.next_deadline()
    }

    /// Fire a due broadcast. The snapshot is taken now, so the latest
    /// mutation wins.
    pub fn fire_deadline(&mut self, now: Instant) -> Vec<SyncEffect> {
        self.strategy.fire_deadline(now, &mut self.store)
    }

    /// Fighters with an action awaiting host confirmation.
    pub fn pending_actors(&self) -> Vec<String> {
        self.strategy.pending_actors()
    }

    /// Fingerprint of the current snapshot, for divergence checks.
    pub fn state_fingerprint(&self) -> Option<String> {
        self.store.snapshot().and_then(|b| fingerprint::of(&b).ok())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

// ============================================================================
// Task glue
// ============================================================================

#[derive(Debug)]
pub enum SyncCommand {
    SubmitAction(PlayerAction),
    StartBattle(BattleState),
    ShareCrew(Crew),
    NotifyMutation,
    Shutdown,
}

/// Handle to a running sync task.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    pub async fn submit_action(&self, action: PlayerAction) {
        let _ = self.cmd_tx.send(SyncCommand::SubmitAction(action)).await;
    }

    pub async fn start_battle(&self, battle: BattleState) {
        let _ = self.cmd_tx.send(SyncCommand::StartBattle(battle)).await;
    }

    pub async fn share_crew(&self, crew: Crew) {
        let _ = self.cmd_tx.send(SyncCommand::ShareCrew(crew)).await;
    }

    pub async fn notify_mutation(&self) {
        let _ = self.cmd_tx.send(SyncCommand::NotifyMutation).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Shutdown).await;
    }
}

/// Run a [`SyncSession`] against a link. Inbound messages and sync
/// requests arrive via the link subscriptions; notices stream back to
/// the application.
pub fn spawn_sync_task<S: BattleStore + 'static>(
    mut session: SyncSession<S>,
    link: PeerLink,
) -> (SyncHandle, mpsc::UnboundedReceiver<SyncNotice>) {
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let forward = msg_tx.clone();
    // Dropping the Subscription keeps the callback registered for the
    // life of the link.
    let _data_sub = link.on_data(move |message| {
        let _ = forward.send(message.clone());
    });

    let (syncreq_tx, mut syncreq_rx) = mpsc::unbounded_channel();
    let _sync_sub = link.on_sync_request(move |_| {
        let _ = syncreq_tx.send(());
    });

    let (cmd_tx, mut cmd_rx) = mpsc::channel(32);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let deadline = session.next_deadline();
            let sleep_until =
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let effects = tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(SyncCommand::Shutdown) => break,
                    Some(SyncCommand::SubmitAction(action)) => {
                        session.submit_action(action, Instant::now())
                    }
                    Some(SyncCommand::StartBattle(battle)) => session.start_battle(battle),
                    Some(SyncCommand::ShareCrew(crew)) => session.share_crew(crew),
                    Some(SyncCommand::NotifyMutation) => session.notify_mutation(Instant::now()),
                },
                message = msg_rx.recv() => match message {
                    None => break,
                    Some(message) => session.handle_message(message, Instant::now()),
                },
                request = syncreq_rx.recv() => match request {
                    None => break,
                    Some(()) => session.handle_sync_request(),
                },
                _ = tokio::time::sleep_until(sleep_until) => {
                    session.fire_deadline(Instant::now())
                },
            };

            for effect in effects {
                match effect {
                    SyncEffect::Send(message) => link.send(message).await,
                    SyncEffect::Notice(notice) => {
                        let _ = notice_tx.send(notice);
                    }
                }
            }
        }
        tracing::debug!("sync: task stopped");
    });

    (SyncHandle { cmd_tx }, notice_rx)
}
