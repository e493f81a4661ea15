//! Test harness -- event collectors and message fixtures.

use std::time::Duration;

use skirmish_link::{LinkError, PeerAddr, PeerLink};
use skirmish_protocol::{
    BattleState, Crew, CrewMember, FighterStatus, Message, Participant, PlayerAction, Position,
    Side, Species, Weapon,
};
use tokio::sync::mpsc;

/// Generous bound for awaited events; virtual time auto-advances under
/// a paused clock, so this only trips on genuine hangs.
const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed waiting for {what}"))
}

/// Let spawned drivers and pumps drain their queues.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn data_stream(link: &PeerLink) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_data(move |message| {
        let _ = tx.send(message.clone());
    });
    rx
}

pub fn connect_events(link: &PeerLink) -> mpsc::UnboundedReceiver<PeerAddr> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_connect(move |addr| {
        let _ = tx.send(addr.clone());
    });
    rx
}

pub fn disconnect_events(link: &PeerLink) -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_disconnect(move |_| {
        let _ = tx.send(());
    });
    rx
}

pub fn error_events(link: &PeerLink) -> mpsc::UnboundedReceiver<LinkError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_peer_error(move |error| {
        let _ = tx.send(error.clone());
    });
    rx
}

pub fn reconnecting_events(link: &PeerLink) -> mpsc::UnboundedReceiver<u32> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_reconnecting(move |attempt| {
        let _ = tx.send(*attempt);
    });
    rx
}

pub fn sync_request_events(link: &PeerLink) -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = link.on_sync_request(move |_| {
        let _ = tx.send(());
    });
    rx
}

pub fn crew_share() -> Message {
    Message::CrewShare {
        crew: Crew {
            id: "c1".into(),
            name: "Dust Runners".into(),
            credits: 120,
            members: vec![CrewMember {
                id: "m1".into(),
                name: "Vex".into(),
                species: Species::Ferren,
                status: FighterStatus::Ready,
                weapons: vec![Weapon {
                    id: "w1".into(),
                    name: "Scatter pistol".into(),
                    range: 6,
                    damage: 2,
                }],
            }],
        },
    }
}

pub fn sample_battle() -> BattleState {
    BattleState {
        id: "b1".into(),
        round: 1,
        active_fighter: Some("m1".into()),
        participants: vec![Participant {
            id: "m1".into(),
            name: "Vex".into(),
            side: Side::Attacker,
            status: FighterStatus::Ready,
            position: Position { x: 0, y: 0 },
            action_points: 2,
            weapons: Vec::new(),
        }],
        over: false,
    }
}

/// A distinguishable action message, for ordering assertions.
pub fn action_message(i: i32) -> Message {
    Message::PlayerAction {
        action: PlayerAction::Move {
            actor_id: format!("m{i}"),
            to: Position { x: i, y: 0 },
        },
    }
}

pub fn actor_of(message: &Message) -> String {
    match message {
        Message::PlayerAction { action } => action.actor_id().to_string(),
        other => panic!("expected PLAYER_ACTION, got {other:?}"),
    }
}
