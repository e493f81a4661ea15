//! Wire message types for the peer session.
//!
//! Every message carries exactly one `type` tag; the payload shape is
//! fixed by that tag. Inbound payloads are checked structurally by
//! [`crate::validate`] before typed decode.

use serde::{Deserialize, Serialize};

/// Top-level wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Exchange a full crew roster before battle. Either direction.
    #[serde(rename = "CREW_SHARE")]
    CrewShare { crew: Crew },
    /// Initialize the guest's battle view. Host to guest.
    #[serde(rename = "START_BATTLE")]
    StartBattle { battle: BattleState },
    /// Request an action be applied by the authority. Guest to host.
    #[serde(rename = "PLAYER_ACTION")]
    PlayerAction { action: PlayerAction },
    /// Push the authoritative battle state. Host to guest.
    #[serde(rename = "BATTLE_UPDATE")]
    BattleUpdate { battle: BattleState },
    /// Liveness probe. Host to guest.
    #[serde(rename = "PING")]
    Ping,
    /// Liveness reply. Guest to host.
    #[serde(rename = "PONG")]
    Pong,
    /// Ask the host for a fresh full snapshot. Guest to host.
    #[serde(rename = "REQUEST_SYNC")]
    RequestSync,
}

impl Message {
    /// Wire tag of this message, as it appears in the `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::CrewShare { .. } => "CREW_SHARE",
            Message::StartBattle { .. } => "START_BATTLE",
            Message::PlayerAction { .. } => "PLAYER_ACTION",
            Message::BattleUpdate { .. } => "BATTLE_UPDATE",
            Message::Ping => "PING",
            Message::Pong => "PONG",
            Message::RequestSync => "REQUEST_SYNC",
        }
    }
}

/// A crew roster as exchanged before battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    pub name: String,
    pub credits: u32,
    pub members: Vec<CrewMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: String,
    pub name: String,
    pub species: Species,
    pub status: FighterStatus,
    pub weapons: Vec<Weapon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub id: String,
    pub name: String,
    pub range: u32,
    pub damage: u32,
}

/// Full battle snapshot. Opaque to the link layer; the sync layer only
/// replaces it wholesale on the follower side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub id: String,
    pub round: u32,
    pub active_fighter: Option<String>,
    pub participants: Vec<Participant>,
    pub over: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub side: Side,
    pub status: FighterStatus,
    pub position: Position,
    pub action_points: u32,
    pub weapons: Vec<Weapon>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// A single fighter action, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PlayerAction {
    #[serde(rename = "MOVE")]
    Move { actor_id: String, to: Position },
    #[serde(rename = "ATTACK")]
    Attack {
        actor_id: String,
        target_id: String,
        weapon_id: String,
    },
    #[serde(rename = "END_TURN")]
    EndTurn { actor_id: String },
}

impl PlayerAction {
    /// The fighter performing this action.
    pub fn actor_id(&self) -> &str {
        match self {
            PlayerAction::Move { actor_id, .. }
            | PlayerAction::Attack { actor_id, .. }
            | PlayerAction::EndTurn { actor_id } => actor_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FighterStatus {
    Ready,
    Down,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Attacker,
    Defender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    Human,
    Ferren,
    Saurian,
    Voidborn,
}
