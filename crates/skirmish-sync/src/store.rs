//! A minimal in-memory battle store.
//!
//! Enough rules to exercise the sync layer: moves reposition fighters,
//! attacks knock targets down, turn ends rotate the active fighter.
//! Real campaign rules live with the application, not here.

use skirmish_protocol::{BattleState, FighterStatus, PlayerAction};

use crate::strategy::BattleStore;

#[derive(Debug, Default)]
pub struct InMemoryBattleStore {
    battle: Option<BattleState>,
}

impl InMemoryBattleStore {
    pub fn new(battle: Option<BattleState>) -> Self {
        Self { battle }
    }

    pub fn battle(&self) -> Option<&BattleState> {
        self.battle.as_ref()
    }
}

impl BattleStore for InMemoryBattleStore {
    fn apply_action(&mut self, action: &PlayerAction) {
        let Some(battle) = self.battle.as_mut() else {
            tracing::warn!("sync: action before any battle snapshot");
            return;
        };

        match action {
            PlayerAction::Move { actor_id, to } => {
                if let Some(actor) = battle.participants.iter_mut().find(|p| &p.id == actor_id) {
                    actor.position = *to;
                    actor.action_points = actor.action_points.saturating_sub(1);
                }
            }
            PlayerAction::Attack {
                actor_id,
                target_id,
                ..
            } => {
                if let Some(actor) = battle.participants.iter_mut().find(|p| &p.id == actor_id) {
                    actor.action_points = actor.action_points.saturating_sub(1);
                }
                if let Some(target) = battle.participants.iter_mut().find(|p| &p.id == target_id) {
                    target.status = FighterStatus::Down;
                }
            }
            PlayerAction::EndTurn { actor_id } => {
                let ids: Vec<&String> = battle.participants.iter().map(|p| &p.id).collect();
                if let Some(pos) = ids.iter().position(|id| *id == actor_id) {
                    let next = ids[(pos + 1) % ids.len()].clone();
                    if pos + 1 == ids.len() {
                        battle.round += 1;
                    }
                    battle.active_fighter = Some(next);
                }
            }
        }
    }

    fn replace_snapshot(&mut self, battle: BattleState) {
        self.battle = Some(battle);
    }

    fn snapshot(&self) -> Option<BattleState> {
        self.battle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_protocol::{Participant, Position, Side};

    pub(crate) fn two_fighter_battle() -> BattleState {
        let fighter = |id: &str, side| Participant {
            id: id.into(),
            name: id.to_uppercase(),
            side,
            status: FighterStatus::Ready,
            position: Position { x: 0, y: 0 },
            action_points: 2,
            weapons: Vec::new(),
        };
        BattleState {
            id: "b1".into(),
            round: 1,
            active_fighter: Some("m1".into()),
            participants: vec![fighter("m1", Side::Attacker), fighter("m2", Side::Defender)],
            over: false,
        }
    }

    #[test]
    fn test_move_updates_position_and_spends_ap() {
        let mut store = InMemoryBattleStore::new(Some(two_fighter_battle()));
        store.apply_action(&PlayerAction::Move {
            actor_id: "m1".into(),
            to: Position { x: 3, y: 2 },
        });

        let battle = store.battle().unwrap();
        assert_eq!(battle.participants[0].position, Position { x: 3, y: 2 });
        assert_eq!(battle.participants[0].action_points, 1);
    }

    #[test]
    fn test_attack_downs_target() {
        let mut store = InMemoryBattleStore::new(Some(two_fighter_battle()));
        store.apply_action(&PlayerAction::Attack {
            actor_id: "m1".into(),
            target_id: "m2".into(),
            weapon_id: "w1".into(),
        });

        let battle = store.battle().unwrap();
        assert_eq!(battle.participants[1].status, FighterStatus::Down);
    }

    #[test]
    fn test_end_turn_rotates_and_advances_round() {
        let mut store = InMemoryBattleStore::new(Some(two_fighter_battle()));
        store.apply_action(&PlayerAction::EndTurn {
            actor_id: "m1".into(),
        });
        assert_eq!(
            store.battle().unwrap().active_fighter.as_deref(),
            Some("m2")
        );
        assert_eq!(store.battle().unwrap().round, 1);

        store.apply_action(&PlayerAction::EndTurn {
            actor_id: "m2".into(),
        });
        assert_eq!(
            store.battle().unwrap().active_fighter.as_deref(),
            Some("m1")
        );
        assert_eq!(store.battle().unwrap().round, 2);
    }

    #[test]
    fn test_action_without_battle_is_ignored() {
        let mut store = InMemoryBattleStore::default();
        store.apply_action(&PlayerAction::EndTurn {
            actor_id: "m1".into(),
        });
        assert!(store.battle().is_none());
    }
}
