//! Structural validation of inbound payloads.
//!
//! The trust boundary for everything that arrives over the wire: a raw
//! frame must pass [`is_valid_message`] before it is decoded into typed
//! messages and handed to the application. Checks recurse into every
//! composite field -- crews into members into weapons, battles into
//! participants into positions. Pure predicates, no side effects; the
//! caller decides how to report rejects.

use serde_json::{Map, Value};

const FIGHTER_STATUSES: &[&str] = &["READY", "DOWN", "OUT"];
const SIDES: &[&str] = &["ATTACKER", "DEFENDER"];
const SPECIES: &[&str] = &["HUMAN", "FERREN", "SAURIAN", "VOIDBORN"];

/// Validate a raw inbound frame against the wire schema.
///
/// Returns `false` for an unrecognized `type` tag, a missing or
/// mistyped field, an unexpected extra field, or a non-enumerated enum
/// value anywhere in the payload.
pub fn is_valid_message(raw: &Value) -> bool {
    let Some(obj) = raw.as_object() else {
        return false;
    };
    let Some(tag) = obj.get("type").and_then(Value::as_str) else {
        return false;
    };

    match tag {
        "CREW_SHARE" => has_exact_keys(obj, &["type", "crew"]) && is_valid_crew(&obj["crew"]),
        "START_BATTLE" | "BATTLE_UPDATE" => {
            has_exact_keys(obj, &["type", "battle"]) && is_valid_battle(&obj["battle"])
        }
        "PLAYER_ACTION" => {
            has_exact_keys(obj, &["type", "action"]) && is_valid_action(&obj["action"])
        }
        "PING" | "PONG" | "REQUEST_SYNC" => has_exact_keys(obj, &["type"]),
        _ => false,
    }
}

fn has_exact_keys(obj: &Map<String, Value>, keys: &[&str]) -> bool {
    obj.len() == keys.len() && keys.iter().all(|k| obj.contains_key(*k))
}

fn is_str(value: &Value) -> bool {
    value.is_string()
}

fn is_u32(value: &Value) -> bool {
    value.as_u64().is_some_and(|n| n <= u64::from(u32::MAX))
}

fn is_i32(value: &Value) -> bool {
    value
        .as_i64()
        .is_some_and(|n| n >= i64::from(i32::MIN) && n <= i64::from(i32::MAX))
}

fn is_enum(value: &Value, variants: &[&str]) -> bool {
    value.as_str().is_some_and(|s| variants.contains(&s))
}

fn is_array_of(value: &Value, element: impl Fn(&Value) -> bool) -> bool {
    value.as_array().is_some_and(|items| items.iter().all(element))
}

fn is_valid_crew(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(obj, &["id", "name", "credits", "members"])
        && is_str(&obj["id"])
        && is_str(&obj["name"])
        && is_u32(&obj["credits"])
        && is_array_of(&obj["members"], is_valid_crew_member)
}

fn is_valid_crew_member(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(obj, &["id", "name", "species", "status", "weapons"])
        && is_str(&obj["id"])
        && is_str(&obj["name"])
        && is_enum(&obj["species"], SPECIES)
        && is_enum(&obj["status"], FIGHTER_STATUSES)
        && is_array_of(&obj["weapons"], is_valid_weapon)
}

fn is_valid_weapon(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(obj, &["id", "name", "range", "damage"])
        && is_str(&obj["id"])
        && is_str(&obj["name"])
        && is_u32(&obj["range"])
        && is_u32(&obj["damage"])
}

fn is_valid_battle(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(
        obj,
        &["id", "round", "active_fighter", "participants", "over"],
    ) && is_str(&obj["id"])
        && is_u32(&obj["round"])
        && (obj["active_fighter"].is_null() || is_str(&obj["active_fighter"]))
        && is_array_of(&obj["participants"], is_valid_participant)
        && obj["over"].is_boolean()
}

fn is_valid_participant(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(
        obj,
        &[
            "id",
            "name",
            "side",
            "status",
            "position",
            "action_points",
            "weapons",
        ],
    ) && is_str(&obj["id"])
        && is_str(&obj["name"])
        && is_enum(&obj["side"], SIDES)
        && is_enum(&obj["status"], FIGHTER_STATUSES)
        && is_valid_position(&obj["position"])
        && is_u32(&obj["action_points"])
        && is_array_of(&obj["weapons"], is_valid_weapon)
}

fn is_valid_position(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    has_exact_keys(obj, &["x", "y"]) && is_i32(&obj["x"]) && is_i32(&obj["y"])
}

fn is_valid_action(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let Some(kind) = obj.get("kind").and_then(Value::as_str) else {
        return false;
    };

    match kind {
        "MOVE" => {
            has_exact_keys(obj, &["kind", "actor_id", "to"])
                && is_str(&obj["actor_id"])
                && is_valid_position(&obj["to"])
        }
        "ATTACK" => {
            has_exact_keys(obj, &["kind", "actor_id", "target_id", "weapon_id"])
                && is_str(&obj["actor_id"])
                && is_str(&obj["target_id"])
                && is_str(&obj["weapon_id"])
        }
        "END_TURN" => has_exact_keys(obj, &["kind", "actor_id"]) && is_str(&obj["actor_id"]),
        _ => false,
    }
}
