//! `get-value` / `set-value` over user and room data.
//!
//! Keys use dot notation rooted at `user.`, `room.` or `users.<id>.`.
//! `room.passphrase` and `room.relay` are room settings rather than data and
//! are only visible to room admins.

use lobby_core::utils::{get_path, set_path};
use lobby_core::{RoomId, UserId, is_valid_name};
use lobby_rpc::RpcError;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::lobby::{Caller, EventSource, Lobby};
use crate::rpc::handlers::{caller_room, caller_user};
use crate::rpc::validation::{param, require_str};

const PASSPHRASE_KEY: &str = "room.passphrase";
const RELAY_KEY: &str = "room.relay";
const USERS_PREFIX: &str = "users.";
const NAME_KEY: &str = "name";

fn same_room_target(lobby: &Lobby, caller: &Caller, rest: &str) -> Result<Option<(UserId, String)>, RpcError> {
    let (key, path) = rest.split_once('.').unwrap_or((rest, ""));
    let Some(target) = lobby.find_user(key) else {
        return Ok(None);
    };
    if !caller.is_server() && target.room().cloned() != caller_room(lobby, caller) {
        return Err(RpcError::application(
            "You can only grab user information from the same room",
        ));
    }
    Ok(Some((target.id().clone(), path.to_owned())))
}

fn is_admin(lobby: &Lobby, caller: &Caller, room: &RoomId) -> bool {
    caller.is_server() || lobby.is_room_admin(room, caller.user_id())
}

/// Read a value by dot-notation key.
#[instrument(skip_all, fields(method = "get-value"))]
pub fn get_value(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let key = require_str(params, 0, "A key must be provided")?;
    let room = caller_room(lobby, caller);

    if let Some(room_id) = &room {
        if key == PASSPHRASE_KEY || key == RELAY_KEY {
            if !is_admin(lobby, caller, room_id) {
                return Ok(Value::Null);
            }
            let Some(room) = lobby.room(room_id) else {
                return Ok(Value::Null);
            };
            return Ok(if key == PASSPHRASE_KEY {
                json!(room.passphrase)
            } else {
                json!(room.relay())
            });
        }
    }

    if let Some(rest) = key.strip_prefix(USERS_PREFIX) {
        let Some((target, path)) = same_room_target(lobby, caller, rest)? else {
            return Ok(Value::Null);
        };
        let data = lobby.user(&target).map(|u| u.data().clone()).unwrap_or_default();
        if path.is_empty() {
            return Ok(data);
        }
        return Ok(get_path(&data, &path).cloned().unwrap_or(Value::Null));
    }

    let user = caller_user(lobby, caller)?;
    let scope = json!({
        "user": user.data(),
        "room": room.as_ref().and_then(|id| lobby.room(id)).map_or_else(|| json!({}), |r| r.data().clone()),
    });
    Ok(get_path(&scope, key).cloned().unwrap_or(Value::Null))
}

/// `name` must stay a valid string; nothing may be written beneath it.
fn check_name(path: &str, value: &Value) -> Result<(), RpcError> {
    let under_name = path == NAME_KEY || path.strip_prefix(NAME_KEY).is_some_and(|rest| rest.starts_with('.'));
    if under_name && !(path == NAME_KEY && value.as_str().is_some_and(is_valid_name)) {
        return Err(RpcError::invalid_params(
            "Names may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// Write a value by dot-notation key.
#[instrument(skip_all, fields(method = "set-value"))]
pub fn set_value(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let key = require_str(params, 0, "A key must be provided")?.to_owned();
    let value = param(params, 1).cloned().unwrap_or(Value::Null);
    let room = caller_room(lobby, caller);

    if let Some(room_id) = &room {
        if key == PASSPHRASE_KEY || key == RELAY_KEY {
            if !is_admin(lobby, caller, room_id) {
                debug!(key = %key, "room setting change ignored for non-admin");
                return Ok(Value::Null);
            }
            if let Some(room) = lobby.room_mut(room_id) {
                if key == PASSPHRASE_KEY {
                    room.passphrase = value.as_str().filter(|p| !p.is_empty()).map(str::to_owned);
                } else {
                    room.relay = value.as_bool().unwrap_or(false);
                }
            }
            return Ok(Value::Null);
        }
    }

    if let Some(rest) = key.strip_prefix(USERS_PREFIX) {
        let Some((target, path)) = same_room_target(lobby, caller, rest)? else {
            return Ok(Value::Null);
        };
        if path.is_empty() {
            return Err(RpcError::invalid_params("A key must be provided"));
        }
        check_name(&path, &value)?;
        if let Some(user) = lobby.user_mut(&target) {
            let _ = set_path(&mut user.data, &path, value);
        }
        return Ok(Value::Null);
    }

    match key.split_once('.') {
        Some(("room", path)) => {
            let Some(room_id) = room else {
                return Err(RpcError::application("You're not in a room!"));
            };
            if !is_admin(lobby, caller, &room_id) {
                return Err(RpcError::application(
                    "You must be an admin to set a room property!",
                ));
            }
            check_name(path, &value)?;
            if let Some(room) = lobby.room_mut(&room_id) {
                let _ = set_path(&mut room.data, path, value);
            }
            lobby.emit(
                EventSource::User(caller.user_id().clone()),
                "room-change",
                json!({ "key": key }),
            );
        }
        Some(("user", path)) => {
            check_name(path, &value)?;
            if let Some(user) = lobby.entity_mut(caller) {
                let _ = set_path(&mut user.data, path, value);
            }
            if let Caller::User(id) = caller {
                lobby.emit(EventSource::User(id.clone()), "user-change", json!({ "key": key }));
            }
        }
        _ => debug!(key = %key, "set-value key outside user and room scope ignored"),
    }
    Ok(Value::Null)
}
