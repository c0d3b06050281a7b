//! Room lifecycle and moderation handlers.

use lobby_core::{RoomId, UserId};
use lobby_rpc::RpcError;
use serde_json::{Value, json};
use tracing::instrument;

use crate::lobby::{Caller, Lobby, Referer};
use crate::rpc::handlers::{caller_room, caller_user, find_target, is_lobby_moderator_plus, room_of};
use crate::rpc::validation::{opt_bool, opt_str};

const DEFAULT_KICK_REASON: &str = "Unacceptable behaviour (default)";
const USER_ACTION: &str = "user-action";

fn require_room(lobby: &Lobby, caller: &Caller) -> Result<RoomId, RpcError> {
    caller_room(lobby, caller).ok_or_else(|| RpcError::application("You're not in a room!"))
}

/// Room the caller acts on with respect to `target`. The server entity acts
/// in the target's room.
fn acting_room(lobby: &Lobby, caller: &Caller, target: &UserId) -> Result<RoomId, RpcError> {
    if caller.is_server() {
        room_of(lobby, target).ok_or_else(|| RpcError::application("You're not in a room!"))
    } else {
        require_room(lobby, caller)
    }
}

/// Actor for room admin changes: the caller, or the owner on behalf of the
/// server entity.
fn acting_admin(lobby: &Lobby, caller: &Caller, room: &RoomId) -> UserId {
    match caller {
        Caller::User(id) => id.clone(),
        Caller::Server(_) => lobby
            .room(room)
            .and_then(|r| r.owner().cloned())
            .unwrap_or_else(|| caller.user_id().clone()),
    }
}

fn room_item(lobby: &Lobby, id: &RoomId) -> Value {
    lobby.room(id).map_or(Value::Null, |r| r.item())
}

/// Transfer ownership of the caller's room.
#[instrument(skip_all, fields(method = "set-owner"))]
pub fn set_owner(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = find_target(lobby, opt_str(params, 0))?;
    let room = room_of(lobby, &target);
    if !caller.is_server() && room != caller_room(lobby, caller) {
        return Err(RpcError::application("The target user must be in the same room"));
    }
    let Some(room) = room.filter(|id| caller.is_server() || lobby.is_room_admin(id, caller.user_id())) else {
        return Err(RpcError::application("You don't have permission to set the room owner"));
    };
    lobby.set_owner(&room, &target)?;
    Ok(Value::Null)
}

/// Grant `room.admin`.
#[instrument(skip_all, fields(method = "set-admin"))]
pub fn set_admin(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = find_target(lobby, opt_str(params, 0))?;
    let room = acting_room(lobby, caller, &target)?;
    let actor = acting_admin(lobby, caller, &room);
    lobby.set_room_admin(&room, &actor, &target)?;
    Ok(Value::Null)
}

/// Revoke `room.admin`.
#[instrument(skip_all, fields(method = "unset-admin"))]
pub fn unset_admin(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = find_target(lobby, opt_str(params, 0))?;
    let room = acting_room(lobby, caller, &target)?;
    let actor = acting_admin(lobby, caller, &room);
    lobby.unset_room_admin(&room, &actor, &target)?;
    Ok(Value::Null)
}

/// Kick from the shared room, or from the server when both are outside it.
#[instrument(skip_all, fields(method = "kick"))]
pub fn kick(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let Some(target) = opt_str(params, 0).and_then(|key| lobby.find_user(key)) else {
        return Err(RpcError::application("Cannot kick invalid user"));
    };
    let target_id = target.id().clone();
    let target_room = target.room().cloned();
    let reason = opt_str(params, 1).unwrap_or(DEFAULT_KICK_REASON);

    let room = if caller.is_server() {
        target_room
    } else {
        target_room.filter(|id| caller_room(lobby, caller).as_ref() == Some(id))
    };
    let permitted = caller.is_server()
        || match &room {
            Some(room) => lobby.is_room_moderator_plus(room, caller.user_id()),
            None => lobby.entity(caller).is_some_and(is_lobby_moderator_plus),
        };
    if !permitted {
        return Err(RpcError::application(
            "You do not have permission to perform this action",
        ));
    }

    match room {
        Some(room) => lobby.kick_from_room(&room, &target_id, reason)?,
        None => lobby.kick_user(&target_id, reason)?,
    }
    Ok(Value::Null)
}

/// Items of the caller's room members, or of users outside rooms.
#[instrument(skip_all, fields(method = "list-users"))]
pub fn list_users(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    let room = caller_room(lobby, caller);
    Ok(json!(lobby.user_list(room.as_ref())))
}

/// Create a room and join it as owner.
#[instrument(skip_all, fields(method = "create-room"))]
pub fn create_room(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let owner = caller_user(lobby, caller)?;
    if owner.room().is_some() {
        return Err(RpcError::application("Already in a room!"));
    }
    let owner = owner.id().clone();
    let name = opt_str(params, 0);
    if name.is_some_and(|name| lobby.find_room(name).is_some()) {
        return Err(RpcError::application("Room already exists"));
    }
    let visible = opt_bool(params, 1, true);
    let passphrase = opt_str(params, 2).map(str::to_owned);

    let id = lobby.create_room(&owner, name, visible, passphrase)?;
    Ok(room_item(lobby, &id))
}

/// Visible rooms, or `null` from inside a room.
#[instrument(skip_all, fields(method = "list-rooms"))]
pub fn list_rooms(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    if caller_room(lobby, caller).is_some() {
        return Ok(Value::Null);
    }
    Ok(json!(lobby.room_list()))
}

/// Whether a room exists by id or name.
#[instrument(skip_all, fields(method = "check-room"))]
pub fn check_room(lobby: &mut Lobby, _caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let exists = opt_str(params, 0).is_some_and(|key| lobby.find_room(key).is_some());
    Ok(json!(exists))
}

/// Join a room by id or name.
#[instrument(skip_all, fields(method = "join-room"))]
pub fn join_room(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let user = caller_user(lobby, caller)?;
    if user.room().is_some() {
        return Err(RpcError::application("You're already in a room"));
    }
    let user = user.id().clone();
    let Some(room) = opt_str(params, 0).and_then(|key| lobby.find_room(key)) else {
        return Err(RpcError::application("Room doesn't exist"));
    };
    let room = room.id().clone();

    lobby.join_room(&room, &user, opt_str(params, 1))?;
    Ok(room_item(lobby, &room))
}

/// Leave the caller's room peacefully.
#[instrument(skip_all, fields(method = "leave-room"))]
pub fn leave_room(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    let room = require_room(lobby, caller)?;
    lobby.leave_room(&room, caller.user_id(), None, None)?;
    Ok(Value::Null)
}

/// Close the caller's room.
#[instrument(skip_all, fields(method = "close-room"))]
pub fn close_room(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    let room = require_room(lobby, caller)?;
    if !lobby.is_room_admin(&room, caller.user_id()) {
        return Err(RpcError::application("You must be an admin to close a room!"));
    }
    let referer = Referer::User(caller.user_id().clone());
    lobby.close_room(&room, &referer, USER_ACTION, "The room was closed by an admin")?;
    Ok(Value::Null)
}
