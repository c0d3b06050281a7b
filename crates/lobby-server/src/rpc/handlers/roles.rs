//! Role inspection and changes.

use lobby_core::{Role, UserId};
use lobby_rpc::RpcError;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::lobby::{Caller, Lobby};
use crate::rpc::handlers::{caller_room, caller_user, find_target, is_lobby_admin, room_of};
use crate::rpc::validation::{opt_str, require_str};

/// Resolve the target (default: the caller) and apply the same-room rule.
fn scoped_target(lobby: &Lobby, caller: &Caller, key: Option<&str>) -> Result<UserId, RpcError> {
    let target = match key {
        Some(key) => find_target(lobby, Some(key))?,
        None => caller_user(lobby, caller)?.id().clone(),
    };
    if !caller.is_server() && room_of(lobby, &target) != caller_room(lobby, caller) {
        return Err(RpcError::application("The target user must be in the same room"));
    }
    Ok(target)
}

fn may_change_roles(lobby: &Lobby, caller: &Caller) -> bool {
    if caller.is_server() {
        return true;
    }
    match caller_room(lobby, caller) {
        Some(room) => lobby.is_room_admin(&room, caller.user_id()),
        None => lobby.entity(caller).is_some_and(is_lobby_admin),
    }
}

fn parse_role(params: &[Value]) -> Result<Role, RpcError> {
    require_str(params, 1, "A role must be provided")?
        .parse::<Role>()
        .map_err(|err| RpcError::invalid_params(err.to_string()))
}

/// Roles are never set directly.
#[instrument(skip_all, fields(method = "set-role"))]
pub fn set_role(lobby: &mut Lobby, _caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let _ = find_target(lobby, opt_str(params, 0))?;
    Err(RpcError::application("You cannot directly set a user role"))
}

/// Push a role onto the target's stack.
#[instrument(skip_all, fields(method = "upgrade-role"))]
pub fn upgrade_role(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = find_target(lobby, opt_str(params, 0))?;
    let target = scoped_target(lobby, caller, Some(target.as_str()))?;
    if !may_change_roles(lobby, caller) {
        return Err(RpcError::application("You do not have permission to change roles"));
    }
    let role = parse_role(params)?;
    if role == Role::RoomOwner || role.is_superuser() {
        return Err(RpcError::application("Role is unobtainable in this manner"));
    }

    if let Some(user) = lobby.user_mut(&target) {
        if user.has_role(role) {
            debug!(user_id = %target, role = role.as_str(), "role already held");
        } else {
            user.upgrade_role(role);
            info!(user_id = %target, role = role.as_str(), "role upgraded");
        }
    }
    Ok(Value::Null)
}

/// Remove a role from anywhere in the target's stack.
#[instrument(skip_all, fields(method = "downgrade-role"))]
pub fn downgrade_role(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = find_target(lobby, opt_str(params, 0))?;
    let target = scoped_target(lobby, caller, Some(target.as_str()))?;
    if !may_change_roles(lobby, caller) {
        return Err(RpcError::application("You do not have permission to change roles"));
    }
    let role = parse_role(params)?;
    if role == Role::RoomOwner {
        return Err(RpcError::application("Role is unobtainable in this manner"));
    }

    if let Some(user) = lobby.user_mut(&target) {
        if user.destroy_role(role) {
            info!(user_id = %target, role = role.as_str(), "role removed");
        }
    }
    Ok(Value::Null)
}

/// Current role of the target, default the caller.
#[instrument(skip_all, fields(method = "get-role"))]
pub fn get_role(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = scoped_target(lobby, caller, opt_str(params, 0))?;
    let role = lobby.user(&target).map_or(Role::Guest, |u| u.role());
    Ok(json!(role))
}

/// Roles that apply to where the target is.
#[instrument(skip_all, fields(method = "get-roles"))]
pub fn get_roles(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let target = scoped_target(lobby, caller, opt_str(params, 0))?;
    let roles = if room_of(lobby, &target).is_some() {
        Role::ROOM_ROLES
    } else {
        Role::LOBBY_ROLES
    };
    Ok(json!(roles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::testing::TestLobby;
    use crate::rpc::handlers::test_helpers::{call, call_err};

    #[test]
    fn set_role_is_always_rejected() {
        let mut t = TestLobby::new();
        let a = t.connect();
        assert_eq!(
            call_err(&mut t, &a, "set-role", &[json!("ghost"), json!("lobby.admin")]),
            "Invalid user specified"
        );
        assert_eq!(
            call_err(&mut t, &a, "set-role", &[json!(a.as_str()), json!("lobby.admin")]),
            "You cannot directly set a user role"
        );
    }

    #[test]
    fn room_admin_upgrades_and_downgrades_members() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();

        let target = json!(b.as_str());
        let _ = call(&mut t, &a, "upgrade-role", &[target.clone(), json!("room.moderator")]).unwrap();
        assert_eq!(call(&mut t, &b, "get-role", &[]).unwrap(), json!("room.moderator"));

        // already held
        let depth = t.lobby.user(&b).unwrap().roles().history().len();
        let _ = call(&mut t, &a, "upgrade-role", &[target.clone(), json!("room.moderator")]).unwrap();
        assert_eq!(t.lobby.user(&b).unwrap().roles().history().len(), depth);

        let _ = call(&mut t, &a, "downgrade-role", &[target.clone(), json!("room.moderator")]).unwrap();
        assert_eq!(call(&mut t, &a, "get-role", &[target.clone()]).unwrap(), json!("room.member"));
        // not held
        let _ = call(&mut t, &a, "downgrade-role", &[target, json!("room.moderator")]).unwrap();
    }

    #[test]
    fn unobtainable_roles() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();
        let target = json!(b.as_str());
        for role in ["room.owner", "room.superuser", "lobby.superuser"] {
            assert_eq!(
                call_err(&mut t, &a, "upgrade-role", &[target.clone(), json!(role)]),
                "Role is unobtainable in this manner"
            );
        }
        assert_eq!(
            call_err(&mut t, &a, "downgrade-role", &[json!(a.as_str()), json!("room.owner")]),
            "Role is unobtainable in this manner"
        );
        let err = call(&mut t, &a, "upgrade-role", &[target, json!("room.janitor")]).unwrap_err();
        assert_eq!(err.code(), lobby_rpc::errors::INVALID_PARAMS);
    }

    #[test]
    fn role_changes_need_permission_and_same_room() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let c = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();

        assert_eq!(
            call_err(&mut t, &b, "upgrade-role", &[json!(a.as_str()), json!("room.admin")]),
            "You do not have permission to change roles"
        );
        assert_eq!(
            call_err(&mut t, &c, "upgrade-role", &[json!(b.as_str()), json!("room.admin")]),
            "The target user must be in the same room"
        );
        // lobby members are not lobby admins
        let d = t.connect();
        assert_eq!(
            call_err(&mut t, &c, "upgrade-role", &[json!(d.as_str()), json!("lobby.moderator")]),
            "You do not have permission to change roles"
        );
        t.lobby.user_mut(&c).unwrap().upgrade_role(Role::LobbyAdmin);
        let _ = call(&mut t, &c, "upgrade-role", &[json!(d.as_str()), json!("lobby.moderator")]).unwrap();
        assert_eq!(t.lobby.user(&d).unwrap().role(), Role::LobbyModerator);
    }

    #[test]
    fn role_listings_follow_location() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        assert_eq!(
            call(&mut t, &a, "get-roles", &[]).unwrap(),
            json!(["guest", "lobby.member", "lobby.moderator", "lobby.admin"])
        );
        assert_eq!(call(&mut t, &a, "get-role", &[json!(b.as_str())]).unwrap(), json!("lobby.member"));

        let _ = t.create_room(&a, "alpha");
        assert_eq!(
            call(&mut t, &a, "get-roles", &[]).unwrap(),
            json!(["room.member", "room.moderator", "room.admin", "room.owner"])
        );
        assert_eq!(
            call_err(&mut t, &b, "get-role", &[json!(a.as_str())]),
            "The target user must be in the same room"
        );
    }
}
