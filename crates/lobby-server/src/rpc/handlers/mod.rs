//! Built-in method handlers and the lookups they share.

pub mod messaging;
pub mod roles;
pub mod rooms;
pub mod session;
pub mod values;

use lobby_core::{Role, RoomId, UserId};
use lobby_rpc::RpcError;

use crate::lobby::{Caller, Lobby, User};

/// The user a handler runs as.
pub(crate) fn caller_user<'a>(lobby: &'a Lobby, caller: &'a Caller) -> Result<&'a User, RpcError> {
    lobby
        .entity(caller)
        .ok_or_else(|| RpcError::application("No such user exists"))
}

/// Room of the caller, if any.
pub(crate) fn caller_room(lobby: &Lobby, caller: &Caller) -> Option<RoomId> {
    lobby.entity(caller).and_then(|u| u.room().cloned())
}

/// Resolve a target by id or name.
pub(crate) fn find_target(lobby: &Lobby, key: Option<&str>) -> Result<UserId, RpcError> {
    key.and_then(|key| lobby.find_user(key))
        .map(|u| u.id().clone())
        .ok_or_else(|| RpcError::application("Invalid user specified"))
}

/// Room of a registered user.
pub(crate) fn room_of(lobby: &Lobby, id: &UserId) -> Option<RoomId> {
    lobby.user(id).and_then(|u| u.room().cloned())
}

/// Lobby admin or above.
pub(crate) fn is_lobby_admin(user: &User) -> bool {
    user.has_role(Role::LobbyAdmin) || user.has_role(Role::LobbySuperuser)
}

/// Lobby moderator or above.
pub(crate) fn is_lobby_moderator_plus(user: &User) -> bool {
    user.has_role(Role::LobbyModerator) || is_lobby_admin(user)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use lobby_core::UserId;
    use lobby_rpc::RpcError;
    use serde_json::Value;

    use crate::lobby::Caller;
    use crate::lobby::testing::TestLobby;

    /// Run a method as a registered user, skipping the role gate.
    pub(crate) fn call(t: &mut TestLobby, id: &UserId, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let mut caller = Caller::User(id.clone());
        t.lobby.run_method(&mut caller, method, params)
    }

    /// The error message of a failed call.
    pub(crate) fn call_err(t: &mut TestLobby, id: &UserId, method: &str, params: &[Value]) -> String {
        call(t, id, method, params)
            .expect_err("call should fail")
            .to_string()
    }
}
