//! Lobby behaviour and role permissions.

use std::collections::BTreeMap;

use lobby_core::Role;
use serde::{Deserialize, Serialize};

/// What happens to a room when its owner leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnerLeaveAction {
    /// The longest-standing remaining member becomes owner.
    #[default]
    AssignFirst,
    /// The room closes.
    Close,
}

/// Lobby behaviour knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbyBehaviour {
    /// Send event notifications to clients.
    pub notify_events: bool,
    /// Owner-leave policy applied to new rooms.
    pub owner_leave_action: OwnerLeaveAction,
    /// Role granted when joining a room (`room.member` or `room.admin`).
    pub join_role: Role,
}

impl Default for LobbyBehaviour {
    fn default() -> Self {
        Self {
            notify_events: true,
            owner_leave_action: OwnerLeaveAction::AssignFirst,
            join_role: Role::RoomMember,
        }
    }
}

/// Method allow-lists keyed by role name. `"*"` allows every method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePermissions(pub BTreeMap<String, Vec<String>>);

const LOBBY_MEMBER: &[&str] = &[
    "heartbeat",
    "identify",
    "get-value",
    "set-value",
    "leave",
    "message",
    "get-role",
    "get-roles",
    "list-users",
    "list-rooms",
    "check-room",
    "create-room",
    "join-room",
    "show-stats",
];

const ROOM_MEMBER: &[&str] = &[
    "heartbeat",
    "identify",
    "get-value",
    "set-value",
    "leave",
    "message",
    "get-role",
    "get-roles",
    "list-users",
    "leave-room",
    "check-room",
    "show-stats",
];

const MODERATOR: &[&str] = &["kick"];

const LOBBY_ADMIN: &[&str] = &["upgrade-role", "downgrade-role", "set-role"];

const ROOM_ADMIN: &[&str] = &[
    "upgrade-role",
    "downgrade-role",
    "set-role",
    "set-owner",
    "set-admin",
    "unset-admin",
    "close-room",
];

fn methods(groups: &[&[&str]]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|group| group.iter())
        .map(|m| (*m).to_string())
        .collect()
}

impl Default for RolePermissions {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        let entries = [
            (Role::Guest, Vec::new()),
            (Role::LobbyMember, methods(&[LOBBY_MEMBER])),
            (Role::LobbyModerator, methods(&[LOBBY_MEMBER, MODERATOR])),
            (Role::LobbyAdmin, methods(&[LOBBY_MEMBER, MODERATOR, LOBBY_ADMIN])),
            (Role::LobbySuperuser, vec!["*".to_string()]),
            (Role::RoomMember, methods(&[ROOM_MEMBER])),
            (Role::RoomModerator, methods(&[ROOM_MEMBER, MODERATOR])),
            (Role::RoomAdmin, methods(&[ROOM_MEMBER, MODERATOR, ROOM_ADMIN])),
            (Role::RoomOwner, methods(&[ROOM_MEMBER, MODERATOR, ROOM_ADMIN])),
            (Role::RoomSuperuser, vec!["*".to_string()]),
        ];
        for (role, allowed) in entries {
            let _ = map.insert(role.as_str().to_string(), allowed);
        }
        Self(map)
    }
}

impl RolePermissions {
    /// Allowed methods for a role name, if configured.
    pub fn allowed(&self, role: &str) -> Option<&[String]> {
        self.0.get(role).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_is_configured() {
        let perms = RolePermissions::default();
        for role in Role::ALL {
            assert!(perms.allowed(role.as_str()).is_some(), "{role} missing");
        }
    }

    #[test]
    fn members_cannot_kick() {
        let perms = RolePermissions::default();
        let member = perms.allowed("lobby.member").unwrap();
        assert!(!member.iter().any(|m| m == "kick"));
        let moderator = perms.allowed("room.moderator").unwrap();
        assert!(moderator.iter().any(|m| m == "kick"));
    }

    #[test]
    fn room_members_cannot_create_rooms() {
        let perms = RolePermissions::default();
        let member = perms.allowed("room.member").unwrap();
        assert!(!member.iter().any(|m| m == "create-room"));
        assert!(member.iter().any(|m| m == "leave-room"));
    }

    #[test]
    fn owner_leave_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&OwnerLeaveAction::AssignFirst).unwrap(),
            "\"assign-first\""
        );
        let close: OwnerLeaveAction = serde_json::from_str("\"close\"").unwrap();
        assert_eq!(close, OwnerLeaveAction::Close);
    }
}
