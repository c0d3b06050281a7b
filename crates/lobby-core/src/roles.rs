//! Roles and the per-user role stack.
//!
//! Roles form a closed set split into a lobby tier and a room tier. A user
//! holds exactly one *current* role plus an ordered history of the roles it
//! replaced. Upgrading pushes the current role onto the history; destroying
//! a role removes it from wherever it sits, so a room membership can be
//! unwound even after later upgrades. The floor is always [`Role::Guest`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A role a user can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Unregistered connection.
    #[serde(rename = "guest")]
    Guest,
    /// Registered lobby user.
    #[serde(rename = "lobby.member")]
    LobbyMember,
    /// Lobby moderator (may kick lobby users).
    #[serde(rename = "lobby.moderator")]
    LobbyModerator,
    /// Lobby administrator (may change roles).
    #[serde(rename = "lobby.admin")]
    LobbyAdmin,
    /// Unrestricted lobby role, held only by the server entity.
    #[serde(rename = "lobby.superuser")]
    LobbySuperuser,
    /// Member of a room.
    #[serde(rename = "room.member")]
    RoomMember,
    /// Room moderator (may kick room members).
    #[serde(rename = "room.moderator")]
    RoomModerator,
    /// Room administrator.
    #[serde(rename = "room.admin")]
    RoomAdmin,
    /// Room owner.
    #[serde(rename = "room.owner")]
    RoomOwner,
    /// Unrestricted room role, held only by the server entity.
    #[serde(rename = "room.superuser")]
    RoomSuperuser,
}

impl Role {
    /// Every role, lowest tier first.
    pub const ALL: [Role; 10] = [
        Role::Guest,
        Role::LobbyMember,
        Role::LobbyModerator,
        Role::LobbyAdmin,
        Role::LobbySuperuser,
        Role::RoomMember,
        Role::RoomModerator,
        Role::RoomAdmin,
        Role::RoomOwner,
        Role::RoomSuperuser,
    ];

    /// Roles a room occupant may be assigned.
    pub const ROOM_ROLES: [Role; 4] = [
        Role::RoomMember,
        Role::RoomModerator,
        Role::RoomAdmin,
        Role::RoomOwner,
    ];

    /// Roles a lobby occupant may be assigned.
    pub const LOBBY_ROLES: [Role; 4] = [
        Role::Guest,
        Role::LobbyMember,
        Role::LobbyModerator,
        Role::LobbyAdmin,
    ];

    /// Wire name (e.g. `"room.admin"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::LobbyMember => "lobby.member",
            Self::LobbyModerator => "lobby.moderator",
            Self::LobbyAdmin => "lobby.admin",
            Self::LobbySuperuser => "lobby.superuser",
            Self::RoomMember => "room.member",
            Self::RoomModerator => "room.moderator",
            Self::RoomAdmin => "room.admin",
            Self::RoomOwner => "room.owner",
            Self::RoomSuperuser => "room.superuser",
        }
    }

    /// Whether this is one of the superuser roles.
    pub fn is_superuser(self) -> bool {
        matches!(self, Self::LobbySuperuser | Self::RoomSuperuser)
    }

    /// Whether this role belongs to the room tier.
    pub fn is_room_role(self) -> bool {
        self.as_str().starts_with("room.")
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid role '{0}'")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseRoleError(s.to_owned()))
    }
}

/// Current role plus the ordered history of roles it displaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleStack {
    current: Role,
    history: Vec<Role>,
}

impl RoleStack {
    /// A fresh stack holding only [`Role::Guest`].
    pub fn new() -> Self {
        Self {
            current: Role::Guest,
            history: Vec::new(),
        }
    }

    /// Build a stack with an explicit current role and history.
    pub fn with_history(current: Role, history: Vec<Role>) -> Self {
        Self { current, history }
    }

    /// The role currently in effect.
    pub fn current(&self) -> Role {
        self.current
    }

    /// Displaced roles, oldest first.
    pub fn history(&self) -> &[Role] {
        &self.history
    }

    /// Make `role` current, pushing the previous role onto the history.
    pub fn upgrade(&mut self, role: Role) {
        self.history.push(self.current);
        self.current = role;
    }

    /// Pop the most recent history entry into the current role.
    ///
    /// Never drops below [`Role::Guest`].
    pub fn downgrade(&mut self) -> Role {
        self.current = self.history.pop().unwrap_or(Role::Guest);
        self.current
    }

    /// Remove `role` from the stack.
    ///
    /// The first history occurrence is removed when present; otherwise, if
    /// `role` is current, the stack is downgraded. Returns whether anything
    /// changed.
    pub fn destroy(&mut self, role: Role) -> bool {
        if let Some(pos) = self.history.iter().position(|r| *r == role) {
            let _ = self.history.remove(pos);
            true
        } else if self.current == role {
            let _ = self.downgrade();
            true
        } else {
            false
        }
    }

    /// Whether `role` is current or anywhere in the history.
    pub fn has(&self, role: Role) -> bool {
        self.current == role || self.history.contains(&role)
    }
}

impl Default for RoleStack {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn names_roundtrip_through_from_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        assert_matches!("room.king".parse::<Role>(), Err(ParseRoleError(name)) if name == "room.king");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::RoomOwner).unwrap();
        assert_eq!(json, "\"room.owner\"");
        let back: Role = serde_json::from_str("\"lobby.moderator\"").unwrap();
        assert_eq!(back, Role::LobbyModerator);
    }

    #[test]
    fn tier_helpers() {
        assert!(Role::RoomSuperuser.is_superuser());
        assert!(!Role::RoomOwner.is_superuser());
        assert!(Role::RoomMember.is_room_role());
        assert!(!Role::LobbyAdmin.is_room_role());
    }

    #[test]
    fn new_stack_is_guest() {
        let stack = RoleStack::new();
        assert_eq!(stack.current(), Role::Guest);
        assert!(stack.history().is_empty());
    }

    #[test]
    fn upgrade_pushes_previous() {
        let mut stack = RoleStack::new();
        stack.upgrade(Role::LobbyMember);
        stack.upgrade(Role::RoomMember);
        assert_eq!(stack.current(), Role::RoomMember);
        assert_eq!(stack.history(), &[Role::Guest, Role::LobbyMember]);
        assert!(stack.has(Role::LobbyMember));
        assert!(!stack.has(Role::RoomAdmin));
    }

    #[test]
    fn downgrade_floors_at_guest() {
        let mut stack = RoleStack::new();
        assert_eq!(stack.downgrade(), Role::Guest);
        assert_eq!(stack.downgrade(), Role::Guest);
    }

    #[test]
    fn destroy_prefers_history_entry() {
        let mut stack = RoleStack::new();
        stack.upgrade(Role::LobbyMember);
        stack.upgrade(Role::RoomMember);
        stack.upgrade(Role::RoomOwner);
        assert!(stack.destroy(Role::RoomMember));
        assert_eq!(stack.current(), Role::RoomOwner);
        assert!(stack.destroy(Role::RoomOwner));
        assert_eq!(stack.current(), Role::LobbyMember);
    }

    #[test]
    fn destroy_absent_role_is_noop() {
        let mut stack = RoleStack::new();
        stack.upgrade(Role::LobbyMember);
        assert!(!stack.destroy(Role::RoomAdmin));
        assert_eq!(stack.current(), Role::LobbyMember);
    }

    fn distinct_roles() -> impl Strategy<Value = Vec<Role>> {
        proptest::sample::subsequence(Role::ALL[2..].to_vec(), 0..=8).prop_shuffle()
    }

    proptest! {
        #[test]
        fn balanced_upgrades_and_destroys_restore_role(roles in distinct_roles()) {
            let mut stack = RoleStack::new();
            stack.upgrade(Role::LobbyMember);
            let before = stack.clone();
            for role in &roles {
                stack.upgrade(*role);
            }
            for role in roles.iter().rev() {
                prop_assert!(stack.destroy(*role));
            }
            prop_assert_eq!(stack, before);
        }
    }
}
