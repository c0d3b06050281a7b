//! Rooms: membership, ownership, and the close state machine.
//!
//! A room is open until [`Lobby::close_room`] marks it closed, forces every
//! member out, and unregisters it. Membership is mirrored on both sides:
//! `user.room == Some(r)` exactly when the user is listed in `r.users`.

use lobby_core::{Role, RoomId, UserId, is_valid_name};
use lobby_rpc::{Message, MessageKind, Notification};
use lobby_settings::OwnerLeaveAction;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::LobbyError;
use crate::lobby::{EventSource, Lobby};

/// Leave codes that announce a departure with `room-leave`.
const PEACEFUL: &str = "peaceful";

/// Who asks for a room to close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Referer {
    /// The lobby itself (removal, shutdown).
    Lobby,
    /// A room closing itself; must be the room being closed.
    Room(RoomId),
    /// A user; must be a present owner or admin.
    User(UserId),
}

/// A group of users.
pub struct Room {
    pub(crate) id: RoomId,
    pub(crate) data: Value,
    pub(crate) owner: Option<UserId>,
    pub(crate) users: Vec<UserId>,
    pub(crate) passphrase: Option<String>,
    pub(crate) visible: bool,
    pub(crate) relay: bool,
    pub(crate) join_role: Role,
    pub(crate) owner_leave_action: OwnerLeaveAction,
    pub(crate) closed: bool,
    created: Instant,
    pub(crate) last_active: Instant,
}

impl Room {
    /// Create an empty, open room.
    pub fn new(id: RoomId, name: String, visible: bool, passphrase: Option<String>, now: Instant) -> Self {
        Self {
            id,
            data: json!({ "name": name }),
            owner: None,
            users: Vec::new(),
            passphrase: passphrase.filter(|p| !p.is_empty()),
            visible,
            relay: false,
            join_role: Role::RoomMember,
            owner_leave_action: OwnerLeaveAction::AssignFirst,
            closed: false,
            created: now,
            last_active: now,
        }
    }

    /// Unique id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Display name from `data.name`.
    pub fn name(&self) -> &str {
        self.data.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    /// Free-form data store.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Current owner.
    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    /// Members in join order.
    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    /// Whether the room is listed by `list-rooms`.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether relay frames are forwarded.
    pub fn relay(&self) -> bool {
        self.relay
    }

    /// Whether a passphrase is required to join.
    pub fn is_locked(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Whether the room has closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether `user` is a member.
    pub fn is_member(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// Whether `user` is the present owner.
    pub fn is_owner(&self, user: &UserId) -> bool {
        self.owner.as_ref() == Some(user) && self.is_member(user)
    }

    /// Wire snapshot `{id, name, type, user_count, passphrase}`.
    pub fn item(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name(),
            "type": "room",
            "user_count": self.users.len(),
            "passphrase": self.is_locked(),
        })
    }

    /// Detailed diagnostics snapshot.
    pub fn export(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name(),
            "type": "room",
            "data": self.data,
            "owner": self.owner,
            "users": self.users,
            "user_count": self.users.len(),
            "passphrase": self.is_locked(),
            "visible": self.visible,
            "relay": self.relay,
            "join_role": self.join_role,
            "owner_leave_action": self.owner_leave_action,
            "closed": self.closed,
            "age_ms": u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("owner", &self.owner)
            .field("users", &self.users)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lobby room operations
// ─────────────────────────────────────────────────────────────────────────────

impl Lobby {
    fn room_ref(&self, id: &RoomId) -> Result<&Room, LobbyError> {
        self.rooms
            .get(id)
            .ok_or_else(|| LobbyError::validation("Room doesn't exist"))
    }

    /// Whether `user` is a present member whose current role is room owner
    /// or room admin.
    pub fn is_room_admin(&self, room: &RoomId, user: &UserId) -> bool {
        let Some(room) = self.rooms.get(room) else {
            return false;
        };
        if !room.is_member(user) {
            return false;
        }
        room.is_owner(user)
            || self
                .users
                .get(user)
                .is_some_and(|u| matches!(u.role(), Role::RoomAdmin | Role::RoomOwner))
    }

    /// Whether `user` is a present member holding room moderator or better.
    pub fn is_room_moderator_plus(&self, room: &RoomId, user: &UserId) -> bool {
        self.is_room_admin(room, user)
            || self.rooms.get(room).is_some_and(|r| r.is_member(user))
                && self
                    .users
                    .get(user)
                    .is_some_and(|u| u.has_role(Role::RoomModerator))
    }

    /// Create a room owned by `owner`, who joins it as first member.
    ///
    /// Invalid or missing names are replaced by a generated name.
    pub fn create_room(
        &mut self,
        owner: &UserId,
        name: Option<&str>,
        visible: bool,
        passphrase: Option<String>,
    ) -> Result<RoomId, LobbyError> {
        match self.users.get(owner) {
            None => return Err(LobbyError::validation("Room requires an owner")),
            Some(user) if user.room.is_some() => {
                return Err(LobbyError::validation("You cannot join a room whilst in another"));
            }
            Some(_) => {}
        }
        let name = match name {
            Some(name) if is_valid_name(name) => name.to_owned(),
            _ => self.identity.display_name(),
        };

        let id = RoomId::from(self.identity.new_id());
        let mut room = Room::new(id.clone(), name, visible, passphrase.clone(), Instant::now());
        room.join_role = self.options.join_role;
        room.owner_leave_action = self.options.owner_leave_action;
        let item = room.item();
        self.add_room(room)?;
        info!(room_id = %id, owner = %owner, "room created");

        self.emit(EventSource::User(owner.clone()), "room-create", json!({ "room": item }));
        self.join_room(&id, owner, passphrase.as_deref())?;
        self.set_owner(&id, owner)?;
        Ok(id)
    }

    /// Add `user` to a room.
    pub fn join_room(&mut self, id: &RoomId, user: &UserId, passphrase: Option<&str>) -> Result<(), LobbyError> {
        let room = self.room_ref(id)?;
        if let Some(expected) = &room.passphrase {
            match passphrase.filter(|p| !p.is_empty()) {
                None => {
                    return Err(LobbyError::validation(
                        "This room is locked and requires a passphrase",
                    ));
                }
                Some(given) if given != expected => {
                    return Err(LobbyError::validation(
                        "Unable to join room. The passphrase is invalid",
                    ));
                }
                Some(_) => {}
            }
        }
        let join_role = room.join_role;
        let member = self
            .users
            .get_mut(user)
            .ok_or_else(|| LobbyError::validation("User is not a member of the lobby"))?;
        match &member.room {
            Some(current) if current == id => {
                return Err(LobbyError::validation("You're already in the room"));
            }
            Some(_) => {
                return Err(LobbyError::validation("You cannot join a room whilst in another"));
            }
            None => {}
        }

        member.room = Some(id.clone());
        member.upgrade_role(Role::RoomMember);
        if join_role == Role::RoomAdmin {
            member.upgrade_role(Role::RoomAdmin);
        }
        if let Some(room) = self.rooms.get_mut(id) {
            room.users.push(user.clone());
            room.last_active = Instant::now();
        }
        debug!(room_id = %id, user_id = %user, "user joined room");

        let item = self.rooms.get(id).map(Room::item).unwrap_or_default();
        self.emit(EventSource::User(user.clone()), "room-join", json!({ "room": item }));
        self.emit(EventSource::User(user.clone()), "user-relocated", json!({ "room": item }));
        Ok(())
    }

    /// Remove `user` from a room and apply the post-removal policy.
    ///
    /// `room-leave` is announced only for peaceful departures (`None` or
    /// `"peaceful"`).
    pub fn leave_room(
        &mut self,
        id: &RoomId,
        user: &UserId,
        code: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), LobbyError> {
        let room = self.room_ref(id)?;
        if !room.is_member(user) {
            return Err(LobbyError::validation(
                "User must be in the room in order to leave it",
            ));
        }
        let was_owner = room.owner.as_ref() == Some(user);

        if let Some(room) = self.rooms.get_mut(id) {
            room.users.retain(|u| u != user);
            room.last_active = Instant::now();
            if was_owner {
                room.owner = None;
            }
        }
        if let Some(member) = self.users.get_mut(user) {
            member.room = None;
            for role in Role::ROOM_ROLES.into_iter().rev() {
                while member.destroy_role(role) {}
            }
        }
        debug!(room_id = %id, user_id = %user, code, reason, "user left room");

        if code.is_none_or(|c| c == PEACEFUL) {
            let item = self.rooms.get(id).map(Room::item).unwrap_or_default();
            self.emit(EventSource::User(user.clone()), "room-leave", json!({ "room": item }));
        }

        let Some(room) = self.rooms.get(id) else {
            return Ok(());
        };
        if room.closed {
            return Ok(());
        }
        if room.users.is_empty() {
            self.close_room(id, &Referer::Room(id.clone()), "room-empty", "The room is empty")
        } else if was_owner {
            match room.owner_leave_action {
                OwnerLeaveAction::Close => {
                    self.close_room(id, &Referer::Room(id.clone()), "owner-left", "The owner left the room")
                }
                OwnerLeaveAction::AssignFirst => {
                    let next = room.users[0].clone();
                    self.set_owner(id, &next)
                }
            }
        } else {
            Ok(())
        }
    }

    /// Make `user` the room owner.
    pub fn set_owner(&mut self, id: &RoomId, user: &UserId) -> Result<(), LobbyError> {
        let room = self.room_ref(id)?;
        if !self.users.contains_key(user) {
            return Err(LobbyError::validation("User is not a member of the lobby"));
        }
        if !room.is_member(user) {
            return Err(LobbyError::validation(
                "User must be in the room to become an owner of it",
            ));
        }
        let previous = room.owner.clone();

        if let Some(previous) = previous.and_then(|p| self.users.get_mut(&p)) {
            let _ = previous.destroy_role(Role::RoomOwner);
        }
        if let Some(owner) = self.users.get_mut(user) {
            let _ = owner.destroy_role(Role::RoomAdmin);
            owner.upgrade_role(Role::RoomOwner);
        }
        let item = self.rooms.get_mut(id).map(|room| {
            room.owner = Some(user.clone());
            room.item()
        });
        info!(room_id = %id, owner = %user, "room owner changed");
        self.emit(
            EventSource::User(user.clone()),
            "room-owner-change",
            json!({ "room": item }),
        );
        Ok(())
    }

    fn check_admin_change(&self, id: &RoomId, actor: &UserId, target: &UserId) -> Result<(), LobbyError> {
        let room = self.room_ref(id)?;
        if !self.users.contains_key(target) {
            return Err(LobbyError::validation("Target must be an existing user"));
        }
        if room.owner.as_ref() == Some(target) {
            return Err(LobbyError::validation("An owner is always an admin"));
        }
        if !room.is_member(target) {
            return Err(LobbyError::validation(
                "User must be in the room to become a room admin",
            ));
        }
        if !self.is_room_admin(id, actor) {
            return Err(LobbyError::validation(
                "A room member cannot change admin privileges",
            ));
        }
        Ok(())
    }

    /// Grant `room.admin` to `target` on behalf of `actor`.
    pub fn set_room_admin(&mut self, id: &RoomId, actor: &UserId, target: &UserId) -> Result<(), LobbyError> {
        self.check_admin_change(id, actor, target)?;
        let Some(user) = self.users.get_mut(target) else {
            return Err(LobbyError::validation("Target must be an existing user"));
        };
        if user.has_role(Role::RoomAdmin) {
            return Err(LobbyError::validation("Already an admin"));
        }
        user.upgrade_role(Role::RoomAdmin);
        let item = self.rooms.get(id).map(Room::item);
        self.emit(EventSource::User(target.clone()), "room-change", json!({ "room": item }));
        Ok(())
    }

    /// Revoke `room.admin` from `target` on behalf of `actor`.
    pub fn unset_room_admin(&mut self, id: &RoomId, actor: &UserId, target: &UserId) -> Result<(), LobbyError> {
        self.check_admin_change(id, actor, target)?;
        let Some(user) = self.users.get_mut(target) else {
            return Err(LobbyError::validation("Target must be an existing user"));
        };
        if !user.has_role(Role::RoomAdmin) {
            return Err(LobbyError::validation("Already a member"));
        }
        let _ = user.destroy_role(Role::RoomAdmin);
        let item = self.rooms.get(id).map(Room::item);
        self.emit(EventSource::User(target.clone()), "room-change", json!({ "room": item }));
        Ok(())
    }

    /// Remove `target` from the room and announce the kick.
    pub fn kick_from_room(&mut self, id: &RoomId, target: &UserId, reason: &str) -> Result<(), LobbyError> {
        if !self.room_ref(id)?.is_member(target) {
            return Err(LobbyError::validation("Can only kick room users"));
        }
        let item = self.rooms.get(id).map(Room::item);
        self.leave_room(id, target, Some("kick"), Some(reason))?;
        info!(room_id = %id, user_id = %target, reason, "user kicked from room");
        self.emit(
            EventSource::User(target.clone()),
            "room-kick",
            json!({ "reason": reason, "room": item }),
        );
        Ok(())
    }

    /// Close a room: announce, force every member out, unregister.
    ///
    /// Closing an already-closed room is a no-op.
    pub fn close_room(&mut self, id: &RoomId, referer: &Referer, code: &str, reason: &str) -> Result<(), LobbyError> {
        let Some(room) = self.rooms.get(id) else {
            return Err(LobbyError::invariant(format!("Room '{id}' does not exist")));
        };
        match referer {
            Referer::Lobby => {}
            Referer::Room(other) if other == id => {}
            Referer::Room(_) => {
                return Err(LobbyError::invariant("Another room cannot perform this action"));
            }
            Referer::User(user) => {
                if !self.is_room_admin(id, user) {
                    return Err(LobbyError::validation("Only admins can close a room"));
                }
            }
        }
        if room.closed {
            return Ok(());
        }

        info!(room_id = %id, code, reason, "closing room");
        let item = room.item();
        self.emit(
            EventSource::Room(id.clone()),
            "room-close",
            json!({ "code": code, "reason": reason, "room": item }),
        );

        let members = match self.rooms.get_mut(id) {
            Some(room) => {
                room.closed = true;
                room.users.clone()
            }
            None => Vec::new(),
        };
        for member in members {
            self.leave_room(id, &member, Some(code), Some(reason))?;
        }
        let _ = self.rooms.remove(id);
        debug!(room_id = %id, "room unregistered");
        Ok(())
    }

    /// Send `notification` to every member of a room except `exclude`.
    pub fn room_notify(&mut self, id: &RoomId, notification: &Notification, exclude: &[UserId]) -> Result<(), LobbyError> {
        let members = self.room_members_except(id, exclude)?;
        self.notify_ids(&members, notification);
        Ok(())
    }

    /// Send a room-scoped message from `sender` to every member except `exclude`.
    pub fn room_message(
        &mut self,
        id: &RoomId,
        sender: Value,
        content: Value,
        exclude: &[UserId],
    ) -> Result<(), LobbyError> {
        if sender.is_null() {
            return Err(LobbyError::validation("Message requires a sender"));
        }
        let members = self.room_members_except(id, exclude)?;
        let room = self.room_ref(id)?;
        let message = Message::new(sender, room.item(), MessageKind::Room, content);
        if let Some(room) = self.rooms.get_mut(id) {
            room.last_active = Instant::now();
        }
        self.message_ids(&members, &message);
        Ok(())
    }

    fn room_members_except(&self, id: &RoomId, exclude: &[UserId]) -> Result<Vec<UserId>, LobbyError> {
        Ok(self
            .room_ref(id)?
            .users
            .iter()
            .filter(|u| !exclude.contains(u))
            .cloned()
            .collect())
    }
}
