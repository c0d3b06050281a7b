//! The lobby: the single coordinator of users, rooms, and dispatch.
//!
//! A [`Lobby`] owns every [`User`] and [`Room`] in id-keyed registries.
//! Cross-references between them are ids, never pointers. All mutation runs
//! on one logical thread: transports and timers lock the [`SharedLobby`],
//! call one synchronous operation, and release it before awaiting.

pub mod events;
pub mod inbound;
pub mod pending;
pub mod room;
pub mod user;

pub use events::{Depth, EventNotifier, EventSource, LobbyEvent, Observer, WILDCARD, default_notifiers};
pub use inbound::FrameOutcome;
pub use pending::{PendingCall, PendingCalls, ReplyCallback};
pub use room::{Referer, Room};
pub use user::{SERVER_ID, SocketStatus, User};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lobby_core::{IdentityProvider, PhraseIdentity, Role, RoomId, UserId};
use lobby_rpc::{Message, MessageKind, Notification, Request, RpcError};
use lobby_settings::{LobbySettings, OwnerLeaveAction};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::LobbyError;
use crate::rpc::permissions::Permissions;
use crate::rpc::registry::{self, MethodHandler, MethodRegistry};
use crate::transport::Transport;

/// The lobby behind the lock every task shares.
pub type SharedLobby = Arc<Mutex<Lobby>>;

/// Leave code announced as `user-leave`.
const PEACEFUL: &str = "peaceful";
/// Leave code for a connection that dropped without saying goodbye.
pub const BROKEN_CONNECTION: &str = "user-broken-connection";

/// Whoever a method runs on behalf of.
#[derive(Debug)]
pub enum Caller {
    /// A registered user.
    User(UserId),
    /// The transient elevated server entity.
    Server(Box<User>),
}

impl Caller {
    /// A fresh server entity.
    pub fn server() -> Self {
        Self::Server(Box::new(User::server_entity(Instant::now())))
    }

    /// Id of the caller.
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::User(id) => id,
            Self::Server(user) => user.id(),
        }
    }

    /// Whether this is the server entity.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

/// Behaviour knobs the lobby reads at runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbyOptions {
    /// Send event notifications to clients.
    pub notify_events: bool,
    /// Owner-leave policy given to new rooms.
    pub owner_leave_action: OwnerLeaveAction,
    /// Role granted on room join.
    pub join_role: Role,
    /// Kick idle users.
    pub expire_users: bool,
    /// Inactivity after which a user is kicked.
    pub user_period: Duration,
    /// Close idle rooms.
    pub expire_rooms: bool,
    /// Inactivity after which a room is closed.
    pub room_idle: Duration,
    /// Age after which an unanswered server call is dropped.
    pub pending_ttl: Duration,
}

impl From<&LobbySettings> for LobbyOptions {
    fn from(settings: &LobbySettings) -> Self {
        Self {
            notify_events: settings.lobby.notify_events,
            owner_leave_action: settings.lobby.owner_leave_action,
            join_role: settings.lobby.join_role,
            expire_users: settings.expiry.expire_users,
            user_period: Duration::from_millis(settings.expiry.user_period_ms),
            expire_rooms: settings.expiry.expire_rooms,
            room_idle: Duration::from_millis(settings.expiry.room_idle_ms),
            pending_ttl: Duration::from_millis(settings.heartbeat.pending_ttl_ms),
        }
    }
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self::from(&LobbySettings::default())
    }
}

/// Registry of users and rooms plus everything needed to serve them.
pub struct Lobby {
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) rooms: BTreeMap<RoomId, Room>,
    pub(crate) options: LobbyOptions,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) permissions: Permissions,
    pub(crate) methods: MethodRegistry,
    pub(crate) notifiers: BTreeMap<String, EventNotifier>,
    pub(crate) observers: Vec<(String, Observer)>,
}

impl Lobby {
    /// Build a lobby from settings with the built-in methods and phrase ids.
    pub fn new(settings: &LobbySettings) -> Self {
        Self::with_parts(
            LobbyOptions::from(settings),
            Arc::new(PhraseIdentity),
            Permissions::from(&settings.roles),
            MethodRegistry::with_builtins(),
        )
    }

    /// Build a lobby from explicit collaborators.
    pub fn with_parts(
        options: LobbyOptions,
        identity: Arc<dyn IdentityProvider>,
        permissions: Permissions,
        methods: MethodRegistry,
    ) -> Self {
        Self {
            users: BTreeMap::new(),
            rooms: BTreeMap::new(),
            options,
            identity,
            permissions,
            methods,
            notifiers: default_notifiers(),
            observers: Vec::new(),
        }
    }

    /// Wrap in the shared lock.
    pub fn into_shared(self) -> SharedLobby {
        Arc::new(Mutex::new(self))
    }

    /// Runtime options.
    pub fn options(&self) -> &LobbyOptions {
        &self.options
    }

    // ── Registry ────────────────────────────────────────────────────────

    /// Register a user and grant `lobby.member`.
    pub fn add_user(&mut self, mut user: User) -> Result<(), LobbyError> {
        if user.id.is_empty() {
            return Err(LobbyError::invariant("User id must not be empty"));
        }
        if self.users.contains_key(&user.id) {
            return Err(LobbyError::invariant(format!("User '{}' already exists", user.id)));
        }
        user.upgrade_role(Role::LobbyMember);
        debug!(user_id = %user.id, "user registered");
        let _ = self.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Unregister a user without any announcement.
    pub fn remove_user(&mut self, id: &UserId) -> Result<User, LobbyError> {
        let user = self
            .users
            .remove(id)
            .ok_or_else(|| LobbyError::invariant(format!("User '{id}' does not exist")))?;
        debug!(user_id = %id, "user unregistered");
        Ok(user)
    }

    /// Register a room.
    pub fn add_room(&mut self, room: Room) -> Result<(), LobbyError> {
        if room.id.is_empty() {
            return Err(LobbyError::invariant("Room id must not be empty"));
        }
        if self.rooms.contains_key(&room.id) {
            return Err(LobbyError::invariant(format!("Room '{}' already exists", room.id)));
        }
        debug!(room_id = %room.id, "room registered");
        let _ = self.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    /// Close (when still open) and unregister a room.
    pub fn remove_room(&mut self, id: &RoomId) -> Result<(), LobbyError> {
        let Some(room) = self.rooms.get(id) else {
            return Err(LobbyError::invariant(format!("Room '{id}' does not exist")));
        };
        if room.closed {
            let _ = self.rooms.remove(id);
            return Ok(());
        }
        self.close_room(id, &Referer::Lobby, "removed", "The room was removed")
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// Registered user by id.
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Registered user by id, mutably.
    pub fn user_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.get_mut(id)
    }

    /// Registered room by id.
    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Registered room by id, mutably.
    pub fn room_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    /// Every registered user, ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Every registered room, ordered by id.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// A user by id, falling back to the first with a matching name.
    pub fn find_user(&self, key: &str) -> Option<&User> {
        self.users
            .get(key)
            .or_else(|| self.users.values().find(|u| u.name() == key))
    }

    /// A room by id, falling back to the first with a matching name.
    pub fn find_room(&self, key: &str) -> Option<&Room> {
        self.rooms
            .get(key)
            .or_else(|| self.rooms.values().find(|r| r.name() == key))
    }

    /// The user a method runs as.
    pub fn entity<'a>(&'a self, caller: &'a Caller) -> Option<&'a User> {
        match caller {
            Caller::User(id) => self.users.get(id),
            Caller::Server(user) => Some(&**user),
        }
    }

    /// The user a method runs as, mutably.
    pub fn entity_mut<'a>(&'a mut self, caller: &'a mut Caller) -> Option<&'a mut User> {
        match caller {
            Caller::User(id) => self.users.get_mut(id),
            Caller::Server(user) => Some(&mut **user),
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    /// Register a new connection and announce it.
    pub fn connect(&mut self, transport: Arc<dyn Transport>) -> Result<UserId, LobbyError> {
        let id = UserId::from(self.identity.new_id());
        let user = User::new(id.clone(), self.identity.display_name(), transport, Instant::now());
        self.add_user(user)?;
        info!(user_id = %id, "user connected");
        self.emit(EventSource::User(id.clone()), "user-join", Value::Null);
        Ok(id)
    }

    /// The transport reported the connection gone.
    ///
    /// A user still registered at this point dropped without leaving.
    pub fn disconnect(&mut self, id: &UserId) {
        if self.users.contains_key(id) {
            if let Err(err) = self.leave_user(id, Some(BROKEN_CONNECTION), None) {
                warn!(user_id = %id, error = %err, "disconnect cleanup failed");
            }
        }
    }

    /// Take a user out of its room and the lobby.
    ///
    /// `None` or `"peaceful"` announces `user-leave`; the broken-connection
    /// code announces itself; every other code is silent. Leaving an
    /// unregistered user is a no-op.
    pub fn leave_user(&mut self, id: &UserId, code: Option<&str>, reason: Option<&str>) -> Result<(), LobbyError> {
        let Some(user) = self.users.get(id) else {
            return Ok(());
        };
        if let Some(room) = user.room.clone() {
            self.leave_room(&room, id, code, reason)?;
        }

        let event = match code {
            None | Some(PEACEFUL) => Some("user-leave"),
            Some(BROKEN_CONNECTION) => Some(BROKEN_CONNECTION),
            Some(_) => None,
        };
        if let Some(event) = event {
            self.emit(EventSource::User(id.clone()), event, json!({ "reason": reason }));
        }

        if self.users.contains_key(id) {
            let _ = self.remove_user(id)?;
        }
        info!(user_id = %id, code, reason, "user left");
        Ok(())
    }

    /// Announce a kick, then close the user.
    pub fn kick_user(&mut self, id: &UserId, reason: &str) -> Result<(), LobbyError> {
        self.expel(id, "user-kick", "kick", reason)
    }

    /// Announce an inactivity timeout, then close the user.
    pub fn timeout_user(&mut self, id: &UserId, reason: &str) -> Result<(), LobbyError> {
        self.expel(id, "user-timeout", "timeout", reason)
    }

    fn expel(&mut self, id: &UserId, event: &str, code: &str, reason: &str) -> Result<(), LobbyError> {
        if !self.users.contains_key(id) {
            return Err(LobbyError::validation("No such user exists"));
        }
        self.emit(EventSource::User(id.clone()), event, json!({ "reason": reason }));
        self.close_user(id, Some(code), Some(reason))
    }

    /// Mark the socket closed, leave, then close the transport (destroying
    /// it when close fails).
    ///
    /// The departing user receives nothing after this point.
    pub fn close_user(&mut self, id: &UserId, code: Option<&str>, reason: Option<&str>) -> Result<(), LobbyError> {
        let Some(user) = self.users.get_mut(id) else {
            return Ok(());
        };
        let Some(transport) = user.transport() else {
            return Ok(());
        };
        user.mark_closed();
        self.leave_user(id, code, reason)?;
        if transport.close().is_err() {
            transport.destroy();
        }
        Ok(())
    }

    // ── Fan-out ─────────────────────────────────────────────────────────

    /// Notify each listed user. Delivery failures are logged.
    pub fn notify_ids(&mut self, ids: &[UserId], notification: &Notification) {
        for id in ids {
            if let Some(user) = self.users.get_mut(id) {
                if let Err(err) = user.notify(notification) {
                    debug!(user_id = %id, error = %err, "notification not delivered");
                }
            }
        }
    }

    /// Message each listed user. Delivery failures are logged.
    pub fn message_ids(&mut self, ids: &[UserId], message: &Message) {
        for id in ids {
            if let Some(user) = self.users.get_mut(id) {
                if let Err(err) = user.message(message) {
                    debug!(user_id = %id, error = %err, "message not delivered");
                }
            }
        }
    }

    fn lobby_ids(&self, exclude: &[UserId]) -> Vec<UserId> {
        self.users
            .values()
            .filter(|u| u.room.is_none() && !exclude.contains(&u.id))
            .map(|u| u.id.clone())
            .collect()
    }

    fn all_ids(&self, exclude: &[UserId]) -> Vec<UserId> {
        self.users
            .keys()
            .filter(|id| !exclude.contains(id))
            .cloned()
            .collect()
    }

    /// Notify users outside any room.
    pub fn notify(&mut self, notification: &Notification, exclude: &[UserId]) {
        let ids = self.lobby_ids(exclude);
        self.notify_ids(&ids, notification);
    }

    /// Notify every user.
    pub fn notify_all(&mut self, notification: &Notification, exclude: &[UserId]) {
        let ids = self.all_ids(exclude);
        self.notify_ids(&ids, notification);
    }

    /// Lobby-scope message to users outside any room.
    pub fn message(&mut self, sender: Value, content: Value, exclude: &[UserId]) -> Result<(), LobbyError> {
        if sender.is_null() {
            return Err(LobbyError::validation("Message requires a sender"));
        }
        let message = Message::new(sender, Value::Null, MessageKind::Lobby, content);
        let ids = self.lobby_ids(exclude);
        self.message_ids(&ids, &message);
        Ok(())
    }

    /// Lobby-scope message to every user.
    pub fn message_all(&mut self, sender: Value, content: Value, exclude: &[UserId]) -> Result<(), LobbyError> {
        if sender.is_null() {
            return Err(LobbyError::validation("Message requires a sender"));
        }
        let message = Message::new(sender, Value::Null, MessageKind::Lobby, content);
        let ids = self.all_ids(exclude);
        self.message_ids(&ids, &message);
        Ok(())
    }

    /// Write a frame unmodified to every user not excluded.
    pub fn broadcast_raw(&mut self, frame: &[u8], exclude: &[UserId]) -> usize {
        let mut delivered = 0;
        for user in self.users.values_mut().filter(|u| !exclude.contains(&u.id)) {
            match user.send_bytes(frame) {
                Ok(()) => delivered += 1,
                Err(err) => debug!(user_id = %user.id, error = %err, "raw frame not delivered"),
            }
        }
        delivered
    }

    // ── Info ────────────────────────────────────────────────────────────

    /// `{users, rooms}` counts.
    pub fn statistics(&self) -> Value {
        json!({
            "users": self.users.len(),
            "rooms": self.rooms.len(),
        })
    }

    /// User items: members of `room` in join order, or users outside rooms.
    pub fn user_list(&self, room: Option<&RoomId>) -> Vec<Value> {
        match room {
            Some(room) => self
                .rooms
                .get(room)
                .map(|r| {
                    r.users
                        .iter()
                        .filter_map(|id| self.users.get(id))
                        .map(User::item)
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .users
                .values()
                .filter(|u| u.room.is_none())
                .map(User::item)
                .collect(),
        }
    }

    /// Items of every visible room.
    pub fn room_list(&self) -> Vec<Value> {
        self.rooms
            .values()
            .filter(|r| r.visible && !r.closed)
            .map(Room::item)
            .collect()
    }

    // ── Methods ─────────────────────────────────────────────────────────

    /// Run a method as `caller`. Authorization must already have happened.
    pub fn run_method(&mut self, caller: &mut Caller, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        registry::dispatch(self, caller, method, params)
    }

    /// Run a method as the elevated server entity.
    pub fn run_as_server(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let mut caller = Caller::server();
        self.run_method(&mut caller, method, params)
    }

    /// Add or replace a method.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        self.methods.register(method, handler);
    }

    /// Remove a method. Returns whether it existed.
    pub fn unregister(&mut self, method: &str) -> bool {
        self.methods.unregister(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.methods.methods()
    }

    /// Send a server-initiated request and track the reply.
    ///
    /// Returns the id assigned by the user's counter.
    pub fn call(
        &mut self,
        id: &UserId,
        mut request: Request,
        callback: Option<ReplyCallback>,
    ) -> Result<u64, LobbyError> {
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| LobbyError::validation("No such user exists"))?;
        request.send_to(user).map_err(|_| LobbyError::InvalidSocket)?;
        user.pending
            .insert(request.id, request.method.clone(), callback, Instant::now());
        Ok(request.id)
    }
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("users", &self.users.len())
            .field("rooms", &self.rooms.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test harness
// ─────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{TestLobby, notices};
    use crate::transport::Outbound;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn connect_registers_member_and_announces() {
        let mut t = TestLobby::new();
        let a = t.connect();
        assert_eq!(notices(&t.take(&a)), vec!["You joined the server"]);
        let b = t.connect();
        assert_eq!(notices(&t.take(&a)), vec!["A user joined the server"]);
        assert_eq!(t.lobby.user(&b).unwrap().role(), Role::LobbyMember);
        assert_eq!(t.lobby.statistics(), json!({"users": 2, "rooms": 0}));
    }

    #[test]
    fn registry_rejects_duplicates_and_absent_ids() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let transport = t.lobby.user(&a).unwrap().transport().unwrap();
        let dup = User::new(a.clone(), "dup".into(), transport.clone(), Instant::now());
        assert_matches!(t.lobby.add_user(dup), Err(LobbyError::Invariant(_)));
        let empty = User::new(UserId::from(""), "x".into(), transport, Instant::now());
        assert_matches!(t.lobby.add_user(empty), Err(LobbyError::Invariant(_)));
        assert_matches!(
            t.lobby.remove_user(&UserId::from("ghost")),
            Err(LobbyError::Invariant(_))
        );
        assert_matches!(
            t.lobby.remove_room(&RoomId::from("ghost")),
            Err(LobbyError::Invariant(_))
        );
    }

    #[test]
    fn leave_twice_is_a_no_op() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        t.drain_all();

        t.lobby.leave_user(&a, None, None).unwrap();
        assert!(t.lobby.user(&a).is_none());
        assert_eq!(notices(&t.take(&b)), vec!["A user left the server"]);

        t.lobby.leave_user(&a, None, None).unwrap();
        assert!(t.take(&b).is_empty());
        assert_eq!(t.lobby.statistics()["users"], 1);
    }

    #[test]
    fn leave_from_room_clears_membership() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();

        t.lobby.leave_user(&b, None, None).unwrap();
        assert_eq!(t.lobby.room(&room).unwrap().users(), &[a]);
    }

    #[test]
    fn disconnect_announces_broken_connection() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let room = t.create_room(&b, "alpha");
        t.drain_all();

        t.lobby.disconnect(&a);
        assert!(t.lobby.user(&a).is_none());
        assert_eq!(
            notices(&t.take(&b)),
            vec!["A user unexpectedly disconnected from the server"]
        );

        t.lobby.disconnect(&b);
        assert!(t.lobby.room(&room).is_none());
    }

    #[test]
    fn kick_notifies_then_closes() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        t.drain_all();

        t.lobby.kick_user(&a, "spam").unwrap();
        assert!(t.lobby.user(&a).is_none());
        let raw = t.take_raw(&a);
        assert_matches!(raw.last(), Some(Outbound::Close));
        assert_eq!(
            notices(&t.take(&b)),
            vec!["A user was kicked from the server"]
        );
        assert_matches!(t.lobby.kick_user(&a, "again"), Err(LobbyError::Validation(_)));
    }

    #[test]
    fn close_mutes_the_departing_user() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();
        t.drain_all();

        t.lobby.close_user(&a, None, None).unwrap();
        assert_eq!(t.take_raw(&a), vec![Outbound::Close]);
        assert!(!t.take(&b).is_empty());
        assert!(t.lobby.user(&a).is_none());
    }

    #[test]
    fn find_by_id_or_name() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let name = t.lobby.user(&a).unwrap().name().to_owned();
        assert_eq!(t.lobby.find_user(&name).unwrap().id(), &a);
        assert_eq!(t.lobby.find_user(a.as_str()).unwrap().id(), &a);
        let room = t.create_room(&a, "alpha");
        assert_eq!(t.lobby.find_room("alpha").unwrap().id(), &room);
        assert!(t.lobby.find_room("beta").is_none());
    }

    #[test]
    fn lists_respect_scope_and_visibility() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let c = t.connect();
        let room = t.create_room(&a, "alpha");
        let _hidden = t.lobby.create_room(&b, Some("hidden"), false, None).unwrap();

        let lobby_users = t.lobby.user_list(None);
        assert_eq!(lobby_users.len(), 1);
        assert_eq!(lobby_users[0]["id"], c.as_str());
        assert_eq!(t.lobby.user_list(Some(&room))[0]["id"], a.as_str());

        let rooms = t.lobby.room_list();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0]["name"], "alpha");
    }

    #[test]
    fn remove_room_closes_first() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.remove_room(&room).unwrap();
        assert!(t.lobby.room(&room).is_none());
        assert!(t.lobby.user(&a).unwrap().room().is_none());
    }

    #[test]
    fn lobby_messages_skip_room_members() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let c = t.connect();
        let _room = t.create_room(&c, "alpha");
        t.drain_all();

        let sender = t.lobby.user(&a).unwrap().item();
        t.lobby.message(sender.clone(), json!("hi"), &[]).unwrap();
        assert_eq!(t.take(&a).len(), 1);
        assert_eq!(t.take(&b)[0]["params"][0]["type"], "lobby");
        assert!(t.take(&c).is_empty());

        t.lobby.message_all(sender, json!("all"), &[a.clone()]).unwrap();
        assert!(t.take(&a).is_empty());
        assert_eq!(t.take(&c)[0]["params"][0]["content"], "all");
    }

    #[test]
    fn broadcast_raw_is_unmodified() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        t.drain_all();

        let sent = t.lobby.broadcast_raw(b"relay{\"x\":1}", &[a.clone()]);
        assert_eq!(sent, 1);
        assert!(t.take_raw(&a).is_empty());
        assert_eq!(
            t.take_raw(&b),
            vec![Outbound::Bytes(bytes::Bytes::from_static(b"relay{\"x\":1}"))]
        );
    }

    #[test]
    fn call_tracks_reply() {
        let mut t = TestLobby::new();
        let a = t.connect();
        t.drain_all();

        let answered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&answered);
        let request = Request::new("ask", vec![json!("q")]).unwrap();
        let id = t
            .lobby
            .call(
                &a,
                request,
                Some(Box::new(move |_resp| flag.store(true, Ordering::SeqCst))),
            )
            .unwrap();

        let frames = t.take(&a);
        assert_eq!(frames[0]["id"], id);
        assert_eq!(frames[0]["method"], "ask");
        assert_eq!(t.lobby.user(&a).unwrap().pending.len(), 1);

        let reply = format!(r#"{{"id":{id},"error":null,"result":"ok","jsonrpc":"2.0"}}"#);
        let outcome = t.lobby.handle_frame(&a, reply.as_bytes());
        assert!(outcome.replies.is_empty());
        assert!(answered.load(Ordering::SeqCst));
        assert!(t.lobby.user(&a).unwrap().pending.is_empty());
        assert!(t.take(&a).is_empty());
    }

    #[test]
    fn server_entity_runs_privileged_methods() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let stats = t.lobby.run_as_server("show-stats", &[]).unwrap();
        assert_eq!(stats["users"], 1);
        t.lobby
            .run_as_server("kick", &[json!(a.as_str()), json!("maintenance")])
            .unwrap();
        assert!(t.lobby.user(&a).is_none());
    }

    #[test]
    fn options_follow_settings() {
        let mut settings = LobbySettings::default();
        settings.expiry.user_period_ms = 1_500;
        settings.lobby.owner_leave_action = OwnerLeaveAction::Close;
        let options = LobbyOptions::from(&settings);
        assert_eq!(options.user_period, Duration::from_millis(1_500));
        assert_eq!(options.owner_leave_action, OwnerLeaveAction::Close);
        assert!(!options.expire_rooms);
    }

    #[test]
    fn register_and_unregister_methods() {
        let mut t = TestLobby::new();
        let a = t.connect();
        t.lobby.register(
            "echo",
            |_: &mut Lobby, _: &mut Caller, params: &[Value]| -> Result<Value, RpcError> {
                Ok(params.first().cloned().unwrap_or(Value::Null))
            },
        );
        assert!(t.lobby.methods().contains(&"echo".to_string()));
        let mut caller = Caller::User(a);
        assert_eq!(
            t.lobby.run_method(&mut caller, "echo", &[json!(5)]).unwrap(),
            json!(5)
        );
        assert!(t.lobby.unregister("echo"));
        assert_matches!(
            t.lobby.run_method(&mut caller, "echo", &[]),
            Err(RpcError::MethodNotFound { .. })
        );
    }
}
