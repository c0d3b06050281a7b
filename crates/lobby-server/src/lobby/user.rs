//! Connected user state and single-recipient sends.

use std::sync::Arc;

use lobby_core::{Role, RoleStack, RoomId, UserId};
use lobby_rpc::{Message, Notification, Recipient, SendError, Sendable};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{LobbyError, TransportError};
use crate::lobby::pending::PendingCalls;
use crate::transport::Transport;

/// Id of the synthetic server entity.
pub const SERVER_ID: &str = "server";

/// Connection state of a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketStatus {
    /// Frames may be sent.
    Open,
    /// Terminal.
    Closed,
}

/// A connected client.
pub struct User {
    pub(crate) id: UserId,
    transport: Option<Arc<dyn Transport>>,
    status: SocketStatus,
    disabled: bool,
    pub(crate) data: Value,
    pub(crate) roles: RoleStack,
    pub(crate) room: Option<RoomId>,
    message_id: u64,
    pub(crate) last_active: Instant,
    created: Instant,
    pub(crate) pulse: bool,
    pub(crate) pending: PendingCalls,
}

impl User {
    /// Create an open, unregistered user.
    pub fn new(id: UserId, name: String, transport: Arc<dyn Transport>, now: Instant) -> Self {
        Self {
            id,
            transport: Some(transport),
            status: SocketStatus::Open,
            disabled: false,
            data: json!({ "name": name }),
            roles: RoleStack::new(),
            room: None,
            message_id: 0,
            last_active: now,
            created: now,
            pulse: true,
            pending: PendingCalls::default(),
        }
    }

    /// The elevated entity used for server-initiated method calls.
    ///
    /// Holds every role with `lobby.superuser` current, has no transport,
    /// and is never registered.
    pub fn server_entity(now: Instant) -> Self {
        let history = Role::ALL
            .into_iter()
            .filter(|role| *role != Role::LobbySuperuser)
            .collect();
        Self {
            id: UserId::from(SERVER_ID),
            transport: None,
            status: SocketStatus::Closed,
            disabled: true,
            data: json!({ "name": SERVER_ID }),
            roles: RoleStack::with_history(Role::LobbySuperuser, history),
            room: None,
            message_id: 0,
            last_active: now,
            created: now,
            pulse: true,
            pending: PendingCalls::default(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Unique id.
    pub fn id(&self) -> &UserId {
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

    /// Current role.
    pub fn role(&self) -> Role {
        self.roles.current()
    }

    /// The full role stack.
    pub fn roles(&self) -> &RoleStack {
        &self.roles
    }

    /// Room the user is in, if any.
    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    /// Socket status.
    pub fn status(&self) -> SocketStatus {
        self.status
    }

    /// Whether outbound frames are muted.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Last time the user sent a frame.
    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// The transport handle, if any.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub(crate) fn mark_closed(&mut self) {
        self.status = SocketStatus::Closed;
    }

    /// Refresh `last_active`.
    pub fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    // ── Roles ───────────────────────────────────────────────────────────

    /// Make `role` current, pushing the previous one.
    pub fn upgrade_role(&mut self, role: Role) {
        self.roles.upgrade(role);
    }

    /// Remove `role` from the stack.
    pub fn destroy_role(&mut self, role: Role) -> bool {
        self.roles.destroy(role)
    }

    /// Whether `role` is current or in the history.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.has(role)
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Mute outbound frames.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    /// Unmute outbound frames.
    pub fn enable(&mut self) {
        self.disabled = false;
    }

    /// Send one text frame, newline-terminated.
    ///
    /// A no-op while disabled or closed. Full or closed queues are logged,
    /// not raised.
    pub fn send(&mut self, text: &str) -> Result<(), LobbyError> {
        let Some(transport) = self.writable()? else {
            return Ok(());
        };
        let line = format!("{text}\n");
        let sent = match transport.send_text(&line) {
            Err(TransportError::Unsupported) => transport.write_bytes(line.as_bytes()),
            other => other,
        };
        self.settle(sent)
    }

    /// Pass a raw frame through unmodified.
    ///
    /// Message transports get it as one binary frame. Stream transports get
    /// it newline-terminated, unless it already ends with a newline.
    pub fn send_bytes(&mut self, frame: &[u8]) -> Result<(), LobbyError> {
        let Some(transport) = self.writable()? else {
            return Ok(());
        };
        let sent = match transport.send_binary(frame) {
            Err(TransportError::Unsupported) if frame.ends_with(b"\n") => transport.write_bytes(frame),
            Err(TransportError::Unsupported) => {
                let mut line = Vec::with_capacity(frame.len() + 1);
                line.extend_from_slice(frame);
                line.push(b'\n');
                transport.write_bytes(&line)
            }
            other => other,
        };
        self.settle(sent)
    }

    fn writable(&self) -> Result<Option<Arc<dyn Transport>>, LobbyError> {
        if self.disabled || self.status != SocketStatus::Open {
            return Ok(None);
        }
        self.transport.clone().map(Some).ok_or(LobbyError::InvalidSocket)
    }

    fn settle(&self, sent: Result<(), TransportError>) -> Result<(), LobbyError> {
        match sent {
            Ok(()) => Ok(()),
            Err(TransportError::Unsupported) => Err(LobbyError::InvalidSocket),
            Err(err) => {
                debug!(user_id = %self.id, error = %err, "frame not delivered");
                Ok(())
            }
        }
    }

    /// Send a notification to this user.
    pub fn notify(&mut self, notification: &Notification) -> Result<u64, LobbyError> {
        notification.send_to(self).map_err(send_error)
    }

    /// Send a chat message to this user. The message must name a sender.
    pub fn message(&mut self, message: &Message) -> Result<u64, LobbyError> {
        if message.from.is_null() {
            return Err(LobbyError::validation("Message requires a sender"));
        }
        message.send_to(self).map_err(send_error)
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Wire snapshot `{id, name, type}`.
    pub fn item(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name(),
            "type": "user",
        })
    }

    /// Detailed diagnostics snapshot.
    pub fn export(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name(),
            "type": "user",
            "data": self.data,
            "role": self.roles.current(),
            "history": self.roles.history(),
            "room": self.room,
            "status": self.status,
            "disabled": self.disabled,
            "pending": self.pending.len(),
            "idle_ms": u64::try_from(self.last_active.elapsed().as_millis()).unwrap_or(u64::MAX),
            "age_ms": u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

fn send_error(err: SendError) -> LobbyError {
    match err {
        SendError::InvalidSocket => LobbyError::InvalidSocket,
        SendError::Encode(e) => LobbyError::invariant(format!("failed to encode message: {e}")),
    }
}

impl Recipient for User {
    fn next_message_id(&mut self) -> u64 {
        self.message_id += 1;
        self.message_id
    }

    fn send_text(&mut self, text: &str) -> Result<(), SendError> {
        self.send(text).map_err(|_| SendError::InvalidSocket)
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("role", &self.roles.current())
            .field("room", &self.room)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
