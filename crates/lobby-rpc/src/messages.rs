//! Server-pushed request kinds.
//!
//! A [`Notification`] is a `notify` request describing an event; a
//! [`Message`] is a `message` request carrying chat content between users,
//! rooms, and the lobby. Both are rebuilt into a fresh [`Request`] per
//! recipient so every recipient sees its own id.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::recipient::{Recipient, SendError};
use crate::types::Request;

/// Method name of event notifications.
pub const METHOD_NOTIFY: &str = "notify";
/// Method name of chat messages.
pub const METHOD_MESSAGE: &str = "message";
/// Method name of the ping request.
pub const METHOD_PING: &str = "ping";
/// Method name of the pong request.
pub const METHOD_PONG: &str = "pong";
/// Method name of the heartbeat probe sent by the server.
pub const METHOD_KEEP_ALIVE_PROBE: &str = "keep-alive?";
/// Acknowledgement of a heartbeat probe, as a method name or a result value.
pub const KEEP_ALIVE: &str = "keep-alive";

/// Anything that renders to a request for delivery.
pub trait Sendable {
    /// Build the request to send.
    fn to_request(&self) -> Request;

    /// Send to one recipient, returning the id it assigned.
    fn send_to<R: Recipient + ?Sized>(&self, target: &mut R) -> Result<u64, SendError> {
        let mut request = self.to_request();
        request.send_to(target)?;
        Ok(request.id)
    }
}

impl Request {
    /// A `ping` request.
    pub fn ping() -> Self {
        Self::bare(METHOD_PING)
    }

    /// A `pong` request.
    pub fn pong() -> Self {
        Self::bare(METHOD_PONG)
    }

    /// The heartbeat probe.
    pub fn keep_alive_probe() -> Self {
        Self::bare(METHOD_KEEP_ALIVE_PROBE)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// An event notification: `notify` with params `[{code, message, data}]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Event code (usually the event name).
    pub code: String,
    /// Human-readable text.
    pub message: String,
    /// Event payload. Arrays are wrapped as `{ "data": [...] }`.
    pub data: Value,
}

impl Notification {
    /// Build a notification.
    pub fn new(code: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Array(items) => json!({ "data": items }),
            other => other,
        };
        Self {
            code: code.into(),
            message: message.into(),
            data,
        }
    }
}

impl Sendable for Notification {
    fn to_request(&self) -> Request {
        let mut request = Request::bare(METHOD_NOTIFY);
        request.params = vec![json!({
            "code": self.code,
            "message": self.message,
            "data": self.data,
        })];
        request
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// Scope of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Sent to every member of a room.
    Room,
    /// Sent to a single user.
    User,
    /// Sent to the lobby.
    Lobby,
}

/// A chat message: `message` with params `[{content, from, date, for, type}]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Arbitrary content supplied by the sender.
    pub content: Value,
    /// Sender item snapshot.
    pub from: Value,
    /// Creation time, epoch milliseconds.
    pub date: i64,
    /// Receiver item snapshot, `null` for lobby scope.
    #[serde(rename = "for")]
    pub receiver: Value,
    /// Message scope.
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(from: Value, receiver: Value, kind: MessageKind, content: Value) -> Self {
        Self {
            content,
            from,
            date: chrono::Utc::now().timestamp_millis(),
            receiver,
            kind,
        }
    }
}

impl Sendable for Message {
    fn to_request(&self) -> Request {
        let mut request = Request::bare(METHOD_MESSAGE);
        request.params = vec![serde_json::to_value(self).unwrap_or(Value::Null)];
        request
    }
}
