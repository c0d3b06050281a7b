//! Lobby events: outward notifications and internal observers.
//!
//! Every state change of interest is emitted as a named event. The notifier
//! table turns an event into at most two notifications: a *local* one for
//! the user who caused it and a *broadcast* one whose audience is chosen by
//! [`Depth`]. Observers registered with [`Lobby::on`] then see an immutable
//! [`LobbyEvent`] record, whether or not the event is mapped.

use std::collections::BTreeMap;

use lobby_core::utils::format_placeholders;
use lobby_core::{RoomId, UserId};
use lobby_rpc::Notification;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::lobby::Lobby;

/// Audience of a broadcast notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Nobody beyond the instigator.
    None,
    /// Only the instigator.
    User,
    /// Members of the instigator's room.
    Room,
    /// Users outside any room.
    Lobby,
    /// Every user.
    All,
}

/// How an event is announced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotifier {
    /// Text sent to the instigating user.
    pub local: Option<String>,
    /// Text sent to the audience selected by `depth`.
    pub broadcast: Option<String>,
    /// Broadcast audience.
    pub depth: Depth,
}

impl EventNotifier {
    fn new(local: Option<&str>, broadcast: Option<&str>, depth: Depth) -> Self {
        Self {
            local: local.map(str::to_owned),
            broadcast: broadcast.map(str::to_owned),
            depth,
        }
    }
}

/// The built-in notifier table.
pub fn default_notifiers() -> BTreeMap<String, EventNotifier> {
    let entries = [
        (
            "user-connected",
            EventNotifier::new(
                Some("You successfully connected to the server"),
                Some("A user connected to the server"),
                Depth::Lobby,
            ),
        ),
        (
            "user-disconnected",
            EventNotifier::new(
                Some("You have disconnected from the server"),
                Some("A user has disconnected from the server"),
                Depth::Lobby,
            ),
        ),
        (
            "user-broken-connection",
            EventNotifier::new(
                None,
                Some("A user unexpectedly disconnected from the server"),
                Depth::All,
            ),
        ),
        (
            "user-leave",
            EventNotifier::new(Some("You left the server"), Some("A user left the server"), Depth::Lobby),
        ),
        (
            "user-join",
            EventNotifier::new(Some("You joined the server"), Some("A user joined the server"), Depth::Lobby),
        ),
        (
            "user-change",
            EventNotifier::new(Some("Your user details have been updated"), None, Depth::User),
        ),
        (
            "user-relocated",
            EventNotifier::new(None, Some("A user joined a room"), Depth::Lobby),
        ),
        (
            "user-kick",
            EventNotifier::new(
                Some("You have been kicked from the server"),
                Some("A user was kicked from the server"),
                Depth::All,
            ),
        ),
        (
            "user-timeout",
            EventNotifier::new(
                Some("You have been kicked from the server (reason: inactive)"),
                Some("A user was kicked from the server (reason: inactive)"),
                Depth::All,
            ),
        ),
        (
            "room-create",
            EventNotifier::new(Some("The room was successfully created"), None, Depth::None),
        ),
        (
            "room-close",
            EventNotifier::new(Some("The room was closed"), Some("The room has been closed"), Depth::Room),
        ),
        (
            "room-join",
            EventNotifier::new(
                Some("You have successfully joined the room"),
                Some("A user has joined the room"),
                Depth::Room,
            ),
        ),
        (
            "room-leave",
            EventNotifier::new(Some("You left the room"), Some("A user left the room"), Depth::Room),
        ),
        (
            "room-change",
            EventNotifier::new(
                Some("You've successfully changed the room configuration"),
                None,
                Depth::None,
            ),
        ),
        (
            "room-kick",
            EventNotifier::new(
                Some("You have been kicked from the room"),
                Some("A user was kicked from the room"),
                Depth::Room,
            ),
        ),
        (
            "room-owner-change",
            EventNotifier::new(
                Some("The room owner has changed"),
                Some("The room owner has changed"),
                Depth::Room,
            ),
        ),
    ];
    entries
        .into_iter()
        .map(|(name, notifier)| (name.to_owned(), notifier))
        .collect()
}

/// What caused an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventSource {
    /// A user.
    User(UserId),
    /// A room acting on its own (closing, expiring).
    Room(RoomId),
}

/// Immutable record handed to observers.
#[derive(Clone, Debug, PartialEq)]
pub struct LobbyEvent {
    /// Event name, e.g. `room-join`.
    pub name: String,
    /// What caused it.
    pub source: EventSource,
    /// Payload including `user` / `room` item snapshots.
    pub data: Value,
}

/// Internal event observer.
pub type Observer = Box<dyn Fn(&LobbyEvent) + Send + Sync>;

/// Observer key matching every event.
pub const WILDCARD: &str = "*";

impl Lobby {
    /// Register an observer for `event`, or for every event with `"*"`.
    pub fn on(&mut self, event: impl Into<String>, observer: impl Fn(&LobbyEvent) + Send + Sync + 'static) {
        self.observers.push((event.into(), Box::new(observer)));
    }

    /// The notifier for `event`, if mapped.
    pub fn event_notifier(&self, event: &str) -> Option<&EventNotifier> {
        self.notifiers.get(event)
    }

    /// Map `event` to `notifier`, replacing any previous entry.
    pub fn set_event_notifier(&mut self, event: impl Into<String>, notifier: EventNotifier) {
        let _ = self.notifiers.insert(event.into(), notifier);
    }

    /// Whether `event` is mapped.
    pub fn has_event_notifier(&self, event: &str) -> bool {
        self.notifiers.contains_key(event)
    }

    /// Emit an event.
    ///
    /// `data` is extended with the instigating user's item and, for user
    /// events named `room-*`, the user's room item. Notifications go out
    /// when the event is mapped and notifications are enabled; observers
    /// always run.
    pub fn emit(&mut self, source: EventSource, event: &str, data: Value) {
        let mut data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_owned(), other)]),
        };

        let (instigator, room) = match &source {
            EventSource::User(id) => {
                let Some(user) = self.users.get(id) else {
                    debug!(user_id = %id, event, "event source is not registered, dropped");
                    return;
                };
                let _ = data.insert("user".to_owned(), user.item());
                let room = if event.starts_with("room-") {
                    user.room.clone().or_else(|| room_in_data(&data))
                } else {
                    None
                };
                (Some(id.clone()), room)
            }
            EventSource::Room(id) => (None, Some(id.clone())),
        };
        let room = room.filter(|id| self.rooms.contains_key(id));
        if let Some(room) = room.as_ref().and_then(|id| self.rooms.get(id)) {
            let _ = data.insert("room".to_owned(), room.item());
        }

        let record = LobbyEvent {
            name: event.to_owned(),
            source,
            data: Value::Object(data),
        };

        if self.options.notify_events {
            match self.notifiers.get(event).cloned() {
                Some(notifier) => {
                    self.announce(&record, &notifier, instigator.as_ref(), room.as_ref());
                }
                None => debug!(event, "no notifier for event"),
            }
        }

        for (name, observer) in &self.observers {
            if name == event || name == WILDCARD {
                observer(&record);
            }
        }
    }

    fn announce(
        &mut self,
        record: &LobbyEvent,
        notifier: &EventNotifier,
        instigator: Option<&UserId>,
        room: Option<&RoomId>,
    ) {
        let user_name = record.data["user"]["name"].as_str().unwrap_or_default().to_owned();
        let room_name = record.data["room"]["name"].as_str().unwrap_or_default().to_owned();
        let render = |text: &Option<String>| {
            let template = text
                .as_deref()
                .filter(|t| !t.is_empty())
                .map_or_else(|| format!("Event {} was raised", record.name), str::to_owned);
            format_placeholders(&template, &[&user_name, &room_name])
        };

        if let (Some(id), Some(_)) = (instigator, &notifier.local) {
            let notification = Notification::new(&record.name, render(&notifier.local), record.data.clone());
            if let Some(user) = self.users.get_mut(id) {
                if let Err(err) = user.notify(&notification) {
                    debug!(user_id = %id, error = %err, "local notification failed");
                }
            }
        }

        if notifier.broadcast.is_some() {
            let targets = self.audience(notifier.depth, instigator, room);
            let notification = Notification::new(&record.name, render(&notifier.broadcast), record.data.clone());
            self.notify_ids(&targets, &notification);
        }
    }

    /// Users reached by a broadcast at `depth`.
    pub(crate) fn audience(&self, depth: Depth, instigator: Option<&UserId>, room: Option<&RoomId>) -> Vec<UserId> {
        let not_instigator = |id: &&UserId| Some(*id) != instigator;
        match depth {
            Depth::None | Depth::User => Vec::new(),
            Depth::Room => room
                .and_then(|id| self.rooms.get(id))
                .map(|room| room.users.iter().filter(not_instigator).cloned().collect())
                .unwrap_or_default(),
            Depth::Lobby => self
                .users
                .values()
                .filter(|user| user.room.is_none())
                .map(|user| &user.id)
                .filter(not_instigator)
                .cloned()
                .collect(),
            Depth::All => self.users.keys().filter(not_instigator).cloned().collect(),
        }
    }
}

fn room_in_data(data: &Map<String, Value>) -> Option<RoomId> {
    data.get("room")?
        .get("id")?
        .as_str()
        .map(RoomId::from)
}
