//! The `message` method.

use lobby_rpc::{Message, MessageKind, RpcError};
use serde_json::Value;
use tracing::instrument;

use crate::lobby::{Caller, Lobby};
use crate::rpc::handlers::caller_user;
use crate::rpc::validation::param;

/// Post `{for: {type, id}, content}` to a room, a user or the lobby.
#[instrument(skip_all, fields(method = "message"))]
pub fn message(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let Some(message) = param(params, 0) else {
        return Err(RpcError::invalid_params("Message is required"));
    };
    let Some(message) = message.as_object() else {
        return Err(RpcError::invalid_params("Message must be an object"));
    };
    let Some(target) = message.get("for").filter(|v| !v.is_null()) else {
        return Err(RpcError::invalid_params("Message must have a recipient"));
    };
    let Some(content) = message.get("content").filter(|v| !v.is_null()).cloned() else {
        return Err(RpcError::invalid_params("Message must contain data"));
    };
    let target_id = target.get("id").and_then(Value::as_str).unwrap_or_default();

    let sender = caller_user(lobby, caller)?;
    let from = sender.item();
    let room = sender.room().cloned();

    match target.get("type").and_then(Value::as_str) {
        Some("room") => {
            let Some(room_id) = room else {
                return Err(RpcError::application("User is not in a room!"));
            };
            let matches = lobby
                .room(&room_id)
                .is_some_and(|r| r.id().as_str() == target_id || r.name() == target_id);
            if !matches {
                return Err(RpcError::application("Message cannot be sent to this room"));
            }
            lobby.room_message(&room_id, from, content, &[])?;
        }
        Some("user") => {
            let Some(recipient) = lobby.find_user(target_id) else {
                return Err(RpcError::application("Recipient user does not exist"));
            };
            let id = recipient.id().clone();
            let message = Message::new(from, recipient.item(), MessageKind::User, content);
            lobby.message_ids(&[id], &message);
        }
        _ => lobby.message(from, content, &[])?,
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::testing::TestLobby;
    use crate::rpc::handlers::test_helpers::{call, call_err};
    use serde_json::json;

    fn messages(frames: &[Value]) -> Vec<&Value> {
        frames
            .iter()
            .filter(|f| f["method"] == "message")
            .map(|f| &f["params"][0])
            .collect()
    }

    #[test]
    fn malformed_messages_are_invalid_params() {
        let mut t = TestLobby::new();
        let a = t.connect();
        for (params, text) in [
            (vec![], "Message is required"),
            (vec![json!("hi")], "Message must be an object"),
            (vec![json!({"content": "hi"})], "Message must have a recipient"),
            (vec![json!({"for": {"type": "lobby"}})], "Message must contain data"),
        ] {
            let err = call(&mut t, &a, "message", &params).unwrap_err();
            assert_eq!(err.code(), lobby_rpc::errors::INVALID_PARAMS);
            assert_eq!(err.to_string(), text);
        }
    }

    #[test]
    fn room_messages_reach_members_including_sender() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let c = t.connect();
        let room = t.create_room(&a, "alpha");
        t.lobby.join_room(&room, &b, None).unwrap();
        t.drain_all();

        let params = [json!({"for": {"type": "room", "id": "alpha"}, "content": {"data": "hi"}})];
        let _ = call(&mut t, &b, "message", &params).unwrap();

        for id in [&a, &b] {
            let frames = t.take(id);
            let received = messages(&frames);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0]["type"], "room");
            assert_eq!(received[0]["from"]["id"], b.as_str());
            assert_eq!(received[0]["for"]["id"], room.as_str());
            assert_eq!(received[0]["content"]["data"], "hi");
        }
        assert!(messages(&t.take(&c)).is_empty());
    }

    #[test]
    fn room_messages_are_scoped_to_own_room() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let _ = t.create_room(&a, "alpha");
        let params = [json!({"for": {"type": "room", "id": "beta"}, "content": 1})];
        assert_eq!(call_err(&mut t, &a, "message", &params), "Message cannot be sent to this room");
        assert_eq!(call_err(&mut t, &b, "message", &params), "User is not in a room!");
    }

    #[test]
    fn direct_messages() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        t.drain_all();

        let params = [json!({"for": {"type": "user", "id": b.as_str()}, "content": "psst"})];
        let _ = call(&mut t, &a, "message", &params).unwrap();
        let frames = t.take(&b);
        let received = messages(&frames);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "user");
        assert_eq!(received[0]["for"]["id"], b.as_str());
        assert!(t.take(&a).is_empty());

        let params = [json!({"for": {"type": "user", "id": "ghost"}, "content": "psst"})];
        assert_eq!(call_err(&mut t, &a, "message", &params), "Recipient user does not exist");
    }

    #[test]
    fn other_targets_go_to_the_lobby() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let c = t.connect();
        let _ = t.create_room(&c, "alpha");
        t.drain_all();

        let params = [json!({"for": {"type": "everyone"}, "content": "hello"})];
        let _ = call(&mut t, &a, "message", &params).unwrap();
        assert_eq!(messages(&t.take(&a)).len(), 1);
        assert_eq!(messages(&t.take(&b))[0]["type"], "lobby");
        assert!(t.take(&c).is_empty());
    }
}
