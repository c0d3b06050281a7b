//! Session handlers: liveness, identity, leave, stats.

use lobby_rpc::{Request, RpcError};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::lobby::{Caller, Lobby};
use crate::rpc::handlers::caller_user;
use crate::rpc::validation::opt_str;

/// Refresh the caller's `last_active`.
#[instrument(skip_all, fields(method = "heartbeat"))]
pub fn heartbeat(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    if let Some(user) = lobby.entity_mut(caller) {
        user.touch(Instant::now());
    }
    Ok(Value::Null)
}

/// Acknowledge the heartbeat probe.
#[instrument(skip_all, fields(method = "keep-alive"))]
pub fn keep_alive(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    if let Some(user) = lobby.entity_mut(caller) {
        user.pulse = true;
    }
    Ok(Value::Null)
}

/// Describe the caller or another user in the same room.
#[instrument(skip_all, fields(method = "identify"))]
pub fn identify(lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
    let me = caller_user(lobby, caller)?;
    let target = match opt_str(params, 0) {
        Some(key) => lobby
            .find_user(key)
            .ok_or_else(|| RpcError::application("No such user exists"))?,
        None => me,
    };
    if target.id() != me.id() && target.room() != me.room() && !caller.is_server() {
        return Err(RpcError::application(
            "You can only grab user information from the same room",
        ));
    }

    let mut result = target.item();
    if let Some(room) = target.room().and_then(|id| lobby.room(id)) {
        result["room"] = room.item();
    }
    result["role"] = json!(target.role());
    Ok(result)
}

/// Reply with a `pong` request.
#[instrument(skip_all, fields(method = "ping"))]
pub fn ping(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    if let Some(user) = lobby.entity_mut(caller) {
        if let Err(err) = Request::pong().send_to(user) {
            debug!(error = %err, "pong not delivered");
        }
    }
    Ok(Value::Null)
}

/// Ignored.
#[instrument(skip_all, fields(method = "pong"))]
pub fn pong(_lobby: &mut Lobby, _caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    Ok(Value::Null)
}

/// Leave the server peacefully. The connection closes after the reply.
#[instrument(skip_all, fields(method = "leave"))]
pub fn leave(lobby: &mut Lobby, caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    if let Caller::User(id) = caller {
        lobby.leave_user(id, None, None)?;
    }
    Ok(Value::Null)
}

/// `{users, rooms}`.
#[instrument(skip_all, fields(method = "show-stats"))]
pub fn show_stats(lobby: &mut Lobby, _caller: &mut Caller, _params: &[Value]) -> Result<Value, RpcError> {
    Ok(lobby.statistics())
}
