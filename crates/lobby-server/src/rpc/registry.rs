//! Method registry and synchronous dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lobby_rpc::RpcError;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use crate::lobby::{Caller, Lobby};
use crate::metrics::{RPC_ERRORS_TOTAL, RPC_REQUEST_DURATION_SECONDS, RPC_REQUESTS_TOTAL};
use crate::rpc::handlers::{messaging, roles, rooms, session, values};

/// Handlers taking longer than this are logged.
const SLOW_REQUEST: Duration = Duration::from_millis(250);

/// Trait implemented by every RPC method handler.
///
/// Handlers run with the lobby locked and must not block.
pub trait MethodHandler: Send + Sync {
    /// Execute the handler for `caller` with positional `params`.
    fn handle(&self, lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError>;
}

impl<F> MethodHandler for F
where
    F: Fn(&mut Lobby, &mut Caller, &[Value]) -> Result<Value, RpcError> + Send + Sync,
{
    fn handle(&self, lobby: &mut Lobby, caller: &mut Caller, params: &[Value]) -> Result<Value, RpcError> {
        self(lobby, caller, params)
    }
}

/// Signature of the built-in handlers.
pub type HandlerFn = fn(&mut Lobby, &mut Caller, &[Value]) -> Result<Value, RpcError>;

/// The closed set of methods every lobby starts with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    /// Refresh `last_active`.
    Heartbeat,
    /// Acknowledge a heartbeat probe.
    KeepAlive,
    /// Describe self or another user.
    Identify,
    /// Answer with a `pong` request.
    Ping,
    /// Ignored.
    Pong,
    /// Read user or room data.
    GetValue,
    /// Write user or room data.
    SetValue,
    /// Leave the server.
    Leave,
    /// Send a chat message.
    Message,
    /// Always rejected.
    SetRole,
    /// Grant a role.
    UpgradeRole,
    /// Revoke a role.
    DowngradeRole,
    /// Current role of a user.
    GetRole,
    /// Roles available to a user.
    GetRoles,
    /// Transfer room ownership.
    SetOwner,
    /// Grant `room.admin`.
    SetAdmin,
    /// Revoke `room.admin`.
    UnsetAdmin,
    /// Remove a user from the room or server.
    Kick,
    /// Users in scope.
    ListUsers,
    /// Create and join a room.
    CreateRoom,
    /// Visible rooms.
    ListRooms,
    /// Whether a room exists.
    CheckRoom,
    /// Join a room.
    JoinRoom,
    /// Leave the current room.
    LeaveRoom,
    /// Close the current room.
    CloseRoom,
    /// User and room counts.
    ShowStats,
}

impl BuiltinMethod {
    /// Every built-in method.
    pub const ALL: [BuiltinMethod; 26] = [
        Self::Heartbeat,
        Self::KeepAlive,
        Self::Identify,
        Self::Ping,
        Self::Pong,
        Self::GetValue,
        Self::SetValue,
        Self::Leave,
        Self::Message,
        Self::SetRole,
        Self::UpgradeRole,
        Self::DowngradeRole,
        Self::GetRole,
        Self::GetRoles,
        Self::SetOwner,
        Self::SetAdmin,
        Self::UnsetAdmin,
        Self::Kick,
        Self::ListUsers,
        Self::CreateRoom,
        Self::ListRooms,
        Self::CheckRoom,
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::CloseRoom,
        Self::ShowStats,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::KeepAlive => "keep-alive",
            Self::Identify => "identify",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::GetValue => "get-value",
            Self::SetValue => "set-value",
            Self::Leave => "leave",
            Self::Message => "message",
            Self::SetRole => "set-role",
            Self::UpgradeRole => "upgrade-role",
            Self::DowngradeRole => "downgrade-role",
            Self::GetRole => "get-role",
            Self::GetRoles => "get-roles",
            Self::SetOwner => "set-owner",
            Self::SetAdmin => "set-admin",
            Self::UnsetAdmin => "unset-admin",
            Self::Kick => "kick",
            Self::ListUsers => "list-users",
            Self::CreateRoom => "create-room",
            Self::ListRooms => "list-rooms",
            Self::CheckRoom => "check-room",
            Self::JoinRoom => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::CloseRoom => "close-room",
            Self::ShowStats => "show-stats",
        }
    }

    /// The handler function.
    pub fn handler(self) -> HandlerFn {
        match self {
            Self::Heartbeat => session::heartbeat,
            Self::KeepAlive => session::keep_alive,
            Self::Identify => session::identify,
            Self::Ping => session::ping,
            Self::Pong => session::pong,
            Self::GetValue => values::get_value,
            Self::SetValue => values::set_value,
            Self::Leave => session::leave,
            Self::Message => messaging::message,
            Self::SetRole => roles::set_role,
            Self::UpgradeRole => roles::upgrade_role,
            Self::DowngradeRole => roles::downgrade_role,
            Self::GetRole => roles::get_role,
            Self::GetRoles => roles::get_roles,
            Self::SetOwner => rooms::set_owner,
            Self::SetAdmin => rooms::set_admin,
            Self::UnsetAdmin => rooms::unset_admin,
            Self::Kick => rooms::kick,
            Self::ListUsers => rooms::list_users,
            Self::CreateRoom => rooms::create_room,
            Self::ListRooms => rooms::list_rooms,
            Self::CheckRoom => rooms::check_room,
            Self::JoinRoom => rooms::join_room,
            Self::LeaveRoom => rooms::leave_room,
            Self::CloseRoom => rooms::close_room,
            Self::ShowStats => session::show_stats,
        }
    }
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry holding every [`BuiltinMethod`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for method in BuiltinMethod::ALL {
            registry.register(method.name(), method.handler());
        }
        registry
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Remove a method. Returns whether it was registered.
    pub fn unregister(&mut self, method: &str) -> bool {
        self.handlers.remove(method).is_some()
    }

    /// The handler for `method`.
    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).cloned()
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `method` on behalf of `caller`, recording metrics.
pub fn dispatch(lobby: &mut Lobby, caller: &mut Caller, method: &str, params: &[Value]) -> Result<Value, RpcError> {
    counter!(RPC_REQUESTS_TOTAL, "method" => method.to_owned()).increment(1);

    let Some(handler) = lobby.methods.get(method) else {
        counter!(RPC_ERRORS_TOTAL, "method" => method.to_owned(), "error_type" => "method_not_found").increment(1);
        return Err(RpcError::MethodNotFound {
            method: method.to_owned(),
        });
    };

    let start = std::time::Instant::now();
    let result = handler.handle(lobby, caller, params);
    if let Err(err) = &result {
        counter!(RPC_ERRORS_TOTAL, "method" => method.to_owned(), "error_type" => err.kind()).increment(1);
    }

    let duration = start.elapsed();
    histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.to_owned()).record(duration.as_secs_f64());
    if duration >= SLOW_REQUEST {
        warn!(
            method,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "slow RPC request"
        );
    }

    result
}
