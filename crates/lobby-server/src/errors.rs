//! Lobby and transport error types.

use lobby_rpc::RpcError;
use thiserror::Error;

/// Failure of a lobby, room, or user operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// A caller-supplied value or request violates a domain rule.
    #[error("{0}")]
    Validation(String),

    /// A required parameter is missing or has the wrong type.
    #[error("{0}")]
    InvalidParams(String),

    /// Internal bookkeeping was asked to do something impossible
    /// (duplicate or absent registry ids, illegitimate close referer).
    #[error("{0}")]
    Invariant(String),

    /// The user's transport offers no way to write.
    #[error("Invalid user socket")]
    InvalidSocket,
}

impl LobbyError {
    /// Shorthand for [`LobbyError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build an invariant error and log it at error level.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "lobby invariant violated");
        Self::Invariant(message)
    }
}

impl From<LobbyError> for RpcError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::InvalidParams(message) => RpcError::InvalidParams { message },
            other => RpcError::application(other.to_string()),
        }
    }
}

/// Failure of a single transport primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport does not implement this primitive.
    #[error("operation not supported by this transport")]
    Unsupported,
    /// The connection's outbound queue is full.
    #[error("outbound queue full")]
    Full,
    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobby_rpc::errors::{APPLICATION_ERROR, INVALID_PARAMS};

    #[test]
    fn validation_maps_to_application_error() {
        let rpc: RpcError = LobbyError::validation("Room already exists").into();
        let body = rpc.to_error_object();
        assert_eq!(body.code, APPLICATION_ERROR);
        assert_eq!(body.message, "Room already exists");
    }

    #[test]
    fn invalid_params_keeps_code() {
        let rpc: RpcError = LobbyError::InvalidParams("A key must be provided".into()).into();
        assert_eq!(rpc.code(), INVALID_PARAMS);
    }

    #[test]
    fn invariant_surfaces_as_application_error() {
        let rpc: RpcError = LobbyError::invariant("User already exists").into();
        assert_eq!(rpc.code(), APPLICATION_ERROR);
        assert_eq!(rpc.to_string(), "User already exists");
    }

    #[test]
    fn invalid_socket_display() {
        assert_eq!(LobbyError::InvalidSocket.to_string(), "Invalid user socket");
    }
}
