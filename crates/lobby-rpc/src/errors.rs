//! RPC error codes and error type.

use serde_json::{Value, json};

use crate::types::ErrorObject;

// ── Error code constants ────────────────────────────────────────────

/// Frame could not be decoded.
pub const PARSE_ERROR: i64 = -32700;
/// Method is not registered.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters missing or of the wrong type.
pub const INVALID_PARAMS: i64 = -32602;
/// Caller's role does not permit the method.
pub const UNAUTHORIZED: i64 = -32403;
/// Any other failure raised by a handler.
pub const APPLICATION_ERROR: i64 = -32500;

/// RPC error type returned by handlers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Undecodable or malformed frame.
    #[error("{message}")]
    Parse {
        /// Description.
        message: String,
    },

    /// Requested method is not registered.
    #[error("No such method exists")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Caller's current role does not allow the method.
    #[error("You do not have permission to call '{method}'")]
    Unauthorized {
        /// Requested method name.
        method: String,
    },

    /// Domain rule violated.
    #[error("{message}")]
    Application {
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl RpcError {
    /// Application error without structured data.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
            data: None,
        }
    }

    /// Invalid-parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// The generic parse failure sent for undecodable frames.
    pub fn invalid_syntax() -> Self {
        Self::Parse {
            message: "Invalid Syntax".into(),
        }
    }

    /// Numeric wire code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::Application { .. } => APPLICATION_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Application { .. } => "application",
        }
    }

    /// Convert to the wire-format error object.
    pub fn to_error_object(&self) -> ErrorObject {
        let data = match self {
            Self::MethodNotFound { method } | Self::Unauthorized { method } => {
                Some(json!({ "method": method }))
            }
            Self::Application { data, .. } => data.clone(),
            Self::Parse { .. } | Self::InvalidParams { .. } => None,
        };
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<&RpcError> for ErrorObject {
    fn from(err: &RpcError) -> Self {
        err.to_error_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_per_variant() {
        assert_eq!(RpcError::invalid_syntax().code(), PARSE_ERROR);
        assert_eq!(
            RpcError::MethodNotFound { method: "x".into() }.code(),
            METHOD_NOT_FOUND
        );
        assert_eq!(RpcError::invalid_params("bad").code(), INVALID_PARAMS);
        assert_eq!(RpcError::Unauthorized { method: "kick".into() }.code(), UNAUTHORIZED);
        assert_eq!(RpcError::application("nope").code(), APPLICATION_ERROR);
    }

    #[test]
    fn method_not_found_body() {
        let body = RpcError::MethodNotFound {
            method: "fly".into(),
        }
        .to_error_object();
        assert_eq!(body.code, -32601);
        assert_eq!(body.message, "No such method exists");
        assert_eq!(body.data, Some(json!({"method": "fly"})));
    }

    #[test]
    fn application_keeps_data() {
        let err = RpcError::Application {
            message: "Room already exists".into(),
            data: Some(json!({"room": "alpha"})),
        };
        let body = ErrorObject::from(&err);
        assert_eq!(body.code, APPLICATION_ERROR);
        assert_eq!(body.message, "Room already exists");
        assert_eq!(body.data.unwrap()["room"], "alpha");
    }

    #[test]
    fn invalid_syntax_message() {
        let body = RpcError::invalid_syntax().to_error_object();
        assert_eq!(body.message, "Invalid Syntax");
        assert!(body.data.is_none());
    }

    #[test]
    fn kinds_are_snake_case() {
        for err in [
            RpcError::invalid_syntax(),
            RpcError::MethodNotFound { method: "a".into() },
            RpcError::invalid_params("b"),
            RpcError::Unauthorized { method: "c".into() },
            RpcError::application("d"),
        ] {
            assert!(err.kind().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
