//! Request and response envelopes.
//!
//! Both envelopes always serialize every field, including `null` ones, and
//! carry the `"jsonrpc": "2.0"` tag. Imports accept the tag either as the
//! string `"2.0"` or as the number `2.0`, which older clients send.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{APPLICATION_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::recipient::{Recipient, SendError};

/// Protocol tag written on every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

fn is_protocol_tag(value: &Value) -> bool {
    match value {
        Value::String(s) => s == JSONRPC_VERSION,
        Value::Number(n) => n.as_f64().is_some_and(|f| (f - 2.0).abs() < f64::EPSILON),
        _ => false,
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error object
// ─────────────────────────────────────────────────────────────────────────────

/// Structured error inside a [`Response`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Build an error object with an explicit code.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build an error object from free text, choosing the code by phrase.
    ///
    /// Parse/syntax failures map to `-32700`, unknown methods to `-32601`,
    /// invalid parameters to `-32602` and everything else to `-32500`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let code = if lower.contains("parse") || lower.contains("syntax") {
            PARSE_ERROR
        } else if lower.contains("no such method")
            || lower.contains("unknown method")
            || lower.contains("method not found")
        {
            METHOD_NOT_FOUND
        } else if lower.contains("invalid param") {
            INVALID_PARAMS
        } else {
            APPLICATION_ERROR
        };
        Self::new(code, message)
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// A method call, either inbound from a client or pushed by the server.
///
/// Outbound requests get their id from the recipient's own counter at send
/// time; until then the id is `0`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Request {
    /// Per-recipient request identifier.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Protocol tag.
    pub jsonrpc: String,
}

impl Request {
    /// Create an unsent request.
    ///
    /// Returns `None` when `method` is empty.
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Option<Self> {
        let method = method.into();
        if method.is_empty() {
            return None;
        }
        Some(Self {
            id: 0,
            method,
            params,
            jsonrpc: JSONRPC_VERSION.to_owned(),
        })
    }

    /// Create a parameterless request for a method name known to be non-empty.
    pub(crate) fn bare(method: &'static str) -> Self {
        Self {
            id: 0,
            method: method.to_owned(),
            params: Vec::new(),
            jsonrpc: JSONRPC_VERSION.to_owned(),
        }
    }

    /// Import a request from raw frame text.
    pub fn import(text: &str) -> Option<Self> {
        Self::from_value(&Value::Object(parse_object(text)?))
    }

    /// Import a request from an already-decoded value.
    ///
    /// Requires a non-negative integer `id`, a non-empty string `method`, an
    /// array `params`, and a valid protocol tag. Unknown fields are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !is_protocol_tag(obj.get("jsonrpc")?) {
            return None;
        }
        let request = Self {
            id: obj.get("id")?.as_u64()?,
            method: obj.get("method")?.as_str()?.to_owned(),
            params: obj.get("params")?.as_array()?.clone(),
            jsonrpc: JSONRPC_VERSION.to_owned(),
        };
        request.is_valid().then_some(request)
    }

    /// Whether this request would pass import validation.
    pub fn is_valid(&self) -> bool {
        !self.method.is_empty() && self.jsonrpc == JSONRPC_VERSION
    }

    /// Serialize to wire text.
    pub fn export(&self) -> Result<String, SendError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Assign the recipient's next id and send.
    pub fn send_to<R: Recipient + ?Sized>(&mut self, target: &mut R) -> Result<(), SendError> {
        self.id = target.next_message_id();
        let text = self.export()?;
        target.send_text(&text)
    }

    /// Send to each target in order, each with its own id.
    pub fn send_to_all<'a, R, I>(&mut self, targets: I) -> Result<(), SendError>
    where
        R: Recipient + ?Sized + 'a,
        I: IntoIterator<Item = &'a mut R>,
    {
        for target in targets {
            self.send_to(target)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// The reply to a [`Request`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response {
    /// Echoed request id; `null` when the request id was unreadable.
    pub id: Option<u64>,
    /// Failure detail, `null` on success.
    pub error: Option<ErrorObject>,
    /// Result payload, `null` on failure.
    pub result: Value,
    /// Protocol tag.
    pub jsonrpc: String,
}

impl Response {
    /// Build a response from its parts.
    pub fn new(id: Option<u64>, error: Option<ErrorObject>, result: Value) -> Self {
        Self {
            id,
            error,
            result,
            jsonrpc: JSONRPC_VERSION.to_owned(),
        }
    }

    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self::new(Some(id), None, result)
    }

    /// Build an error response.
    pub fn failure(id: Option<u64>, error: ErrorObject) -> Self {
        Self::new(id, Some(error), Value::Null)
    }

    /// Import a response from raw frame text.
    pub fn import(text: &str) -> Option<Self> {
        Self::from_value(&Value::Object(parse_object(text)?))
    }

    /// Import a response from an already-decoded value.
    ///
    /// All of `id`, `error`, `result` and `jsonrpc` must be present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !is_protocol_tag(obj.get("jsonrpc")?) {
            return None;
        }
        let id = match obj.get("id")? {
            Value::Null => None,
            other => Some(other.as_u64()?),
        };
        let error = match obj.get("error")? {
            Value::Null => None,
            other => Some(serde_json::from_value(other.clone()).ok()?),
        };
        Some(Self::new(id, error, obj.get("result")?.clone()))
    }

    /// Whether this response would pass import validation.
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION
    }

    /// Whether the response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Serialize to wire text.
    pub fn export(&self) -> Result<String, SendError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Send to a target. Responses never consume a recipient id.
    pub fn send_to<R: Recipient + ?Sized>(&self, target: &mut R) -> Result<(), SendError> {
        let text = self.export()?;
        target.send_text(&text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
