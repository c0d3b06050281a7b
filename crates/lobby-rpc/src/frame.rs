//! Classification of decoded inbound frames.

use serde_json::Value;

use crate::types::{Request, Response};

/// One decoded envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// A valid request to dispatch.
    Request(Request),
    /// A valid response to a server-initiated request.
    Response(Response),
    /// Neither; `id` is kept when it was readable.
    Invalid {
        /// The object's `id` if it was a non-negative integer.
        id: Option<u64>,
    },
}

impl Envelope {
    /// Classify a decoded value.
    pub fn classify(value: &Value) -> Self {
        if let Some(request) = Request::from_value(value) {
            Self::Request(request)
        } else if let Some(response) = Response::from_value(value) {
            Self::Response(response)
        } else {
            Self::Invalid {
                id: value.get("id").and_then(Value::as_u64),
            }
        }
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// A single envelope.
    Single(Envelope),
    /// A batch, in input order.
    Batch(Vec<Envelope>),
}

/// Decode frame text and classify its contents.
///
/// Fails only when the text is not JSON.
pub fn parse_frame(text: &str) -> Result<Incoming, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    Ok(match value {
        Value::Array(items) => Incoming::Batch(items.iter().map(Envelope::classify).collect()),
        other => Incoming::Single(Envelope::classify(&other)),
    })
}
