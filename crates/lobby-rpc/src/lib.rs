//! # lobby-rpc
//!
//! JSON-RPC 2.0 wire layer for the lobby coordinator.
//!
//! - [`Request`] / [`Response`] envelopes with import and validation
//! - [`Notification`] and [`Message`], the two server-pushed request kinds
//! - [`RpcError`] with the reserved numeric codes
//! - [`Recipient`]: per-recipient id counters and the send primitive
//! - [`parse_frame`]: classify a decoded frame as a single envelope or a batch

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod messages;
pub mod recipient;
pub mod types;

pub use errors::RpcError;
pub use frame::{Envelope, Incoming, parse_frame};
pub use messages::{Message, MessageKind, Notification, Sendable};
pub use recipient::{Recipient, SendError};
pub use types::{ErrorObject, JSONRPC_VERSION, Request, Response};
