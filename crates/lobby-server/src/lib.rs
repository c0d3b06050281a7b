//! # lobby-server
//!
//! The lobby state machine and the servers that feed it.
//!
//! - [`lobby`]: users, rooms, events, inbound frame handling
//! - [`rpc`]: method registry, role gate, built-in handlers
//! - [`heartbeat`] and [`expiry`]: the periodic sweeps
//! - [`websocket`] and [`tcp`]: transport adapters over [`transport::ChannelTransport`]
//! - [`server`]: listeners, `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod codec;
pub mod connection;
pub mod errors;
pub mod expiry;
pub mod health;
pub mod heartbeat;
pub mod lobby;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod tcp;
pub mod transport;
pub mod websocket;

pub use errors::{LobbyError, TransportError};
pub use lobby::{Caller, Lobby, Room, SharedLobby, User};
pub use server::{LobbyServer, ServerHandle};
pub use transport::{ChannelTransport, Outbound, Transport, TransportKind};
