//! # lobby-core
//!
//! Foundation types shared by every lobby crate.
//!
//! - **Branded IDs**: [`UserId`] and [`RoomId`] as newtypes for type safety
//! - **Roles**: the closed [`Role`] enumeration and the per-user [`RoleStack`]
//! - **Value paths**: dot-notation get/set over nested JSON key/value stores
//! - **Identities**: the swappable [`IdentityProvider`] for ids and display names
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod identity;
pub mod ids;
pub mod logging;
pub mod roles;
pub mod utils;

pub use identity::{IdentityProvider, PhraseIdentity, is_valid_name};
pub use ids::{RoomId, UserId};
pub use roles::{ParseRoleError, Role, RoleStack};
