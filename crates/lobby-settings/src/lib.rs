//! # lobby-settings
//!
//! Configuration management with layered sources for the lobby daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LobbySettings::default()`]
//! 2. **Settings file**: `~/.lobby/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `LOBBY_*` overrides (highest priority)
//!
//! Library code receives settings explicitly; the global accessor below
//! exists for the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<LobbySettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.lobby/settings.json` with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static LobbySettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: LobbySettings) -> std::result::Result<(), LobbySettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
