//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON files are accepted and missing fields take their default value.

mod lobby;
mod server;

pub use lobby::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the lobby daemon.
///
/// ```json
/// {
///   "server": { "wsPort": 9090 },
///   "expiry": { "expireRooms": true }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbySettings {
    /// Listener configuration.
    pub server: ServerSettings,
    /// Heartbeat probe timing.
    pub heartbeat: HeartbeatSettings,
    /// Inactivity expiry of users and rooms.
    pub expiry: ExpirySettings,
    /// Lobby behaviour knobs.
    pub lobby: LobbyBehaviour,
    /// Role name to allowed method names.
    pub roles: RolePermissions,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl LobbySettings {
    /// Reject combinations the timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.enabled && self.heartbeat.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.intervalMs must be positive".into(),
            ));
        }
        if self.heartbeat.pending_sweep_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.pendingSweepMs must be positive".into(),
            ));
        }
        if (self.expiry.expire_users || self.expiry.expire_rooms)
            && self.expiry.sweep_interval_ms == 0
        {
            return Err(SettingsError::InvalidValue(
                "expiry.sweepIntervalMs must be positive".into(),
            ));
        }
        if self.server.send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueue must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn camel_case_keys() {
        let value = serde_json::to_value(LobbySettings::default()).unwrap();
        assert!(value["server"]["wsPort"].is_number());
        assert!(value["heartbeat"]["pendingTtlMs"].is_number());
        assert!(value["expiry"]["expireRooms"].is_boolean());
        assert!(value["lobby"]["ownerLeaveAction"].is_string());
        assert!(value["roles"]["lobby.member"].is_array());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: LobbySettings =
            serde_json::from_str(r#"{"server": {"wsPort": 9000}}"#).unwrap();
        assert_eq!(settings.server.ws_port, 9000);
        assert_eq!(settings.server.tcp_port, 8081);
        assert_eq!(settings.heartbeat, HeartbeatSettings::default());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut settings = LobbySettings::default();
        settings.heartbeat.interval_ms = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
        settings.heartbeat.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut settings = LobbySettings::default();
        settings.server.send_queue = 0;
        assert!(settings.validate().is_err());
    }
}
