//! Listener, timer, and logging settings.

use serde::{Deserialize, Serialize};

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port (`/ws`, `/health`, `/metrics`).
    pub ws_port: u16,
    /// Raw TCP port for newline-delimited clients; `0` disables it.
    pub tcp_port: u16,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub send_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            ws_port: 8080,
            tcp_port: 8081,
            max_message_size: 1024 * 1024, // 1 MiB
            send_queue: 256,
        }
    }
}

/// Heartbeat probe and pending-call sweep timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Whether the heartbeat probe runs.
    pub enabled: bool,
    /// Interval between probes in milliseconds.
    pub interval_ms: u64,
    /// Age after which an unanswered server call is dropped.
    pub pending_ttl_ms: u64,
    /// Interval of the pending-call sweep.
    pub pending_sweep_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 15_000,
            pending_ttl_ms: 10_000,
            pending_sweep_ms: 10_000,
        }
    }
}

/// Inactivity expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpirySettings {
    /// Kick users idle for longer than `user_period_ms`.
    pub expire_users: bool,
    /// User inactivity period in milliseconds.
    pub user_period_ms: u64,
    /// Interval of the expiry sweep.
    pub sweep_interval_ms: u64,
    /// Close rooms idle for longer than `room_idle_ms`.
    pub expire_rooms: bool,
    /// Room inactivity period in milliseconds.
    pub room_idle_ms: u64,
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self {
            expire_users: true,
            user_period_ms: 300_000,
            sweep_interval_ms: 60_000,
            expire_rooms: false,
            room_idle_ms: 300_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
