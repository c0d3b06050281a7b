//! # lobbyd
//!
//! Loads settings, starts the WebSocket and TCP listeners, and runs until
//! Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lobby_core::logging::{LogFormat, init_subscriber};
use lobby_server::LobbyServer;
use lobby_server::metrics::install_recorder;
use lobby_settings::{LobbySettings, load_settings_from_path, settings_path};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lobby server.
#[derive(Parser, Debug)]
#[command(name = "lobbyd", about = "Lobby and room coordination server")]
struct Cli {
    /// Settings file (default `~/.lobby/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// WebSocket port (0 for auto-assign).
    #[arg(long)]
    ws_port: Option<u16>,

    /// Raw TCP port (0 disables the TCP listener).
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Log level filter, overridden by `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Settings from the file and environment, with flags applied on top.
    fn settings(&self) -> Result<LobbySettings> {
        let path = self.config.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut LobbySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.ws_port {
            settings.server.ws_port = port;
        }
        if let Some(port) = self.tcp_port {
            settings.server.tcp_port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    let _ = init_subscriber(&settings.logging.level, format);

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "metrics disabled");
            None
        }
    };
    if lobby_settings::init_settings(settings.clone()).is_err() {
        tracing::debug!("global settings already initialized");
    }

    let server = LobbyServer::new(settings, metrics);
    let handle = server.listen().await.context("Failed to bind listeners")?;
    tracing::info!(
        ws = %handle.ws_addr,
        tcp = ?handle.tcp_addr,
        "lobbyd listening on ws://{}/ws",
        handle.ws_addr
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    handle.stop(Some(SHUTDOWN_TIMEOUT)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
