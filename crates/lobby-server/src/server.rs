//! `LobbyServer`: the Axum WebSocket listener, the raw TCP listener, and the
//! lobby's background timers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use lobby_settings::LobbySettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::expiry::run_expiry;
use crate::health::{self, HealthResponse};
use crate::heartbeat::{run_heartbeat, run_pending_sweep};
use crate::lobby::{Lobby, SharedLobby};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::tcp::{TcpContext, serve_tcp};
use crate::websocket::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The lobby every session registers with.
    pub lobby: SharedLobby,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Open connections across both listeners.
    pub live: Arc<AtomicUsize>,
    /// Outbound queue capacity per connection.
    pub send_queue: usize,
    /// Largest inbound frame accepted.
    pub max_message_size: usize,
}

/// Addresses and tasks of a running server.
pub struct ServerHandle {
    /// Bound WebSocket/HTTP address.
    pub ws_addr: SocketAddr,
    /// Bound raw TCP address, when the TCP listener is enabled.
    pub tcp_addr: Option<SocketAddr>,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Cancel every listener, session, and timer, then wait for them.
    pub async fn stop(self, timeout: Option<Duration>) {
        let _ = self.shutdown.graceful_shutdown(self.tasks, timeout).await;
    }
}

/// The lobby server.
pub struct LobbyServer {
    settings: LobbySettings,
    lobby: SharedLobby,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    live: Arc<AtomicUsize>,
}

impl LobbyServer {
    /// Create a server with a fresh lobby built from `settings`.
    pub fn new(settings: LobbySettings, metrics: Option<PrometheusHandle>) -> Self {
        let lobby = Lobby::new(&settings);
        Self::with_lobby(settings, lobby, metrics)
    }

    /// Create a server around a prepared lobby.
    pub fn with_lobby(settings: LobbySettings, lobby: Lobby, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            settings,
            lobby: lobby.into_shared(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The shared lobby.
    pub fn lobby(&self) -> &SharedLobby {
        &self.lobby
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the settings the server was built with.
    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    fn state(&self) -> AppState {
        AppState {
            lobby: self.lobby.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            live: self.live.clone(),
            send_queue: self.settings.server.send_queue,
            max_message_size: self.settings.server.max_message_size,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state())
    }

    /// Bind the configured listeners and start serving.
    ///
    /// A TCP port of `0` disables the raw TCP listener.
    pub async fn listen(&self) -> io::Result<ServerHandle> {
        let server = &self.settings.server;
        let ws_listener = TcpListener::bind((server.host.as_str(), server.ws_port)).await?;
        let tcp_listener = if server.tcp_port == 0 {
            None
        } else {
            Some(TcpListener::bind((server.host.as_str(), server.tcp_port)).await?)
        };
        self.serve(ws_listener, tcp_listener)
    }

    /// Serve on already-bound listeners and start the background timers.
    pub fn serve(&self, ws_listener: TcpListener, tcp_listener: Option<TcpListener>) -> io::Result<ServerHandle> {
        let token = self.shutdown.token();
        let mut tasks = Vec::new();

        let ws_addr = ws_listener.local_addr()?;
        let router = self.router();
        let ws_token = token.clone();
        tasks.push(tokio::spawn(async move {
            let serve = axum::serve(ws_listener, router).with_graceful_shutdown(async move { ws_token.cancelled().await });
            if let Err(err) = serve.await {
                error!(error = %err, "websocket listener failed");
            }
        }));

        let tcp_addr = match tcp_listener {
            Some(listener) => {
                let addr = listener.local_addr()?;
                let ctx = TcpContext {
                    lobby: self.lobby.clone(),
                    queue: self.settings.server.send_queue,
                    max_frame: self.settings.server.max_message_size,
                    live: self.live.clone(),
                };
                tasks.push(tokio::spawn(serve_tcp(listener, ctx, token.clone())));
                Some(addr)
            }
            None => None,
        };

        let heartbeat = &self.settings.heartbeat;
        if heartbeat.enabled {
            tasks.push(tokio::spawn(run_heartbeat(
                self.lobby.clone(),
                Duration::from_millis(heartbeat.interval_ms),
                token.clone(),
            )));
        }
        tasks.push(tokio::spawn(run_pending_sweep(
            self.lobby.clone(),
            Duration::from_millis(heartbeat.pending_sweep_ms),
            Duration::from_millis(heartbeat.pending_ttl_ms),
            token.clone(),
        )));

        let expiry = &self.settings.expiry;
        if expiry.expire_users || expiry.expire_rooms {
            tasks.push(tokio::spawn(run_expiry(
                self.lobby.clone(),
                Duration::from_millis(expiry.sweep_interval_ms),
                token,
            )));
        }

        info!(%ws_addr, tcp_addr = ?tcp_addr, "lobby server listening");
        Ok(ServerHandle {
            ws_addr,
            tcp_addr,
            shutdown: self.shutdown.clone(),
            tasks,
        })
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.max_message_size).on_upgrade(move |socket| {
        run_ws_session(socket, state.lobby, state.send_queue, state.live, state.shutdown.session_token())
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (users, rooms) = {
        let lobby = state.lobby.lock();
        (lobby.users().count(), lobby.rooms().count())
    };
    let connections = state.live.load(Ordering::Relaxed);
    Json(health::health_check(state.start_time, users, rooms, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
