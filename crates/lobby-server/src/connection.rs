//! Per-connection plumbing shared by the WebSocket and TCP adapters.
//!
//! A [`Connection`] registers the client with the lobby, feeds it inbound
//! frames, and unregisters it when the socket goes away. Outbound traffic
//! never passes through here; it flows from the lobby into the
//! [`ChannelTransport`] queue and out through the adapter's writer task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use lobby_core::UserId;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::LobbyError;
use crate::lobby::SharedLobby;
use crate::metrics::{LOBBY_CONNECTION_DURATION_SECONDS, LOBBY_CONNECTIONS_ACTIVE, LOBBY_CONNECTIONS_TOTAL};
use crate::transport::{ChannelTransport, Outbound, TransportKind};

/// Metric label for a transport kind.
pub fn kind_label(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::Message => "ws",
        TransportKind::Stream => "tcp",
    }
}

/// A registered client connection.
pub struct Connection {
    id: UserId,
    kind: TransportKind,
    lobby: SharedLobby,
    transport: Arc<ChannelTransport>,
    live: Arc<AtomicUsize>,
    started: Instant,
}

impl Connection {
    /// Register a new client. Returns the connection and the queue its
    /// writer task must drain.
    ///
    /// `cancel` fires when the lobby destroys the transport; both halves of
    /// the session select on it.
    pub fn open(
        lobby: SharedLobby,
        kind: TransportKind,
        queue: usize,
        live: Arc<AtomicUsize>,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Outbound>), LobbyError> {
        let (tx, rx) = mpsc::channel(queue);
        let transport = Arc::new(ChannelTransport::new(kind, tx, cancel));
        let id = lobby.lock().connect(transport.clone())?;

        let label = kind_label(kind);
        let _ = live.fetch_add(1, Ordering::Relaxed);
        counter!(LOBBY_CONNECTIONS_TOTAL, "transport" => label).increment(1);
        gauge!(LOBBY_CONNECTIONS_ACTIVE, "transport" => label).increment(1.0);
        info!(user_id = %id, transport = label, "client connected");

        let conn = Self {
            id,
            kind,
            lobby,
            transport,
            live,
            started: Instant::now(),
        };
        Ok((conn, rx))
    }

    /// The lobby id of this client.
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Feed one inbound frame to the lobby.
    ///
    /// Returns `false` once the lobby has let go of the client and the
    /// session should stop reading.
    pub fn handle(&self, frame: &[u8]) -> bool {
        let outcome = self.lobby.lock().handle_frame(&self.id, frame);
        let done = outcome.close;
        outcome.flush(self.transport.as_ref());
        !done && !self.transport.is_destroyed()
    }

    /// Unregister the client and record the session's lifetime.
    ///
    /// A client still registered here dropped without leaving.
    pub fn close(self) {
        self.lobby.lock().disconnect(&self.id);

        let label = kind_label(self.kind);
        let _ = self.live.fetch_sub(1, Ordering::Relaxed);
        gauge!(LOBBY_CONNECTIONS_ACTIVE, "transport" => label).decrement(1.0);
        histogram!(LOBBY_CONNECTION_DURATION_SECONDS, "transport" => label)
            .record(self.started.elapsed().as_secs_f64());
        let dropped = self.transport.drop_count();
        if dropped > 0 {
            debug!(user_id = %self.id, dropped, "frames dropped on a full queue");
        }
        info!(user_id = %self.id, transport = label, "client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::Lobby;
    use lobby_settings::LobbySettings;

    fn open(lobby: &SharedLobby, live: &Arc<AtomicUsize>) -> (Connection, mpsc::Receiver<Outbound>, CancellationToken) {
        let cancel = CancellationToken::new();
        let (conn, rx) = Connection::open(lobby.clone(), TransportKind::Message, 16, live.clone(), cancel.clone()).unwrap();
        (conn, rx, cancel)
    }

    #[test]
    fn labels() {
        assert_eq!(kind_label(TransportKind::Message), "ws");
        assert_eq!(kind_label(TransportKind::Stream), "tcp");
    }

    #[test]
    fn open_registers_and_close_unregisters() {
        let lobby = Lobby::new(&LobbySettings::default()).into_shared();
        let live = Arc::new(AtomicUsize::new(0));
        let (conn, mut rx, _cancel) = open(&lobby, &live);
        let id = conn.id().clone();
        assert!(lobby.lock().user(&id).is_some());
        assert_eq!(live.load(Ordering::Relaxed), 1);
        // join notice
        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(_))));

        conn.close();
        assert!(lobby.lock().user(&id).is_none());
        assert_eq!(live.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn leave_request_ends_the_session() {
        let lobby = Lobby::new(&LobbySettings::default()).into_shared();
        let live = Arc::new(AtomicUsize::new(0));
        let (conn, mut rx, _cancel) = open(&lobby, &live);
        while rx.try_recv().is_ok() {}

        assert!(conn.handle(br#"{"id":1,"method":"ping","params":[],"jsonrpc":"2.0"}"#));
        assert!(!conn.handle(br#"{"id":2,"method":"leave","params":[],"jsonrpc":"2.0"}"#));

        let mut saw_reply = false;
        let mut saw_close = false;
        while let Ok(item) = rx.try_recv() {
            match item {
                Outbound::Text(text) => saw_reply |= text.contains("\"id\":2"),
                Outbound::Close => saw_close = true,
                Outbound::Bytes(_) => {}
            }
        }
        assert!(saw_reply);
        assert!(saw_close);
        conn.close();
    }
}
