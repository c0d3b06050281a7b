//! WebSocket adapter: one lobby user per upgraded connection.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::connection::Connection;
use crate::lobby::SharedLobby;
use crate::transport::{Outbound, TransportKind};

/// How long the writer may keep flushing after the reader stopped.
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Run a WebSocket session from upgrade through disconnect.
///
/// `cancel` is this connection's own token; it fires on server shutdown or
/// when the lobby destroys the transport.
#[instrument(skip_all)]
pub async fn run_ws_session(
    socket: WebSocket,
    lobby: SharedLobby,
    queue: usize,
    live: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    let (conn, rx) = match Connection::open(lobby, TransportKind::Message, queue, live, cancel.clone()) {
        Ok(opened) => opened,
        Err(err) => {
            warn!(error = %err, "websocket client rejected");
            return;
        }
    };
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, rx, cancel.clone()));

    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            () = cancel.cancelled() => break,
        };
        let keep_going = match msg {
            Some(Ok(Message::Text(text))) => conn.handle(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => conn.handle(&data),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => true,
            Some(Ok(Message::Close(_))) | None => {
                debug!(user_id = %conn.id(), "client closed the socket");
                false
            }
            Some(Err(err)) => {
                debug!(user_id = %conn.id(), error = %err, "websocket read failed");
                false
            }
        };
        if !keep_going {
            break;
        }
    }

    conn.close();
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Drain the outbound queue into the socket until a close marker, the
/// queue closing, or cancellation.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>, cancel: CancellationToken) {
    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            () = cancel.cancelled() => break,
        };
        let sent = match item {
            Some(Outbound::Text(text)) => sink.send(Message::Text(text.into())).await,
            Some(Outbound::Bytes(bytes)) => sink.send(Message::Binary(bytes)).await,
            Some(Outbound::Close) | None => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };
        if let Err(err) = sent {
            debug!(error = %err, "websocket write failed");
            break;
        }
    }
    let _ = sink.close().await;
    cancel.cancel();
}
