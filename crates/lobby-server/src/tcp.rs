//! Raw TCP adapter: newline-delimited frames over a byte stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::codec::LineCodec;
use crate::connection::Connection;
use crate::lobby::SharedLobby;
use crate::transport::{Outbound, TransportKind};

const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Settings every TCP session needs.
#[derive(Clone)]
pub struct TcpContext {
    /// The lobby sessions register with.
    pub lobby: SharedLobby,
    /// Outbound queue capacity per connection.
    pub queue: usize,
    /// Longest accepted line, in bytes.
    pub max_frame: usize,
    /// Open connection count, shared with `/health`.
    pub live: Arc<AtomicUsize>,
}

/// Accept connections until `shutdown` fires.
pub async fn serve_tcp(listener: TcpListener, ctx: TcpContext, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = tokio::spawn(run_tcp_session(stream, peer, ctx.clone(), shutdown.clone()));
                }
                Err(err) => warn!(error = %err, "tcp accept failed"),
            },
            () = shutdown.cancelled() => {
                info!("tcp listener stopped");
                return;
            }
        }
    }
}

/// Run one TCP session from accept through disconnect.
#[instrument(skip_all, fields(peer = %peer))]
pub async fn run_tcp_session(stream: TcpStream, peer: SocketAddr, ctx: TcpContext, shutdown: CancellationToken) {
    let cancel = shutdown.child_token();
    let (conn, rx) = match Connection::open(ctx.lobby, TransportKind::Stream, ctx.queue, ctx.live, cancel.clone()) {
        Ok(opened) => opened,
        Err(err) => {
            warn!(error = %err, "tcp client rejected");
            return;
        }
    };
    let (read, write) = stream.into_split();
    let mut frames = FramedRead::new(read, LineCodec::new(ctx.max_frame));
    let mut writer = tokio::spawn(write_loop(write, rx, cancel.clone()));

    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            () = cancel.cancelled() => break,
        };
        match next {
            Some(Ok(frame)) => {
                if !conn.handle(&frame) {
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(user_id = %conn.id(), error = %err, "tcp read failed");
                break;
            }
            None => {
                debug!(user_id = %conn.id(), "peer closed the stream");
                break;
            }
        }
    }

    conn.close();
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn write_loop(mut write: OwnedWriteHalf, mut rx: mpsc::Receiver<Outbound>, cancel: CancellationToken) {
    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            () = cancel.cancelled() => break,
        };
        let written = match item {
            Some(Outbound::Bytes(bytes)) => write.write_all(&bytes).await,
            Some(Outbound::Text(text)) => write.write_all(text.as_bytes()).await,
            Some(Outbound::Close) | None => break,
        };
        if let Err(err) = written {
            debug!(error = %err, "tcp write failed");
            break;
        }
    }
    let _ = write.shutdown().await;
    cancel.cancel();
}
