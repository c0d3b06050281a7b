//! Transport abstraction between the lobby and a connection.
//!
//! The lobby never touches sockets. Each user holds an `Arc<dyn Transport>`
//! and writes through whichever primitive the transport supports: message
//! transports (WebSocket) accept whole text or binary frames, stream
//! transports (TCP) accept raw bytes. [`ChannelTransport`] backs both kinds with a bounded
//! queue drained by the connection's writer task.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TransportError;
use crate::metrics::LOBBY_SEND_DROPS_TOTAL;

/// How a transport delivers frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// One frame per message (WebSocket).
    Message,
    /// A byte stream; frames are newline-delimited (TCP).
    Stream,
}

/// Write side of a connection as seen by the lobby.
///
/// Every primitive defaults to [`TransportError::Unsupported`]; callers fall
/// back from `send_text` to `write_bytes` and from `close` to `destroy`.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Delivery style of this transport.
    fn kind(&self) -> TransportKind;

    /// Push one text frame.
    fn send_text(&self, _text: &str) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Push one binary frame, exactly as given.
    fn send_binary(&self, _bytes: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Write raw bytes to the stream.
    fn write_bytes(&self, _bytes: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Close gracefully after queued output is flushed.
    fn close(&self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Tear the connection down immediately.
    fn destroy(&self);
}

/// Item queued for a connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// Raw stream bytes, or a binary frame on message transports.
    Bytes(Bytes),
    /// Flush and close.
    Close,
}

/// A [`Transport`] backed by a bounded mpsc queue.
pub struct ChannelTransport {
    kind: TransportKind,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    dropped: AtomicU64,
}

impl ChannelTransport {
    /// Wrap the sending half of a connection's outbound queue.
    ///
    /// `cancel` is fired by [`Transport::destroy`]; the writer task selects on it.
    pub fn new(kind: TransportKind, tx: mpsc::Sender<Outbound>, cancel: CancellationToken) -> Self {
        Self {
            kind,
            tx,
            cancel,
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the transport was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn enqueue(&self, item: Outbound) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(LOBBY_SEND_DROPS_TOTAL).increment(1);
                debug!("outbound queue full, frame dropped");
                Err(TransportError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        match self.kind {
            TransportKind::Message => self.enqueue(Outbound::Text(text.to_owned())),
            TransportKind::Stream => Err(TransportError::Unsupported),
        }
    }

    fn send_binary(&self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.kind {
            TransportKind::Message => self.enqueue(Outbound::Bytes(Bytes::copy_from_slice(bytes))),
            TransportKind::Stream => Err(TransportError::Unsupported),
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.kind {
            TransportKind::Stream => self.enqueue(Outbound::Bytes(Bytes::copy_from_slice(bytes))),
            TransportKind::Message => Err(TransportError::Unsupported),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        self.enqueue(Outbound::Close)
    }

    fn destroy(&self) {
        self.cancel.cancel();
    }
}
