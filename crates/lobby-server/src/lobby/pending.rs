//! Outbound calls awaiting a client reply.

use std::collections::BTreeMap;
use std::time::Duration;

use lobby_rpc::Response;
use tokio::time::Instant;

/// Invoked once with the client's reply.
pub type ReplyCallback = Box<dyn FnOnce(&Response) + Send>;

/// One tracked outbound request.
pub struct PendingCall {
    /// Method of the request that was sent.
    pub method: String,
    /// When the request was sent.
    pub created: Instant,
    callback: Option<ReplyCallback>,
}

impl PendingCall {
    /// Invoke the callback, if any, with the reply.
    pub fn resolve(self, response: &Response) {
        if let Some(callback) = self.callback {
            callback(response);
        }
    }
}

/// Per-user table of pending calls keyed by request id.
#[derive(Default)]
pub struct PendingCalls {
    calls: BTreeMap<u64, PendingCall>,
}

impl PendingCalls {
    /// Track a request.
    pub fn insert(&mut self, id: u64, method: impl Into<String>, callback: Option<ReplyCallback>, now: Instant) {
        let _ = self.calls.insert(
            id,
            PendingCall {
                method: method.into(),
                created: now,
                callback,
            },
        );
    }

    /// Remove and return the call answered by `id`.
    pub fn take(&mut self, id: u64) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Drop calls older than `ttl` without invoking them. Returns the count.
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.calls.len();
        self.calls
            .retain(|_, call| now.saturating_duration_since(call.created) <= ttl);
        before - self.calls.len()
    }

    /// Number of tracked calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no calls are tracked.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn take_resolves_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let mut calls = PendingCalls::default();
        calls.insert(
            3,
            "ask",
            Some(Box::new(move |resp: &Response| {
                assert_eq!(resp.result, json!("yes"));
                let _ = seen.fetch_add(1, Ordering::SeqCst);
            })),
            Instant::now(),
        );

        let call = calls.take(3).unwrap();
        assert_eq!(call.method, "ask");
        call.resolve(&Response::success(3, json!("yes")));
        assert!(calls.take(3).is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sweep_drops_only_stale_entries() {
        let start = Instant::now();
        let mut calls = PendingCalls::default();
        calls.insert(1, "old", None, start);
        calls.insert(2, "new", None, start + Duration::from_secs(8));

        let removed = calls.sweep(start + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(removed, 1);
        assert_eq!(calls.len(), 1);
        assert!(calls.take(2).is_some());
        assert!(calls.is_empty());
    }
}
