//! Heartbeat probes and the pending-call sweep.
//!
//! Every interval each user is visited once. A user that has not
//! acknowledged the previous probe is evicted; everyone else has their pulse
//! reset and receives a fresh `keep-alive?` request, tracked as a pending
//! call. Acknowledgement arrives either as a reply whose result is
//! `"keep-alive"` or as a `keep-alive` request.

use std::time::Duration;

use lobby_core::UserId;
use lobby_rpc::Request;
use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::lobby::{Lobby, SharedLobby, User};
use crate::metrics::LOBBY_EVICTIONS_TOTAL;

/// Leave code of a heartbeat eviction. Suppresses the leave event.
pub const UNRESPONSIVE: &str = "unresponsive";

/// Result of one probe pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Users sent a fresh probe.
    pub probed: usize,
    /// Users removed for missing the previous probe.
    pub evicted: Vec<UserId>,
}

impl Lobby {
    /// Probe every user once.
    pub fn heartbeat_probe(&mut self, now: Instant) -> ProbeReport {
        let mut report = ProbeReport::default();
        let ids: Vec<UserId> = self.users.keys().cloned().collect();
        for id in ids {
            let Some(user) = self.users.get_mut(&id) else {
                continue;
            };
            if !user.pulse {
                report.evicted.push(id);
                continue;
            }
            user.pulse = false;
            let mut probe = Request::keep_alive_probe();
            match probe.send_to(user) {
                Ok(()) => {
                    user.pending.insert(probe.id, probe.method.clone(), None, now);
                    report.probed += 1;
                }
                Err(err) => debug!(user_id = %id, error = %err, "probe not sent"),
            }
        }
        for id in &report.evicted {
            self.evict_unresponsive(id);
        }
        report
    }

    fn evict_unresponsive(&mut self, id: &UserId) {
        let transport = self.users.get(id).and_then(User::transport);
        if let Err(err) = self.leave_user(id, Some(UNRESPONSIVE), None) {
            debug!(user_id = %id, error = %err, "leave during eviction failed");
        }
        if let Some(transport) = transport {
            transport.destroy();
        }
        counter!(LOBBY_EVICTIONS_TOTAL, "reason" => UNRESPONSIVE).increment(1);
        info!(user_id = %id, "unresponsive user evicted");
    }

    /// Drop pending calls older than `ttl`. Returns how many were dropped.
    pub fn sweep_pending(&mut self, now: Instant, ttl: Duration) -> usize {
        self.users
            .values_mut()
            .map(|user| user.pending.sweep(now, ttl))
            .sum()
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Probe every `period` until cancelled.
pub async fn run_heartbeat(lobby: SharedLobby, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = lobby.lock().heartbeat_probe(Instant::now());
                if !report.evicted.is_empty() {
                    debug!(probed = report.probed, evicted = report.evicted.len(), "heartbeat pass");
                }
            }
            () = cancel.cancelled() => {
                debug!("heartbeat stopped");
                return;
            }
        }
    }
}

/// Sweep stale pending calls every `period` until cancelled.
pub async fn run_pending_sweep(lobby: SharedLobby, period: Duration, ttl: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let dropped = lobby.lock().sweep_pending(Instant::now(), ttl);
                if dropped > 0 {
                    debug!(dropped, "stale pending calls dropped");
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::testing::{TestLobby, notices};
    use crate::transport::{ChannelTransport, Outbound, TransportKind};
    use lobby_settings::LobbySettings;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn probe_sends_tracked_request() {
        let mut t = TestLobby::new();
        let a = t.connect();
        t.drain_all();

        let report = t.lobby.heartbeat_probe(Instant::now());
        assert_eq!(report, ProbeReport { probed: 1, evicted: vec![] });
        let frames = t.take(&a);
        assert_eq!(frames[0]["method"], "keep-alive?");
        let user = t.lobby.user(&a).unwrap();
        assert!(!user.pulse);
        assert_eq!(user.pending.len(), 1);
    }

    #[test]
    fn acknowledged_probe_keeps_user() {
        let mut t = TestLobby::new();
        let a = t.connect();
        t.drain_all();
        let _ = t.lobby.heartbeat_probe(Instant::now());
        let probe_id = t.take(&a)[0]["id"].as_u64().unwrap();

        let ack = format!("{{\"id\":{probe_id},\"error\":null,\"result\":\"keep-alive\",\"jsonrpc\":\"2.0\"}}");
        let _ = t.lobby.handle_frame(&a, ack.as_bytes());
        assert!(t.lobby.user(&a).unwrap().pending.is_empty());

        let report = t.lobby.heartbeat_probe(Instant::now());
        assert!(report.evicted.is_empty());
        assert!(t.lobby.user(&a).is_some());
    }

    #[test]
    fn missed_probe_evicts_silently() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let b = t.connect();
        let _ = t.lobby.heartbeat_probe(Instant::now());
        let _ = t.lobby.handle_frame(&b, b"{\"id\":1,\"method\":\"keep-alive\",\"params\":[],\"jsonrpc\":\"2.0\"}");
        t.drain_all();

        let report = t.lobby.heartbeat_probe(Instant::now());
        assert_eq!(report.evicted, vec![a.clone()]);
        assert!(t.lobby.user(&a).is_none());
        assert!(t.is_destroyed(&a));
        // suppressed leave code: nobody is told
        assert!(notices(&t.take(&b)).is_empty());
    }

    #[test]
    fn sweep_drops_stale_calls() {
        let mut t = TestLobby::new();
        let a = t.connect();
        let start = Instant::now();
        let _ = t.lobby.heartbeat_probe(start);
        assert_eq!(t.lobby.sweep_pending(start + Duration::from_secs(5), Duration::from_secs(10)), 0);
        assert_eq!(t.lobby.sweep_pending(start + Duration::from_secs(11), Duration::from_secs(10)), 1);
        assert!(t.lobby.user(&a).unwrap().pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_evicts_silent_clients_and_stops_on_cancel() {
        let lobby = Lobby::new(&LobbySettings::default()).into_shared();
        let (tx, mut rx) = mpsc::channel(16);
        let transport = Arc::new(ChannelTransport::new(TransportKind::Message, tx, CancellationToken::new()));
        let id = lobby.lock().connect(transport.clone()).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(lobby.clone(), Duration::from_secs(15), cancel.clone()));

        time::sleep(Duration::from_secs(16)).await;
        assert!(lobby.lock().user(&id).is_some());
        time::sleep(Duration::from_secs(15)).await;
        assert!(lobby.lock().user(&id).is_none());
        assert!(transport.is_destroyed());

        let mut saw_probe = false;
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Text(text) = item {
                saw_probe |= text.contains("keep-alive?");
            }
        }
        assert!(saw_probe);

        cancel.cancel();
        task.await.unwrap();
    }
}
