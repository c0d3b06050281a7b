//! Inactivity expiry for users and, optionally, rooms.

use std::time::Duration;

use lobby_core::{RoomId, UserId};
use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lobby::{Lobby, Referer, SharedLobby};
use crate::metrics::LOBBY_EVICTIONS_TOTAL;

const TIMEOUT: &str = "timeout";
const INACTIVE: &str = "inactivity timeout";

/// What one sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecycleReport {
    /// Users timed out.
    pub users: Vec<UserId>,
    /// Rooms closed for idling.
    pub rooms: Vec<RoomId>,
}

impl RecycleReport {
    /// Whether nothing expired.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.rooms.is_empty()
    }
}

impl Lobby {
    /// Expire idle users and, when enabled, idle rooms.
    pub fn recycle(&mut self, now: Instant) -> RecycleReport {
        let mut report = RecycleReport::default();

        if self.options.expire_users {
            let period = self.options.user_period;
            report.users = self
                .users
                .values()
                .filter(|u| now.saturating_duration_since(u.last_active()) > period)
                .map(|u| u.id().clone())
                .collect();
            for id in &report.users {
                match self.timeout_user(id, INACTIVE) {
                    Ok(()) => {
                        counter!(LOBBY_EVICTIONS_TOTAL, "reason" => TIMEOUT).increment(1);
                        info!(user_id = %id, "idle user timed out");
                    }
                    Err(err) => warn!(user_id = %id, error = %err, "user timeout failed"),
                }
            }
        }

        if self.options.expire_rooms {
            let idle = self.options.room_idle;
            report.rooms = self
                .rooms
                .values()
                .filter(|r| !r.is_closed() && now.saturating_duration_since(r.last_active) > idle)
                .map(|r| r.id().clone())
                .collect();
            for id in &report.rooms {
                let referer = Referer::Room(id.clone());
                match self.close_room(id, &referer, TIMEOUT, INACTIVE) {
                    Ok(()) => info!(room_id = %id, "idle room closed"),
                    Err(err) => warn!(room_id = %id, error = %err, "room expiry failed"),
                }
            }
        }
        report
    }
}

/// Run [`Lobby::recycle`] every `period` until cancelled.
pub async fn run_expiry(lobby: SharedLobby, period: Duration, cancel: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = lobby.lock().recycle(Instant::now());
                if !report.is_empty() {
                    debug!(users = report.users.len(), rooms = report.rooms.len(), "expiry sweep");
                }
            }
            () = cancel.cancelled() => {
                debug!("expiry sweep stopped");
                return;
            }
        }
    }
}
