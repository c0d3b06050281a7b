//! Inbound frame handling: relay, decode, authorize, dispatch, reply.

use lobby_core::{Role, UserId};
use lobby_rpc::{Envelope, Incoming, Notification, Request, Response, RpcError, parse_frame};
use metrics::counter;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::lobby::{Caller, Lobby, User};
use crate::metrics::{LOBBY_RELAY_FRAMES_TOTAL, RPC_ERRORS_TOTAL};
use crate::transport::Transport;

/// Frames starting with these bytes bypass decoding.
pub const RELAY_SENTINEL: &[u8] = b"relay";

const KEEP_ALIVE_RESULT: &str = "keep-alive";

/// What the transport session still has to do after a frame.
///
/// Replies land here only when the handler removed the user from the
/// registry, so they can no longer be routed through it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Serialized replies, without trailing newline.
    pub replies: Vec<String>,
    /// Close the connection once the replies are written.
    pub close: bool,
}

impl FrameOutcome {
    /// Write the replies straight to `transport`, then close it if asked.
    pub fn flush(self, transport: &dyn Transport) {
        for reply in &self.replies {
            let line = format!("{reply}\n");
            let sent = match transport.send_text(&line) {
                Err(TransportError::Unsupported) => transport.write_bytes(line.as_bytes()),
                other => other,
            };
            if let Err(err) = sent {
                debug!(error = %err, "final reply not delivered");
            }
        }
        if self.close && transport.close().is_err() {
            transport.destroy();
        }
    }
}

fn trim_line_end(frame: &[u8]) -> &[u8] {
    let mut end = frame.len();
    while end > 0 && matches!(frame[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &frame[..end]
}

impl Lobby {
    /// Process one inbound frame from `id`.
    ///
    /// Relay frames are forwarded byte for byte; everything else has its
    /// line ending trimmed before decoding.
    pub fn handle_frame(&mut self, id: &UserId, raw: &[u8]) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        let frame = trim_line_end(raw);
        if frame.is_empty() {
            return outcome;
        }
        let Some(user) = self.users.get_mut(id) else {
            debug!(user_id = %id, "frame from unregistered user dropped");
            return outcome;
        };
        user.touch(Instant::now());

        if raw.starts_with(RELAY_SENTINEL) {
            self.relay(id, raw);
            return outcome;
        }

        let incoming = std::str::from_utf8(frame)
            .ok()
            .and_then(|text| parse_frame(text).ok());
        let Some(incoming) = incoming else {
            warn!(user_id = %id, "undecodable frame, closing connection");
            let reply = Response::failure(None, RpcError::invalid_syntax().to_error_object());
            self.reply(id, &reply, &mut outcome);
            if let Err(err) = self.close_user(id, None, None) {
                debug!(user_id = %id, error = %err, "close after parse error failed");
            }
            return outcome;
        };

        match incoming {
            Incoming::Single(envelope) => {
                if let Some(reply) = self.handle_envelope(id, envelope) {
                    self.reply(id, &reply, &mut outcome);
                }
            }
            Incoming::Batch(envelopes) => {
                let replies: Vec<Response> = envelopes
                    .into_iter()
                    .filter_map(|envelope| self.handle_envelope(id, envelope))
                    .collect();
                if !replies.is_empty() {
                    match serde_json::to_string(&replies) {
                        Ok(text) => self.deliver(id, text, &mut outcome),
                        Err(err) => warn!(user_id = %id, error = %err, "batch reply not serializable"),
                    }
                }
            }
        }
        outcome
    }

    fn handle_envelope(&mut self, id: &UserId, envelope: Envelope) -> Option<Response> {
        match envelope {
            Envelope::Request(request) => Some(self.dispatch_request(id, &request)),
            Envelope::Response(response) => {
                self.accept_response(id, &response);
                None
            }
            Envelope::Invalid { id: request_id } => Some(Response::failure(
                request_id,
                RpcError::invalid_syntax().to_error_object(),
            )),
        }
    }

    fn dispatch_request(&mut self, id: &UserId, request: &Request) -> Response {
        let role = self.users.get(id).map_or(Role::Guest, User::role);
        if let Err(err) = self.permissions.authorize(role, &request.method) {
            counter!(RPC_ERRORS_TOTAL, "method" => request.method.clone(), "error_type" => err.kind()).increment(1);
            debug!(user_id = %id, role = role.as_str(), method = %request.method, "method refused for role");
            return Response::failure(Some(request.id), err.to_error_object());
        }

        let mut caller = Caller::User(id.clone());
        match self.run_method(&mut caller, &request.method, &request.params) {
            Ok(result) => Response::success(request.id, result),
            Err(err) => Response::failure(Some(request.id), err.to_error_object()),
        }
    }

    /// Offer a client reply to the pending-call table.
    fn accept_response(&mut self, id: &UserId, response: &Response) {
        let Some(user) = self.users.get_mut(id) else {
            return;
        };
        if response.result == Value::from(KEEP_ALIVE_RESULT) {
            user.pulse = true;
        }
        match response.id.and_then(|rid| user.pending.take(rid)) {
            Some(call) => {
                debug!(user_id = %id, method = %call.method, "pending call answered");
                call.resolve(response);
            }
            None => debug!(user_id = %id, response_id = ?response.id, "unsolicited response ignored"),
        }
    }

    fn reply(&mut self, id: &UserId, response: &Response, outcome: &mut FrameOutcome) {
        match response.export() {
            Ok(text) => self.deliver(id, text, outcome),
            Err(err) => warn!(user_id = %id, error = %err, "reply not serializable"),
        }
    }

    fn deliver(&mut self, id: &UserId, text: String, outcome: &mut FrameOutcome) {
        match self.users.get_mut(id) {
            Some(user) => {
                if let Err(err) = user.send(&text) {
                    debug!(user_id = %id, error = %err, "reply not delivered");
                }
            }
            None => {
                outcome.replies.push(text);
                outcome.close = true;
            }
        }
    }

    fn relay(&mut self, id: &UserId, frame: &[u8]) {
        let room = self.users.get(id).and_then(|u| u.room.clone());
        let rejection = match room.as_ref().and_then(|r| self.rooms.get_mut(r)) {
            None => Some("You cannot relay outside of a room!"),
            Some(room) if !room.relay => Some("You cannot relay in this room!"),
            Some(room) => {
                room.last_active = Instant::now();
                None
            }
        };

        if let Some(text) = rejection {
            let notification = Notification::new("error", text, Value::Null);
            if let Some(user) = self.users.get_mut(id) {
                if let Err(err) = user.notify(&notification) {
                    debug!(user_id = %id, error = %err, "relay rejection not delivered");
                }
            }
            return;
        }

        let delivered = self.broadcast_raw(frame, std::slice::from_ref(id));
        counter!(LOBBY_RELAY_FRAMES_TOTAL).increment(1);
        debug!(user_id = %id, delivered, bytes = frame.len(), "relay frame forwarded");
    }
}
