// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    models::{
        record::{FIRST_MESSAGE_ID, Record, RecordType},
        response::{Response, ResponseCode},
    },
    server::{router, session::SessionManager},
};

/// Top-level per-frame logic: parse, gate on the session state, mutate the
/// session or hand off to the router, and always produce a reply (except for
/// OK/ERROR frames, which are consumed).
pub struct CommandHandler {
    sessions: SessionManager,
    next_message_id: u64,
    require_auth: bool,
}

impl CommandHandler {
    pub fn new(sessions: SessionManager, require_auth: bool) -> Self {
        Self {
            sessions,
            next_message_id: FIRST_MESSAGE_ID,
            require_auth,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    fn alloc_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    /// Entry point for one complete frame from `handle`. Returns the handles
    /// whose transport died while replying or routing; the event loop removes
    /// them on its next tick.
    pub fn handle_raw(&mut self, handle: u64, raw: &[u8]) -> Vec<u64> {
        self.sessions.registry_mut().touch(handle);
        let mut dead = Vec::new();

        let message_id = self.alloc_message_id();
        let mut record = match Record::parse(raw, message_id) {
            Ok(parsed) => {
                if parsed.timestamp_synthesized {
                    debug!(handle, message_id, "timestamp synthesized from server clock");
                }
                parsed.record
            },
            Err(e) => {
                debug!(handle, error = %e, "rejected frame");
                self.send_response(
                    handle,
                    ResponseCode::ServerError,
                    "Failed to parse message",
                    &mut dead,
                );
                return dead;
            },
        };

        match record.record_type {
            RecordType::Ok | RecordType::Error => {
                debug!(handle, record_type = %record.record_type, "reply frame consumed");
            },
            RecordType::Login => self.handle_login(handle, &record, &mut dead),
            RecordType::Logout => self.handle_logout(handle, &mut dead),
            RecordType::Msg | RecordType::Broadcast | RecordType::Group => {
                self.handle_route(handle, &mut record, &mut dead);
            },
            RecordType::History => self.handle_history(handle, &mut dead),
            RecordType::Status => self.handle_status(handle, &mut dead),
        }
        dead
    }

    fn handle_login(&mut self, handle: u64, record: &Record, dead: &mut Vec<u64>) {
        // Username travels in SENDER, the credential in CONTENT.
        match self
            .sessions
            .authenticate(handle, &record.sender, &record.content)
        {
            Ok(()) => {
                self.send_response(
                    handle,
                    ResponseCode::Success,
                    "Login successful",
                    dead,
                );
            },
            Err(e) => {
                debug!(handle, user = %record.sender, error = %e, "login refused");
                self.send_response(handle, e.code(), &e.to_string(), dead);
            },
        }
    }

    fn handle_logout(&mut self, handle: u64, dead: &mut Vec<u64>) {
        if !self.sessions.is_authenticated(handle) {
            self.send_response(handle, ResponseCode::AuthFailed, "Not logged in", dead);
            return;
        }
        self.sessions.logout(handle);
        self.send_response(handle, ResponseCode::Success, "Logout successful", dead);
    }

    fn handle_route(&mut self, handle: u64, record: &mut Record, dead: &mut Vec<u64>) {
        if !self.require_authenticated(handle, dead) {
            return;
        }
        let bound = self.sessions.bound_username(handle).map(ToOwned::to_owned);
        if let Some(bound) = bound
            && bound != record.sender
        {
            debug!(handle, claimed = %record.sender, bound = %bound, "spoofed sender");
            self.send_response(handle, ResponseCode::AuthFailed, "Sender mismatch", dead);
            return;
        }

        let outcome = router::route(&self.sessions, record, handle);
        dead.extend_from_slice(&outcome.dead);
        let text = route_reply_text(record.record_type, outcome.code);
        self.send_response(handle, outcome.code, text, dead);
    }

    fn handle_history(&mut self, handle: u64, dead: &mut Vec<u64>) {
        if !self.require_authenticated(handle, dead) {
            return;
        }
        self.send_response(
            handle,
            ResponseCode::ServerError,
            "History retrieval is not implemented yet",
            dead,
        );
    }

    fn handle_status(&mut self, handle: u64, dead: &mut Vec<u64>) {
        if !self.require_authenticated(handle, dead) {
            return;
        }
        let connected = self.sessions.registry().count();
        let online = self.sessions.online_users().len();
        let registered = self.sessions.store().len();
        let own = self
            .sessions
            .registry()
            .find_by_handle(handle)
            .map_or("unknown", |c| c.status.label());
        let text =
            format!("clients={connected} online={online} registered={registered} you={own}");
        self.send_response(handle, ResponseCode::Success, &text, dead);
    }

    /// Gate shared by every record type that acts on behalf of a user. The
    /// `require_auth` switch relaxes it for unauthenticated connections.
    fn require_authenticated(&mut self, handle: u64, dead: &mut Vec<u64>) -> bool {
        if !self.require_auth || self.sessions.is_authenticated(handle) {
            return true;
        }
        self.send_response(
            handle,
            ResponseCode::AuthFailed,
            "Authentication required",
            dead,
        );
        false
    }

    /// Every reply funnels through here. A dead outbound channel is reported
    /// back so the connection gets removed on the next event-loop tick.
    fn send_response(
        &mut self,
        handle: u64,
        code: ResponseCode,
        message: &str,
        dead: &mut Vec<u64>,
    ) {
        let frame = Bytes::from(Response::new(code, message).to_frame());
        match self.sessions.registry().find_by_handle(handle) {
            Some(entry) => {
                if !entry.enqueue(frame) {
                    warn!(handle, "reply write failed, scheduling removal");
                    dead.push(handle);
                }
            },
            None => debug!(handle, "reply for a connection that is already gone"),
        }
    }
}

fn route_reply_text(record_type: RecordType, code: ResponseCode) -> &'static str {
    match code {
        ResponseCode::Success => match record_type {
            RecordType::Broadcast => "Broadcast delivered",
            _ => "Message delivered",
        },
        ResponseCode::UserOffline => match record_type {
            RecordType::Broadcast => "No users online",
            _ => "User is offline",
        },
        ResponseCode::UserNotFound => "User not found",
        ResponseCode::ServerError => "Group messaging is not implemented yet",
        _ => "Message routing failed",
    }
}
