// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    models::{
        record::{BROADCAST_RECEIVER, GROUP_PREFIX, Record, RecordType},
        response::ResponseCode,
    },
    server::{registry::ClientStatus, session::SessionManager},
};

/// What routing one record produced: the reply code for the sender, how many
/// sockets accepted the frame, and recipients whose transport is gone (the
/// event loop removes those on its next tick).
#[derive(Debug)]
pub struct RouteOutcome {
    pub code: ResponseCode,
    pub delivered: usize,
    pub dead: Vec<u64>,
}

impl RouteOutcome {
    fn with_code(code: ResponseCode) -> Self {
        Self {
            code,
            delivered: 0,
            dead: Vec::new(),
        }
    }
}

/// Routes a record whose sender has already been verified against the source
/// handle's bound identity. `source` is used only to exclude the sender from
/// broadcasts.
pub fn route(
    sessions: &SessionManager,
    record: &mut Record,
    source: u64,
) -> RouteOutcome {
    match record.record_type {
        RecordType::Msg => route_direct(sessions, record),
        RecordType::Broadcast => route_broadcast(sessions, record, source),
        RecordType::Group => {
            debug!(
                target_group = %record.receiver,
                "group record recognized, feature not implemented"
            );
            RouteOutcome::with_code(ResponseCode::ServerError)
        },
        other => {
            // LOGIN/LOGOUT/HISTORY/STATUS stay in the command handler and
            // OK/ERROR are consumed there; nothing else is routable.
            debug!(record_type = %other, "record type is not routable");
            RouteOutcome::with_code(ResponseCode::ServerError)
        },
    }
}

fn route_direct(sessions: &SessionManager, record: &mut Record) -> RouteOutcome {
    let receiver = record.receiver.as_str();
    if receiver == BROADCAST_RECEIVER || receiver.starts_with(GROUP_PREFIX) {
        // Only a plain username addresses a private message.
        return RouteOutcome::with_code(ResponseCode::UserNotFound);
    }

    match sessions.registry().find_by_username(receiver) {
        Some(entry) => {
            let frame = Bytes::from(record.serialize());
            if entry.enqueue(frame) {
                record.delivered = true;
                RouteOutcome {
                    code: ResponseCode::Success,
                    delivered: 1,
                    dead: Vec::new(),
                }
            } else {
                warn!(handle = entry.handle, "recipient transport is gone");
                RouteOutcome {
                    code: ResponseCode::UserOffline,
                    delivered: 0,
                    dead: vec![entry.handle],
                }
            }
        },
        None if sessions.store().lookup_by_name(receiver).is_some() => {
            RouteOutcome::with_code(ResponseCode::UserOffline)
        },
        None => RouteOutcome::with_code(ResponseCode::UserNotFound),
    }
}

fn route_broadcast(
    sessions: &SessionManager,
    record: &mut Record,
    source: u64,
) -> RouteOutcome {
    // Serialize once; every recipient gets the same frame.
    let frame = Bytes::from(record.serialize());
    let mut delivered = 0;
    let mut dead = Vec::new();

    for snap in sessions.registry().snapshot() {
        if snap.handle == source || snap.status != ClientStatus::Authenticated {
            continue;
        }
        match sessions.registry().find_by_handle(snap.handle) {
            Some(entry) if entry.enqueue(frame.clone()) => delivered += 1,
            Some(entry) => {
                warn!(handle = entry.handle, "broadcast recipient transport is gone");
                dead.push(entry.handle);
            },
            None => {},
        }
    }

    let code = if delivered > 0 {
        record.delivered = true;
        ResponseCode::Success
    } else {
        ResponseCode::UserOffline
    };
    RouteOutcome {
        code,
        delivered,
        dead,
    }
}
