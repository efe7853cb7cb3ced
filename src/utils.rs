// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::Local;

use crate::models::codec::MAX_NAME_CHARS;

/// Wire timestamp layout (`YYYY-MM-DD HH:MM:SS`).
pub const WIRE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current wall-clock timestamp in the wire layout.
pub fn now_wire_timestamp() -> String {
    Local::now().format(WIRE_TS_FORMAT).to_string()
}

/// Checks a username against the allowed alphabet (`[A-Za-z0-9_]+`,
/// at most 31 characters).
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_CHARS
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
