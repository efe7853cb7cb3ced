// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use crate::{
    models::{
        codec,
        record::{RecordType, SERVER_RECEIVER},
    },
    utils::now_wire_timestamp,
};

/// Protocol reply codes. `Success` is the only code carried by an OK frame;
/// every other code rides an ERROR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    AuthFailed,
    UserNotFound,
    UserOffline,
    /// Reserved by the protocol; group messaging itself is still a stub.
    GroupFull,
    ServerError,
}

impl ResponseCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::AuthFailed => 1001,
            Self::UserNotFound => 1002,
            Self::UserOffline => 1003,
            Self::GroupFull => 1004,
            Self::ServerError => 5000,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// TYPE tag of the frame that carries this code.
    pub fn kind(self) -> RecordType {
        if self.is_success() {
            RecordType::Ok
        } else {
            RecordType::Error
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A server reply. Built transiently, serialized, discarded.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: ResponseCode,
    pub message: String,
    pub timestamp: String,
}

impl Response {
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: now_wire_timestamp(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::Success, message)
    }

    pub fn error(code: ResponseCode, message: impl Into<String>) -> Self {
        debug_assert!(!code.is_success());
        Self::new(code, message)
    }

    /// `OK|server|client|<ts>|<code>|<message>\n` (ERROR for non-zero codes).
    /// The separator between code and message is deliberately raw: the parser
    /// folds any separator past the fourth back into CONTENT.
    pub fn to_frame(&self) -> String {
        format!(
            "{}|{}|client|{}|{}|{}\n",
            self.code.kind(),
            SERVER_RECEIVER,
            codec::escape(&self.timestamp),
            self.code,
            codec::escape(&self.message),
        )
    }
}
