// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use crate::{
    models::codec::{
        self, CodecError, MAX_CONTENT_CHARS, MAX_NAME_CHARS,
    },
    utils::now_wire_timestamp,
};

/// RECEIVER value addressing every authenticated client except the sender.
pub const BROADCAST_RECEIVER: &str = "*";
/// RECEIVER prefix addressing a group target.
pub const GROUP_PREFIX: &str = "group:";
/// RECEIVER value for records directed at the server itself.
pub const SERVER_RECEIVER: &str = "server";

/// Message-ids handed to parsed records start here.
pub const FIRST_MESSAGE_ID: u64 = 100;

/// The TYPE tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Login,
    Logout,
    Msg,
    Broadcast,
    Group,
    History,
    Status,
    Ok,
    Error,
}

impl RecordType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "LOGIN" => Self::Login,
            "LOGOUT" => Self::Logout,
            "MSG" => Self::Msg,
            "BROADCAST" => Self::Broadcast,
            "GROUP" => Self::Group,
            "HISTORY" => Self::History,
            "STATUS" => Self::Status,
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::Msg => "MSG",
            Self::Broadcast => "BROADCAST",
            Self::Group => "GROUP",
            Self::History => "HISTORY",
            Self::Status => "STATUS",
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }

    /// OK/ERROR frames coming *from* a client are consumed without a reply.
    pub fn is_reply(self) -> bool {
        matches!(self, Self::Ok | Self::Error)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One parsed frame. Owned by the stack frame that parsed or built it; never
/// stored beyond the routing call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub sender: String,
    pub receiver: String,
    pub timestamp: String,
    pub content: String,
    pub message_id: u64,
    pub delivered: bool,
}

/// Parse result: the record plus whether TIMESTAMP had to be synthesized from
/// the server clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub record: Record,
    pub timestamp_synthesized: bool,
}

impl Record {
    /// Builds a record with the current wall-clock timestamp.
    pub fn new(
        record_type: RecordType,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
        message_id: u64,
    ) -> Self {
        Self {
            record_type,
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: now_wire_timestamp(),
            content: content.into(),
            message_id,
            delivered: false,
        }
    }

    /// Parses one frame (terminator stripped). `message_id` is the caller's
    /// monotonic counter value. An empty TIMESTAMP is replaced with the
    /// current wall clock and reported through
    /// [`Parsed::timestamp_synthesized`].
    pub fn parse(raw: &[u8], message_id: u64) -> Result<Parsed, CodecError> {
        let text = codec::check_frame(raw)?;
        let [tag, sender, receiver, timestamp, content] = codec::split_fields(text)?;

        let record_type = RecordType::from_tag(tag)
            .ok_or_else(|| CodecError::UnknownType(tag.to_string()))?;

        let sender = codec::unescape(sender);
        let receiver = codec::unescape(receiver);
        let timestamp = codec::unescape(timestamp);
        let content = codec::unescape(content);

        if sender.chars().count() > MAX_NAME_CHARS {
            return Err(CodecError::FieldTooLong {
                field: "sender",
                max: MAX_NAME_CHARS,
            });
        }
        if !receiver_within_limits(&receiver) {
            return Err(CodecError::FieldTooLong {
                field: "receiver",
                max: MAX_NAME_CHARS,
            });
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CodecError::FieldTooLong {
                field: "content",
                max: MAX_CONTENT_CHARS,
            });
        }

        let timestamp_synthesized = timestamp.is_empty();
        let timestamp = if timestamp_synthesized {
            now_wire_timestamp()
        } else {
            timestamp
        };

        Ok(Parsed {
            record: Record {
                record_type,
                sender,
                receiver,
                timestamp,
                content,
                message_id,
                delivered: false,
            },
            timestamp_synthesized,
        })
    }

    /// Escapes every field, joins with `|` and appends the terminator.
    pub fn serialize(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}\n",
            self.record_type,
            codec::escape(&self.sender),
            codec::escape(&self.receiver),
            codec::escape(&self.timestamp),
            codec::escape(&self.content),
        )
    }
}

fn receiver_within_limits(receiver: &str) -> bool {
    if receiver == BROADCAST_RECEIVER || receiver == SERVER_RECEIVER {
        return true;
    }
    let name = receiver.strip_prefix(GROUP_PREFIX).unwrap_or(receiver);
    name.chars().count() <= MAX_NAME_CHARS
}
