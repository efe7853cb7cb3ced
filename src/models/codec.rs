// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::str;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Upper bound for one escaped frame, terminator excluded.
pub const MAX_FRAME_BYTES: usize = 1024;
/// Frames at or below this many bytes are rejected, terminator excluded.
pub const MIN_FRAME_BYTES: usize = 5;
/// Character cap for usernames and group names.
pub const MAX_NAME_CHARS: usize = 31;
/// Character cap for the CONTENT field, after unescaping.
pub const MAX_CONTENT_CHARS: usize = 255;
/// A frame always carries exactly five fields.
pub const FIELD_COUNT: usize = 5;

/// Everything the framing and parsing layer can reject.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes ({0})")]
    TooLong(usize),
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("expected at least {min} field separators, found {0}", min = FIELD_COUNT - 1)]
    MissingSeparators(usize),
    #[error("trailing unescaped backslash")]
    DanglingEscape,
    #[error("unknown record type `{0}`")]
    UnknownType(String),
    #[error("{field} exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

/// Escapes one field for the wire: `|` -> `\|`, `\` -> `\\`, newline -> `\n`
/// (two characters, the second being the letter n). Injective; round-trips
/// with [`unescape`].
pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '|' => out.push_str("\\|"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Left inverse of [`escape`]. An unknown escape sequence decodes to the
/// backslash followed by the literal next character.
pub fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('|') => out.push('|'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            },
            // A dangling escape never reaches here through `parse`; the frame
            // is rejected by `check_frame` first.
            None => out.push('\\'),
        }
    }
    out
}

/// True iff `raw` (terminator stripped) is an acceptable frame.
pub fn validate(raw: &[u8]) -> bool {
    check_frame(raw).is_ok()
}

/// Full validation, returning the frame as text on success.
pub(crate) fn check_frame(raw: &[u8]) -> Result<&str, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }
    if raw.len() <= MIN_FRAME_BYTES {
        return Err(CodecError::TooShort(raw.len()));
    }
    if raw.len() > MAX_FRAME_BYTES {
        return Err(CodecError::TooLong(raw.len()));
    }
    let text = str::from_utf8(raw).map_err(|_| CodecError::NotUtf8)?;

    // An odd run of trailing backslashes leaves the final one dangling.
    let trailing = text.bytes().rev().take_while(|&b| b == b'\\').count();
    if trailing % 2 == 1 {
        return Err(CodecError::DanglingEscape);
    }

    let separators = count_unescaped_separators(text);
    if separators < FIELD_COUNT - 1 {
        return Err(CodecError::MissingSeparators(separators));
    }
    Ok(text)
}

fn count_unescaped_separators(text: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for b in text.bytes() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'|' => count += 1,
            _ => {},
        }
    }
    count
}

/// Splits a checked frame at its first four unescaped separators. Any further
/// unescaped `|` stays inside the fifth field; OK/ERROR frames rely on this to
/// carry `code|message` in CONTENT.
pub fn split_fields(text: &str) -> Result<[&str; FIELD_COUNT], CodecError> {
    let mut separators = [0usize; FIELD_COUNT - 1];
    let mut found = 0;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'|' if found < FIELD_COUNT - 1 => {
                separators[found] = i;
                found += 1;
            },
            _ => {},
        }
    }
    if found < FIELD_COUNT - 1 {
        return Err(CodecError::MissingSeparators(found));
    }
    Ok([
        &text[..separators[0]],
        &text[separators[0] + 1..separators[1]],
        &text[separators[1] + 1..separators[2]],
        &text[separators[2] + 1..separators[3]],
        &text[separators[3] + 1..],
    ])
}

/// Per-connection accumulator that re-frames an arbitrary byte stream into
/// complete `\n`-terminated frames, tolerating fragmentation and coalescence.
///
/// A newline preceded by an active escaping backslash does not terminate a
/// frame. When the buffer outgrows [`MAX_FRAME_BYTES`] without a terminator
/// the bytes are surfaced as one (invalid) frame so the caller can reject
/// them and the stream resynchronizes on the next newline.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: BytesMut,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_BYTES),
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame with the terminator stripped, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if let Some(i) = find_unescaped_newline(&self.buf) {
            let mut frame = self.buf.split_to(i + 1);
            frame.truncate(i);
            return Some(frame.freeze());
        }
        if self.buf.len() > MAX_FRAME_BYTES {
            return Some(self.buf.split().freeze());
        }
        None
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn find_unescaped_newline(buf: &[u8]) -> Option<usize> {
    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'\n' => return Some(i),
            _ => {},
        }
    }
    None
}
