// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::mailbox::MailboxId;
use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

pub mod flags;

pub use flags::{Flag, Flags};

/// How much of a message a `find_in_mailbox` caller needs. Backends may use
/// this to avoid loading bodies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchType {
    /// Uid, modseq, flags, size, internal date only.
    Metadata,
    /// Metadata plus the header sequence.
    Headers,
    /// Everything including the raw content.
    Full,
}

/// A uid selector. `All`, a single uid, an open-ended tail, or an inclusive
/// range.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageRange {
    All,
    One(u64),
    From(u64),
    Range(u64, u64),
}

impl MessageRange {
    pub fn contains(&self, uid: u64) -> bool {
        match *self {
            MessageRange::All => true,
            MessageRange::One(value) => uid == value,
            MessageRange::From(lo) => uid >= lo,
            MessageRange::Range(lo, hi) => uid >= lo && uid <= hi,
        }
    }

    /// Inclusive uid bounds of this range.
    pub fn bounds(&self) -> (u64, u64) {
        match *self {
            MessageRange::All => (1, u64::MAX),
            MessageRange::One(value) => (value, value),
            MessageRange::From(lo) => (lo, u64::MAX),
            MessageRange::Range(lo, hi) => (lo, hi),
        }
    }

    /// Coalesce a sorted uid list into contiguous sub-ranges. Used to group
    /// expunge responses.
    pub fn to_ranges(uids: &[u64]) -> Vec<MessageRange> {
        let mut ranges = Vec::new();
        let mut iter = uids.iter().copied();
        let Some(mut start) = iter.next() else {
            return ranges;
        };
        let mut end = start;
        for uid in iter {
            if uid == end + 1 {
                end = uid;
            } else {
                ranges.push(Self::coalesced(start, end));
                start = uid;
                end = uid;
            }
        }
        ranges.push(Self::coalesced(start, end));
        ranges
    }

    fn coalesced(start: u64, end: u64) -> MessageRange {
        if start == end {
            MessageRange::One(start)
        } else {
            MessageRange::Range(start, end)
        }
    }
}

/// One header field as enumerated from the raw content.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The metadata subset returned by `add`, `copy` and `expunge`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageMetaData {
    pub uid: u64,
    pub modseq: u64,
    pub flags: Flags,
    pub size: u64,
    pub internal_date: i64,
}

/// The pre/post image of one message's flags inside an `update_flags` batch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdatedFlags {
    pub uid: u64,
    pub modseq: u64,
    pub old_flags: Flags,
    pub new_flags: Flags,
}

impl UpdatedFlags {
    pub fn flags_changed(&self) -> bool {
        self.old_flags != self.new_flags
    }
}

/// A per-user mailbox subscription.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user: String,
    pub mailbox: String,
}

/// A message as seen by the mappers: identified by (mailbox id, uid),
/// carrying its flags, header sequence and raw content. `body` holds the
/// full raw message bytes; `headers` is the enumerated header sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailMessage<Id: MailboxId> {
    pub mailbox_id: Id,
    pub uid: u64,
    pub modseq: u64,
    pub internal_date: i64,
    pub size: u64,
    pub flags: Flags,
    pub headers: Vec<MessageHeader>,
    pub body: Vec<u8>,
}

impl<Id: MailboxId> MailMessage<Id> {
    /// Build an unassigned message from raw content. Uid and modseq are
    /// assigned by `MessageMapper::add`.
    pub fn from_raw(mailbox_id: Id, raw: &[u8], internal_date: i64, flags: Flags) -> Self {
        Self {
            mailbox_id,
            uid: 0,
            modseq: 0,
            internal_date,
            size: raw.len() as u64,
            flags,
            headers: enumerate_headers(raw),
            body: raw.to_vec(),
        }
    }

    pub fn metadata(&self) -> MessageMetaData {
        MessageMetaData {
            uid: self.uid,
            modseq: self.modseq,
            flags: self.flags.clone(),
            size: self.size,
            internal_date: self.internal_date,
        }
    }

    pub fn is_seen(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(&Flag::Deleted)
    }

    pub fn is_recent(&self) -> bool {
        self.flags.contains(&Flag::Recent)
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// The header block rendered back to text, for full-text search.
    pub fn headers_text(&self) -> String {
        self.headers
            .iter()
            .map(|h| format!("{}: {}", h.name, h.value))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    /// Decoded text of every body part, concatenated. Falls back to a lossy
    /// view of the raw body section when the content does not parse.
    pub fn decoded_body_text(&self) -> String {
        if let Some(parsed) = MessageParser::new().parse(&self.body) {
            let parts: Vec<String> = (0..)
                .map_while(|index| parsed.body_text(index))
                .map(|text| text.into_owned())
                .collect();
            if !parts.is_empty() {
                return parts.concat();
            }
        }
        String::from_utf8_lossy(raw_body_section(&self.body)).into_owned()
    }
}

/// Enumerate the header sequence of a raw message with the MIME parser.
/// Values are the raw field bodies, unfolded by the parser's offsets.
pub fn enumerate_headers(raw: &[u8]) -> Vec<MessageHeader> {
    let Some(parsed) = MessageParser::new().parse(raw) else {
        return Vec::new();
    };
    parsed
        .root_part()
        .headers
        .iter()
        .map(|header| {
            let value = raw
                .get(header.offset_start..header.offset_end)
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
                .unwrap_or_default();
            MessageHeader {
                name: header.name.as_str().to_string(),
                value,
            }
        })
        .collect()
}

fn raw_body_section(raw: &[u8]) -> &[u8] {
    let mut index = 0;
    while index + 3 < raw.len() {
        if &raw[index..index + 4] == b"\r\n\r\n" {
            return &raw[index + 4..];
        }
        index += 1;
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: alice@example.com\r\n\
Subject: lunch plans\r\n\
Date: Mon, 3 Mar 2025 10:15:00 +0000\r\n\
\r\n\
Let's meet at noon.\r\n";

    #[test]
    fn test_enumerate_headers() {
        let headers = enumerate_headers(RAW);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[0].name, "From");
        assert_eq!(headers[0].value, "alice@example.com");
        assert_eq!(headers[1].value, "lunch plans");
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let message = MailMessage::from_raw(1u64, RAW, 0, Flags::new());
        assert_eq!(message.header_value("subject"), Some("lunch plans"));
        assert_eq!(message.header_value("x-missing"), None);
    }

    #[test]
    fn test_decoded_body_text() {
        let message = MailMessage::from_raw(1u64, RAW, 0, Flags::new());
        assert!(message.decoded_body_text().contains("meet at noon"));
    }

    #[test]
    fn test_range_contains() {
        assert!(MessageRange::All.contains(7));
        assert!(MessageRange::One(3).contains(3));
        assert!(!MessageRange::One(3).contains(4));
        assert!(MessageRange::From(5).contains(9));
        assert!(!MessageRange::From(5).contains(4));
        assert!(MessageRange::Range(2, 4).contains(3));
        assert!(!MessageRange::Range(2, 4).contains(5));
    }

    #[test]
    fn test_to_ranges_coalesces() {
        let ranges = MessageRange::to_ranges(&[1, 2, 3, 5, 7, 8]);
        assert_eq!(
            ranges,
            vec![
                MessageRange::Range(1, 3),
                MessageRange::One(5),
                MessageRange::Range(7, 8),
            ]
        );
        assert!(MessageRange::to_ranges(&[]).is_empty());
    }
}
