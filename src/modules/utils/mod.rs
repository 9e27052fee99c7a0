// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::mailbox::MailboxPath;

#[macro_export]
macro_rules! mailstore_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailStoreError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! decode_mailbox_name {
    ($name:expr) => {{
        utf7_imap::decode_utf7_imap($name.to_string())
    }};
}

#[macro_export]
macro_rules! encode_mailbox_name {
    ($name:expr) => {{
        utf7_imap::encode_utf7_imap($name.to_string())
    }};
}

/// Generates a 64-bit hash from a string, masked into JavaScript's safe
/// integer range (0 to 2^53 - 1) so ids survive JSON round-trips.
pub fn hash(s: &str) -> u64 {
    let mut cursor = std::io::Cursor::new(s.as_bytes().to_vec());
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    (hash & 0x1F_FFFF_FFFF_FFFF) as u64
}

/// Derive the document-backend mailbox id from its path. Stable across
/// restarts so the id survives re-opening the store.
pub fn mailbox_key(path: &MailboxPath) -> u64 {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(path.namespace.as_bytes());
    buffer.push(b':');
    buffer.extend_from_slice(path.user.as_bytes());
    buffer.push(b':');
    buffer.extend_from_slice(path.name.as_bytes());
    let mut cursor = std::io::Cursor::new(buffer);
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    hash as u64
}

/// Random 64-bit identifier for events and sessions.
pub fn generate_id() -> u64 {
    rand::random::<u64>() & 0x1F_FFFF_FFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_key_is_stable() {
        let path = MailboxPath::inbox("alice");
        assert_eq!(mailbox_key(&path), mailbox_key(&path.clone()));
        assert_ne!(mailbox_key(&path), mailbox_key(&MailboxPath::inbox("bob")));
    }

    #[test]
    fn test_hash_stays_in_safe_integer_range() {
        for input in ["", "INBOX", "a very long mailbox path with spaces"] {
            assert!(hash(input) <= 0x1F_FFFF_FFFF_FFFF);
        }
    }
}
