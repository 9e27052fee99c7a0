// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::mailbox::{Mailbox, MailboxId, MailboxPath};
use crate::modules::transaction::TransactionalMapper;
use regex::Regex;

/// Per-session mailbox operations of one backend.
pub trait MailboxMapper<Id: MailboxId>: TransactionalMapper {
    /// The mailbox stored under the path, if any.
    fn find_by_path(&self, path: &MailboxPath) -> MailStoreResult<Option<Mailbox<Id>>>;

    /// Mailboxes whose name matches the pattern path within its namespace
    /// and user. The name supports the IMAP wildcards `*` (any characters)
    /// and `%` (any characters except the delimiter).
    fn find_with_path_like(
        &self,
        pattern: &MailboxPath,
        delimiter: char,
    ) -> MailStoreResult<Vec<Mailbox<Id>>>;

    /// Whether any mailbox exists one or more levels below this one.
    fn has_children(&self, mailbox: &Mailbox<Id>, delimiter: char) -> MailStoreResult<bool>;

    /// Insert or update. A path collision with a different mailbox fails
    /// with `MailboxExists`. Updating a stored mailbox under a new path is
    /// a rename and preserves its uid-validity. Assigns `mailbox.id` on
    /// first insert.
    fn save(&self, mailbox: &mut Mailbox<Id>) -> MailStoreResult<()>;

    /// Delete the mailbox. Children are separate mailboxes and survive.
    fn delete(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<()>;

    /// All mailboxes of the store.
    fn list(&self) -> MailStoreResult<Vec<Mailbox<Id>>>;
}

/// Compile an IMAP list pattern into a regex over mailbox names.
pub fn compile_pattern(pattern: &str, delimiter: char) -> MailStoreResult<Regex> {
    let mut expression = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '%' => expression.push_str(&format!("[^{}]*", regex::escape(&delimiter.to_string()))),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|e| {
        crate::raise_error!(
            format!("invalid list pattern '{}': {}", pattern, e),
            crate::modules::error::code::ErrorCode::InvalidParameter
        )
    })
}
