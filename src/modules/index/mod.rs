// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::mailbox::{Mailbox, MailboxId};
use crate::modules::message::{Flags, MailMessage, MessageRange};
use crate::modules::search::SearchQuery;

/// Capability contract of an optional external full-text index. When a
/// mapper is configured with one, `search` delegates to it and the write
/// operations keep it current. Index internals are out of scope here.
pub trait MessageSearchIndex<Id: MailboxId>: Send + Sync {
    /// Index a newly stored message.
    fn add(&self, mailbox: &Mailbox<Id>, message: &MailMessage<Id>) -> MailStoreResult<()>;

    /// Reflect a flag change for every message in the range.
    fn update(
        &self,
        mailbox: &Mailbox<Id>,
        range: MessageRange,
        flags: &Flags,
    ) -> MailStoreResult<()>;

    /// Drop index entries for expunged messages.
    fn delete(&self, mailbox: &Mailbox<Id>, range: MessageRange) -> MailStoreResult<()>;

    /// Evaluate the query, returning matching uids in ascending order.
    fn search(&self, mailbox: &Mailbox<Id>, query: &SearchQuery) -> MailStoreResult<Vec<u64>>;
}
