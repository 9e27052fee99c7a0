// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::mailbox::MailboxPath;
use crate::modules::message::{MessageMetaData, MessageRange, UpdatedFlags};
use crate::modules::utils::generate_id;
use crate::utc_now;
use serde::{Deserialize, Serialize};

pub mod dispatcher;

/// A mailbox change notification delivered to path subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailboxEvent {
    /// Unique identifier for the event.
    pub event_id: u64,
    /// Timestamp (in milliseconds) when the event occurred.
    pub timestamp: i64,
    /// Path of the mailbox the event concerns. For renames this is the old
    /// path.
    pub path: MailboxPath,
    /// Payload describing the change.
    pub payload: EventPayload,
}

impl MailboxEvent {
    pub fn new(path: MailboxPath, payload: EventPayload) -> Self {
        Self {
            event_id: generate_id(),
            timestamp: utc_now!(),
            path,
            payload,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventPayload {
    /// A mailbox was created.
    MailboxAdded,
    /// A mailbox was deleted; its subscriptions are dropped.
    MailboxDeleted,
    /// A mailbox was renamed from `event.path` to `new_path`.
    MailboxRenamed { new_path: MailboxPath },
    /// A message was appended or copied in.
    MessageAdded { metadata: MessageMetaData },
    /// Messages were expunged; `range` is one contiguous uid sub-range.
    MessageExpunged { range: MessageRange, uids: Vec<u64> },
    /// One message's flags changed inside an update batch.
    FlagsUpdated { updated: UpdatedFlags },
}

/// A path subscriber. Membership in the dispatcher is by identity; a closed
/// listener eventually stops receiving events (pruned lazily on dispatch).
pub trait MailboxListener: Send + Sync {
    fn handle(&self, event: &MailboxEvent);

    fn is_closed(&self) -> bool {
        false
    }
}
