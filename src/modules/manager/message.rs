// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::event::dispatcher::ListenerDispatcher;
use crate::modules::event::{EventPayload, MailboxEvent};
use crate::modules::mailbox::{Mailbox, MailboxPath};
use crate::modules::mapper::{MessageMapper, SessionMapperFactory};
use crate::modules::message::{
    FetchType, Flag, Flags, MailMessage, MessageMetaData, MessageRange, UpdatedFlags,
};
use crate::modules::search::SearchQuery;
use crate::modules::session::MailboxSession;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Metadata snapshot returned by `get_metadata`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MailboxMetaData {
    pub uid_validity: u64,
    pub next_uid: u64,
    pub highest_modseq: u64,
    pub message_count: u64,
    pub unseen_count: u64,
    pub first_unseen: Option<u64>,
    pub recent: Vec<u64>,
    pub permanent_flags: Flags,
}

/// Per-session view of one mailbox. Owns its mapper, tracks the session's
/// Recent claim, and announces every change through the dispatcher.
pub struct MessageManager<F: SessionMapperFactory> {
    mailbox: Mailbox<F::Id>,
    mapper: F::MessageMapper,
    dispatcher: Arc<ListenerDispatcher>,
    recent: Mutex<BTreeSet<u64>>,
}

impl<F: SessionMapperFactory> MessageManager<F> {
    pub(crate) fn open(
        mailbox: Mailbox<F::Id>,
        mapper: F::MessageMapper,
        dispatcher: Arc<ListenerDispatcher>,
    ) -> MailStoreResult<Self> {
        // The opening session claims the mailbox's Recent messages.
        let recent: BTreeSet<u64> = mapper.find_recent_uids(&mailbox)?.into_iter().collect();
        Ok(Self {
            mailbox,
            mapper,
            dispatcher,
            recent: Mutex::new(recent),
        })
    }

    pub fn mailbox(&self) -> &Mailbox<F::Id> {
        &self.mailbox
    }

    pub fn path(&self) -> &MailboxPath {
        &self.mailbox.path
    }

    /// Append raw content, returning the assigned uid.
    pub fn append_message(
        &self,
        raw: &[u8],
        internal_date: i64,
        session: &MailboxSession,
        is_recent: bool,
        initial_flags: &Flags,
    ) -> MailStoreResult<u64> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let mut flags = initial_flags.clone();
        if is_recent {
            flags.insert(Flag::Recent);
        }
        let message =
            MailMessage::from_raw(self.mailbox.stored_id()?, raw, internal_date, flags);
        let metadata = self.mapper.add(&self.mailbox, message)?;
        debug!("appended uid {} to {}", metadata.uid, self.mailbox.path);
        if is_recent {
            self.recent_set().insert(metadata.uid);
        }
        self.dispatcher.dispatch(&MailboxEvent::new(
            self.mailbox.path.clone(),
            EventPayload::MessageAdded {
                metadata: metadata.clone(),
            },
        ));
        Ok(metadata.uid)
    }

    pub fn get_metadata(&self, session: &MailboxSession) -> MailStoreResult<MailboxMetaData> {
        session.ensure_open()?;
        Ok(MailboxMetaData {
            uid_validity: self.mailbox.uid_validity,
            next_uid: self.mapper.last_uid(&self.mailbox)? + 1,
            highest_modseq: self.mapper.highest_modseq(&self.mailbox)?,
            message_count: self.mapper.count_messages(&self.mailbox)?,
            unseen_count: self.mapper.count_unseen(&self.mailbox)?,
            first_unseen: self.mapper.find_first_unseen_uid(&self.mailbox)?,
            recent: self.recent_set().iter().copied().collect(),
            permanent_flags: Flags::new()
                .with(Flag::Seen)
                .with(Flag::Answered)
                .with(Flag::Flagged)
                .with(Flag::Deleted)
                .with(Flag::Draft),
        })
    }

    pub fn get_messages(
        &self,
        range: MessageRange,
        fetch_type: FetchType,
        session: &MailboxSession,
    ) -> MailStoreResult<Vec<MailMessage<F::Id>>> {
        session.ensure_open()?;
        self.mapper
            .find_in_mailbox(&self.mailbox, range, fetch_type, None)
    }

    /// Apply a flag change and announce one FlagsUpdated per actual change.
    pub fn set_flags(
        &self,
        range: MessageRange,
        flags: &Flags,
        value: bool,
        replace: bool,
        session: &MailboxSession,
    ) -> MailStoreResult<Vec<UpdatedFlags>> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let updated = self
            .mapper
            .update_flags(&self.mailbox, flags, value, replace, range)?;
        for entry in updated.iter().filter(|entry| entry.flags_changed()) {
            self.dispatcher.dispatch(&MailboxEvent::new(
                self.mailbox.path.clone(),
                EventPayload::FlagsUpdated {
                    updated: entry.clone(),
                },
            ));
        }
        Ok(updated)
    }

    /// Expunge Deleted messages in range. Events are coalesced into
    /// contiguous uid sub-ranges.
    pub fn expunge(
        &self,
        range: MessageRange,
        session: &MailboxSession,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let data = self.mapper.expunge_marked_for_deletion(&self.mailbox, range)?;
        let uids: Vec<u64> = data.keys().copied().collect();
        {
            let mut recent = self.recent_set();
            for uid in &uids {
                recent.remove(uid);
            }
        }
        for sub_range in MessageRange::to_ranges(&uids) {
            let range_uids: Vec<u64> = uids
                .iter()
                .copied()
                .filter(|uid| sub_range.contains(*uid))
                .collect();
            self.dispatcher.dispatch(&MailboxEvent::new(
                self.mailbox.path.clone(),
                EventPayload::MessageExpunged {
                    range: sub_range,
                    uids: range_uids,
                },
            ));
        }
        Ok(data)
    }

    /// Copy every message in range into the destination mailbox. The copies
    /// carry Recent and are claimed by the destination manager's session.
    pub fn copy_to(
        &self,
        range: MessageRange,
        destination: &MessageManager<F>,
        session: &MailboxSession,
    ) -> MailStoreResult<Vec<MessageMetaData>> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let sources =
            self.mapper
                .find_in_mailbox(&self.mailbox, range, FetchType::Full, None)?;
        let mut copies = Vec::with_capacity(sources.len());
        for source in &sources {
            let metadata = destination
                .mapper
                .copy(&destination.mailbox, source)?;
            destination.recent_set().insert(metadata.uid);
            destination.dispatcher.dispatch(&MailboxEvent::new(
                destination.mailbox.path.clone(),
                EventPayload::MessageAdded {
                    metadata: metadata.clone(),
                },
            ));
            copies.push(metadata);
        }
        Ok(copies)
    }

    /// Ascending uids matching the query, evaluated with this session's
    /// Recent claim.
    pub fn search(
        &self,
        query: &SearchQuery,
        session: &MailboxSession,
    ) -> MailStoreResult<Vec<u64>> {
        session.ensure_open()?;
        let mut query = query.clone();
        query.recent_uids = self.recent_set().clone();
        self.mapper.search(&self.mailbox, &query)
    }

    /// Close the mailbox for this session: the session's Recent claim is
    /// released and the flag is cleared from the store.
    pub fn close(&self, session: &MailboxSession) -> MailStoreResult<()> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let claimed: Vec<u64> = self.recent_set().iter().copied().collect();
        for sub_range in MessageRange::to_ranges(&claimed) {
            let updated = self.mapper.update_flags(
                &self.mailbox,
                &Flags::new().with(Flag::Recent),
                false,
                false,
                sub_range,
            )?;
            for entry in updated.iter().filter(|entry| entry.flags_changed()) {
                self.dispatcher.dispatch(&MailboxEvent::new(
                    self.mailbox.path.clone(),
                    EventPayload::FlagsUpdated {
                        updated: entry.clone(),
                    },
                ));
            }
        }
        self.recent_set().clear();
        Ok(())
    }

    fn recent_set(&self) -> MutexGuard<'_, BTreeSet<u64>> {
        match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
