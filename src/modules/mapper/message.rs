// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::index::MessageSearchIndex;
use crate::modules::mailbox::{Mailbox, MailboxId};
use crate::modules::message::{
    FetchType, Flags, MailMessage, MessageMetaData, MessageRange, UpdatedFlags,
};
use crate::modules::search::{evaluator, SearchQuery};
use crate::modules::sequence::{SequenceRegistry, SequenceSource};
use crate::modules::transaction::TransactionalMapper;
use crate::raise_error;
use std::collections::BTreeMap;

/// Per-session message operations of one backend.
///
/// The uid / modseq engine lives entirely in the provided methods; a
/// backend implements only its query and persistence primitives. Every
/// provided operation runs inside a transactional frame.
pub trait MessageMapper<Id: MailboxId>: TransactionalMapper + SequenceSource<Id> {
    // ---- query primitives -------------------------------------------------

    /// Total number of messages in the mailbox.
    fn count_messages(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>;

    /// Number of messages lacking the Seen flag.
    fn count_unseen(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>;

    /// Messages whose uid falls in `range`, ascending by uid, capped by
    /// `max`. `fetch_type` tells the backend how much to load.
    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox<Id>,
        range: MessageRange,
        fetch_type: FetchType,
        max: Option<usize>,
    ) -> MailStoreResult<Vec<MailMessage<Id>>>;

    /// Ascending uids of messages carrying the Recent flag.
    fn find_recent_uids(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<Vec<u64>>;

    /// Smallest uid lacking the Seen flag.
    fn find_first_unseen_uid(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<Option<u64>>;

    // ---- persistence primitives ------------------------------------------

    /// Persist the message. Inserts a new (mailbox, uid) pair; for an
    /// existing pair only the mutable metadata (flags, modseq) is written,
    /// the stored content stays authoritative.
    fn save(&self, mailbox: &Mailbox<Id>, message: &MailMessage<Id>) -> MailStoreResult<()>;

    /// Persist the sequence high-water marks atomically with respect to the
    /// surrounding frame.
    fn save_sequences(
        &self,
        mailbox: &Mailbox<Id>,
        last_uid: u64,
        highest_modseq: u64,
    ) -> MailStoreResult<()>;

    /// Materialize a duplicate of `original` in the mailbox under the given
    /// uid and modseq. Content and flags are preserved; Recent is set on
    /// the destination copy.
    fn copy_message(
        &self,
        mailbox: &Mailbox<Id>,
        uid: u64,
        modseq: u64,
        original: &MailMessage<Id>,
    ) -> MailStoreResult<MailMessage<Id>>;

    /// Remove every Deleted-flagged message in range, returning a map from
    /// uid to the pre-deletion metadata.
    fn expunge(
        &self,
        mailbox: &Mailbox<Id>,
        range: MessageRange,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>>;

    // ---- wiring ----------------------------------------------------------

    /// The store's sequence registry.
    fn sequences(&self) -> &SequenceRegistry<Id>;

    /// Optional external search index.
    fn search_index(&self) -> Option<&dyn MessageSearchIndex<Id>> {
        None
    }

    // ---- provided operations ---------------------------------------------

    /// Last issued uid for the mailbox.
    fn last_uid(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>
    where
        Self: Sized,
    {
        self.sequences().current_uid(mailbox, self)
    }

    /// Highest issued modseq for the mailbox.
    fn highest_modseq(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>
    where
        Self: Sized,
    {
        self.sequences().current_modseq(mailbox, self)
    }

    /// Assign the next uid and modseq, persist the message, and persist the
    /// advanced counters.
    fn add(
        &self,
        mailbox: &Mailbox<Id>,
        mut message: MailMessage<Id>,
    ) -> MailStoreResult<MessageMetaData>
    where
        Self: Sized,
    {
        self.execute(|| {
            message.uid = self.sequences().next_uid(mailbox, self)?;
            message.modseq = self.sequences().next_modseq(mailbox, self)?;
            self.save(mailbox, &message)?;
            self.save_sequences(mailbox, message.uid, message.modseq)?;
            if let Some(index) = self.search_index() {
                index.add(mailbox, &message)?;
            }
            Ok(message.metadata())
        })
    }

    /// Duplicate `original` into the mailbox under fresh uid / modseq.
    fn copy(
        &self,
        mailbox: &Mailbox<Id>,
        original: &MailMessage<Id>,
    ) -> MailStoreResult<MessageMetaData>
    where
        Self: Sized,
    {
        self.execute(|| {
            let uid = self.sequences().next_uid(mailbox, self)?;
            let modseq = self.sequences().next_modseq(mailbox, self)?;
            let duplicate = self.copy_message(mailbox, uid, modseq, original)?;
            self.save_sequences(mailbox, uid, modseq)?;
            if let Some(index) = self.search_index() {
                index.add(mailbox, &duplicate)?;
            }
            Ok(duplicate.metadata())
        })
    }

    /// Backends may support a native move; the default refuses.
    fn move_message(
        &self,
        _mailbox: &Mailbox<Id>,
        _original: &MailMessage<Id>,
    ) -> MailStoreResult<MessageMetaData> {
        Err(raise_error!(
            "move is not supported by this backend".into(),
            ErrorCode::NotSupported
        ))
    }

    /// Apply a flag change to every message in range. All actual changes of
    /// one batch share a single newly allocated modseq; a batch that
    /// changes nothing allocates nothing and persists nothing.
    fn update_flags(
        &self,
        mailbox: &Mailbox<Id>,
        flags: &Flags,
        value: bool,
        replace: bool,
        range: MessageRange,
    ) -> MailStoreResult<Vec<UpdatedFlags>>
    where
        Self: Sized,
    {
        self.execute(|| {
            let mut members = self.find_in_mailbox(mailbox, range, FetchType::Metadata, None)?;
            let mut updated = Vec::with_capacity(members.len());
            let mut batch_modseq: Option<u64> = None;
            for member in &mut members {
                let original = member.flags.clone();
                let new_flags = if replace {
                    flags.clone()
                } else if value {
                    original.union_with(flags)
                } else {
                    original.subtract(flags)
                };
                if new_flags != original {
                    let modseq = match batch_modseq {
                        Some(allocated) => allocated,
                        None => {
                            let allocated = self.sequences().next_modseq(mailbox, self)?;
                            batch_modseq = Some(allocated);
                            allocated
                        }
                    };
                    member.flags = new_flags.clone();
                    member.modseq = modseq;
                    self.save(mailbox, member)?;
                    if let Some(index) = self.search_index() {
                        index.update(mailbox, MessageRange::One(member.uid), &new_flags)?;
                    }
                }
                updated.push(UpdatedFlags {
                    uid: member.uid,
                    modseq: member.modseq,
                    old_flags: original,
                    new_flags,
                });
            }
            if let Some(modseq) = batch_modseq {
                let last_uid = self.sequences().current_uid(mailbox, self)?;
                self.save_sequences(mailbox, last_uid, modseq)?;
            }
            Ok(updated)
        })
    }

    /// Remove every Deleted message in range. A non-empty removal advances
    /// both counters once and persists them, so expunge responses stay
    /// unique across later re-appends; an empty match advances nothing.
    fn expunge_marked_for_deletion(
        &self,
        mailbox: &Mailbox<Id>,
        range: MessageRange,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>>
    where
        Self: Sized,
    {
        self.execute(|| {
            let data = self.expunge(mailbox, range)?;
            if !data.is_empty() {
                let last_uid = self.sequences().next_uid(mailbox, self)?;
                let highest_modseq = self.sequences().next_modseq(mailbox, self)?;
                self.save_sequences(mailbox, last_uid, highest_modseq)?;
                if let Some(index) = self.search_index() {
                    let uids: Vec<u64> = data.keys().copied().collect();
                    for sub_range in MessageRange::to_ranges(&uids) {
                        index.delete(mailbox, sub_range)?;
                    }
                }
            }
            Ok(data)
        })
    }

    /// Ascending uids matching the query. Delegates to the external index
    /// when one is configured. A pure uid-range query is satisfied by
    /// ranged lookups; everything else loads the candidates and evaluates
    /// each one.
    fn search(&self, mailbox: &Mailbox<Id>, query: &SearchQuery) -> MailStoreResult<Vec<u64>>
    where
        Self: Sized,
    {
        if let Some(index) = self.search_index() {
            return index.search(mailbox, query);
        }
        if let Some(ranges) = query.as_single_uid_criterion() {
            let mut uids = Vec::new();
            for range in ranges {
                let members = self.find_in_mailbox(
                    mailbox,
                    MessageRange::Range(range.low, range.high),
                    FetchType::Metadata,
                    None,
                )?;
                for member in members {
                    if !uids.contains(&member.uid) {
                        uids.push(member.uid);
                    }
                }
            }
            uids.sort_unstable();
            Ok(uids)
        } else {
            let members = self.find_in_mailbox(mailbox, MessageRange::All, FetchType::Full, None)?;
            let mut hits = Vec::new();
            for member in &members {
                if evaluator::matches_query(query, member)? {
                    hits.push(member.uid);
                }
            }
            hits.sort_unstable();
            Ok(hits)
        }
    }
}
