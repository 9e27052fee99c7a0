// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::mailbox::{Mailbox, MailboxId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Supplies the persisted high-water marks a registry cell is seeded from on
/// first touch. Every message mapper is a sequence source for its backend.
pub trait SequenceSource<Id: MailboxId> {
    /// Highest uid stored for the mailbox, or 0 when the backend cannot
    /// cheaply compute it.
    fn calculate_last_uid(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>;

    /// Highest modseq stored for the mailbox, ordered by modseq, or 0.
    fn calculate_highest_modseq(&self, mailbox: &Mailbox<Id>) -> MailStoreResult<u64>;
}

/// Per-mailbox last-uid / highest-modseq counters, shared by every session
/// of one store. Cells are plain atomics; allocation is a `fetch_add`, so
/// concurrent sessions never observe duplicates and values only grow.
///
/// The registry is an explicit value owned by the store and handed to its
/// mappers. Counter persistence is the mapper's duty via `save_sequences`.
pub struct SequenceRegistry<Id: MailboxId> {
    uids: DashMap<Id, Arc<AtomicU64>>,
    modseqs: DashMap<Id, Arc<AtomicU64>>,
}

impl<Id: MailboxId> Default for SequenceRegistry<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: MailboxId> SequenceRegistry<Id> {
    pub fn new() -> Self {
        Self {
            uids: DashMap::new(),
            modseqs: DashMap::new(),
        }
    }

    /// Allocate the next uid for the mailbox. The increment is visible to
    /// every session before this returns.
    pub fn next_uid<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<u64>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let cell = self.uid_cell(mailbox, source)?;
        Ok(cell.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Allocate the next modseq for the mailbox.
    pub fn next_modseq<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<u64>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let cell = self.modseq_cell(mailbox, source)?;
        Ok(cell.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Observe the last issued uid without incrementing.
    pub fn current_uid<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<u64>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let cell = self.uid_cell(mailbox, source)?;
        Ok(cell.load(Ordering::SeqCst))
    }

    /// Observe the highest issued modseq without incrementing.
    pub fn current_modseq<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<u64>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let cell = self.modseq_cell(mailbox, source)?;
        Ok(cell.load(Ordering::SeqCst))
    }

    /// Drop the cached counters for a mailbox, e.g. after deletion.
    pub fn evict(&self, id: &Id) {
        self.uids.remove(id);
        self.modseqs.remove(id);
    }

    fn uid_cell<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<Arc<AtomicU64>>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let id = mailbox.stored_id()?;
        if let Some(cell) = self.uids.get(&id) {
            return Ok(cell.clone());
        }
        // Two-step seeding: ask the backend first, fall back to the
        // persisted hint when it reports zero. Backends that cannot cheaply
        // compute MAX(uid) rely on the hint.
        let mut seed = source.calculate_last_uid(mailbox)?;
        if seed < 1 {
            seed = mailbox.last_known_uid;
        }
        let cell = self
            .uids
            .entry(id)
            .or_insert_with(|| Arc::new(AtomicU64::new(seed)));
        Ok(cell.clone())
    }

    fn modseq_cell<S>(&self, mailbox: &Mailbox<Id>, source: &S) -> MailStoreResult<Arc<AtomicU64>>
    where
        S: SequenceSource<Id> + ?Sized,
    {
        let id = mailbox.stored_id()?;
        if let Some(cell) = self.modseqs.get(&id) {
            return Ok(cell.clone());
        }
        let mut seed = source.calculate_highest_modseq(mailbox)?;
        if seed < 1 {
            seed = mailbox.highest_known_modseq;
        }
        let cell = self
            .modseqs
            .entry(id)
            .or_insert_with(|| Arc::new(AtomicU64::new(seed)));
        Ok(cell.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mailbox::MailboxPath;

    struct FixedSource {
        last_uid: u64,
        highest_modseq: u64,
    }

    impl SequenceSource<u64> for FixedSource {
        fn calculate_last_uid(&self, _mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
            Ok(self.last_uid)
        }

        fn calculate_highest_modseq(&self, _mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
            Ok(self.highest_modseq)
        }
    }

    fn mailbox(id: u64) -> Mailbox<u64> {
        let mut mailbox = Mailbox::new(MailboxPath::inbox("alice"), 1);
        mailbox.id = Some(id);
        mailbox
    }

    #[test]
    fn test_uids_strictly_increase() {
        let registry = SequenceRegistry::new();
        let source = FixedSource {
            last_uid: 0,
            highest_modseq: 0,
        };
        let mailbox = mailbox(1);
        let mut previous = 0;
        for _ in 0..100 {
            let uid = registry.next_uid(&mailbox, &source).unwrap();
            assert!(uid > previous);
            previous = uid;
        }
        assert_eq!(registry.current_uid(&mailbox, &source).unwrap(), 100);
    }

    #[test]
    fn test_seeds_from_backend_first() {
        let registry = SequenceRegistry::new();
        let source = FixedSource {
            last_uid: 41,
            highest_modseq: 7,
        };
        let mailbox = mailbox(2);
        assert_eq!(registry.next_uid(&mailbox, &source).unwrap(), 42);
        assert_eq!(registry.next_modseq(&mailbox, &source).unwrap(), 8);
    }

    #[test]
    fn test_falls_back_to_persisted_hint() {
        let registry = SequenceRegistry::new();
        let source = FixedSource {
            last_uid: 0,
            highest_modseq: 0,
        };
        let mut mailbox = mailbox(3);
        mailbox.last_known_uid = 10;
        mailbox.highest_known_modseq = 20;
        assert_eq!(registry.next_uid(&mailbox, &source).unwrap(), 11);
        assert_eq!(registry.next_modseq(&mailbox, &source).unwrap(), 21);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let registry = Arc::new(SequenceRegistry::new());
        let mailbox = Arc::new(mailbox(4));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let mailbox = Arc::clone(&mailbox);
            handles.push(std::thread::spawn(move || {
                let source = FixedSource {
                    last_uid: 0,
                    highest_modseq: 0,
                };
                let mut seen = Vec::new();
                for _ in 0..250 {
                    seen.push(registry.next_uid(&mailbox, &source).unwrap());
                }
                seen
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 250);
    }

    #[test]
    fn test_evict_forces_reseed() {
        let registry = SequenceRegistry::new();
        let source = FixedSource {
            last_uid: 5,
            highest_modseq: 0,
        };
        let mailbox = mailbox(5);
        assert_eq!(registry.next_uid(&mailbox, &source).unwrap(), 6);
        registry.evict(&5);
        assert_eq!(registry.next_uid(&mailbox, &source).unwrap(), 6);
    }
}
