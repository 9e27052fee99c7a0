// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::nativedb::{
    FrameTransaction, MailboxEntity, MessageEntity, MessageEntityKey,
};
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::index::MessageSearchIndex;
use crate::modules::mailbox::Mailbox;
use crate::modules::mapper::MessageMapper;
use crate::modules::message::{
    FetchType, Flag, MailMessage, MessageMetaData, MessageRange,
};
use crate::modules::sequence::{SequenceRegistry, SequenceSource};
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::raise_error;
use itertools::Itertools;
use native_db::transaction::RTransaction;
use native_db::Database;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct NativeDbMessageMapper {
    frame: FrameTransaction,
    state: TransactionState,
    registry: Arc<SequenceRegistry<u64>>,
    index: Option<Arc<dyn MessageSearchIndex<u64>>>,
}

impl NativeDbMessageMapper {
    pub fn new(db: Arc<Database<'static>>, registry: Arc<SequenceRegistry<u64>>) -> Self {
        Self {
            frame: FrameTransaction::new(db),
            state: TransactionState::new(),
            registry,
            index: None,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn MessageSearchIndex<u64>>) -> Self {
        self.index = Some(index);
        self
    }

    fn scan_mailbox(tx: &RTransaction, mailbox_id: u64) -> MailStoreResult<Vec<MessageEntity>> {
        let entities: Vec<MessageEntity> = tx
            .scan()
            .secondary::<MessageEntity>(MessageEntityKey::mailbox_id)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            .start_with(mailbox_id)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            .try_collect()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(entities)
    }
}

impl TransactionalMapper for NativeDbMessageMapper {
    fn transaction(&self) -> &TransactionState {
        &self.state
    }

    fn begin(&self) -> MailStoreResult<()> {
        self.frame.begin()
    }

    fn commit(&self) -> MailStoreResult<()> {
        self.frame.commit()
    }

    fn rollback(&self) -> MailStoreResult<()> {
        self.frame.rollback()
    }
}

impl SequenceSource<u64> for NativeDbMessageMapper {
    fn calculate_last_uid(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .last()
                .map(|entity| entity.uid)
                .unwrap_or(0))
        })
    }

    fn calculate_highest_modseq(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .iter()
                .map(|entity| entity.modseq)
                .max()
                .unwrap_or(0))
        })
    }
}

impl MessageMapper<u64> for NativeDbMessageMapper {
    fn count_messages(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame
            .read(|tx| Ok(Self::scan_mailbox(tx, mailbox_id)?.len() as u64))
    }

    fn count_unseen(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .iter()
                .filter(|entity| !entity.flags.contains(&Flag::Seen))
                .count() as u64)
        })
    }

    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox<u64>,
        range: MessageRange,
        _fetch_type: FetchType,
        max: Option<usize>,
    ) -> MailStoreResult<Vec<MailMessage<u64>>> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            let mut members: Vec<MailMessage<u64>> = Self::scan_mailbox(tx, mailbox_id)?
                .into_iter()
                .filter(|entity| range.contains(entity.uid))
                .map(MessageEntity::into_message)
                .collect();
            if let Some(max) = max {
                members.truncate(max);
            }
            Ok(members)
        })
    }

    fn find_recent_uids(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<Vec<u64>> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .iter()
                .filter(|entity| entity.flags.contains(&Flag::Recent))
                .map(|entity| entity.uid)
                .collect())
        })
    }

    fn find_first_unseen_uid(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<Option<u64>> {
        let mailbox_id = mailbox.stored_id()?;
        self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .iter()
                .find(|entity| !entity.flags.contains(&Flag::Seen))
                .map(|entity| entity.uid))
        })
    }

    fn save(&self, mailbox: &Mailbox<u64>, message: &MailMessage<u64>) -> MailStoreResult<()> {
        let mailbox_id = mailbox.stored_id()?;
        let entity = MessageEntity::from_message(message);
        self.frame.queue_write(move |tx| {
            let key = MessageEntity::key(mailbox_id, entity.uid);
            match tx
                .get()
                .primary::<MessageEntity>(key)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            {
                Some(existing) => {
                    // Stored content stays authoritative; only the mutable
                    // metadata moves.
                    let mut updated = existing.clone();
                    updated.flags = entity.flags.clone();
                    updated.modseq = entity.modseq;
                    tx.update(existing, updated)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                }
                None => {
                    tx.insert(entity)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                }
            }
            Ok(())
        })
    }

    fn save_sequences(
        &self,
        mailbox: &Mailbox<u64>,
        last_uid: u64,
        highest_modseq: u64,
    ) -> MailStoreResult<()> {
        let mailbox_id = mailbox.stored_id()?;
        let path = mailbox.path.clone();
        self.frame.queue_write(move |tx| {
            let existing = tx
                .get()
                .primary::<MailboxEntity>(mailbox_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("mailbox {} vanished from the store", path),
                        ErrorCode::MailboxNotFound
                    )
                })?;
            let mut updated = existing.clone();
            // Persisted counters never regress, even when writers race.
            updated.last_uid = existing.last_uid.max(last_uid);
            updated.highest_modseq = existing.highest_modseq.max(highest_modseq);
            tx.update(existing, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            Ok(())
        })
    }

    fn copy_message(
        &self,
        mailbox: &Mailbox<u64>,
        uid: u64,
        modseq: u64,
        original: &MailMessage<u64>,
    ) -> MailStoreResult<MailMessage<u64>> {
        let mailbox_id = mailbox.stored_id()?;
        let mut duplicate = original.clone();
        duplicate.mailbox_id = mailbox_id;
        duplicate.uid = uid;
        duplicate.modseq = modseq;
        duplicate.flags.insert(Flag::Recent);
        let entity = MessageEntity::from_message(&duplicate);
        self.frame.queue_write(move |tx| {
            tx.insert(entity)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            Ok(())
        })?;
        Ok(duplicate)
    }

    fn expunge(
        &self,
        mailbox: &Mailbox<u64>,
        range: MessageRange,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>> {
        let mailbox_id = mailbox.stored_id()?;
        let targets: Vec<MessageEntity> = self.frame.read(|tx| {
            Ok(Self::scan_mailbox(tx, mailbox_id)?
                .into_iter()
                .filter(|entity| {
                    entity.flags.contains(&Flag::Deleted) && range.contains(entity.uid)
                })
                .collect())
        })?;
        let mut data = BTreeMap::new();
        for entity in &targets {
            data.insert(entity.uid, entity.metadata());
        }
        if !targets.is_empty() {
            self.frame.queue_write(move |tx| {
                for entity in targets {
                    tx.remove(entity)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                }
                Ok(())
            })?;
        }
        Ok(data)
    }

    fn sequences(&self) -> &SequenceRegistry<u64> {
        &self.registry
    }

    fn search_index(&self) -> Option<&dyn MessageSearchIndex<u64>> {
        self.index.as_deref()
    }
}
