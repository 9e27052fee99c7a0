// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::nativedb::{
    path_key, FrameTransaction, MailboxEntity, MailboxEntityKey, MessageEntity, MessageEntityKey,
    SubscriptionEntity, SubscriptionEntityKey,
};
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::{Mailbox, MailboxPath};
use crate::modules::mapper::mailbox::{compile_pattern, MailboxMapper};
use crate::modules::mapper::SubscriptionMapper;
use crate::modules::message::Subscription;
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::modules::utils::mailbox_key;
use crate::raise_error;
use itertools::Itertools;
use native_db::transaction::RTransaction;
use native_db::Database;
use std::sync::Arc;

pub struct NativeDbMailboxMapper {
    frame: FrameTransaction,
    state: TransactionState,
}

impl NativeDbMailboxMapper {
    pub fn new(db: Arc<Database<'static>>) -> Self {
        Self {
            frame: FrameTransaction::new(db),
            state: TransactionState::new(),
        }
    }

    fn entity_by_path(
        tx: &RTransaction,
        path: &MailboxPath,
    ) -> MailStoreResult<Option<MailboxEntity>> {
        tx.get()
            .secondary(MailboxEntityKey::path_key, path_key(path))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))
    }

    fn all_entities(tx: &RTransaction) -> MailStoreResult<Vec<MailboxEntity>> {
        let entities: Vec<MailboxEntity> = tx
            .scan()
            .primary()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            .all()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            .try_collect()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(entities)
    }
}

impl TransactionalMapper for NativeDbMailboxMapper {
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

impl MailboxMapper<u64> for NativeDbMailboxMapper {
    fn find_by_path(&self, path: &MailboxPath) -> MailStoreResult<Option<Mailbox<u64>>> {
        self.frame.read(|tx| {
            Ok(Self::entity_by_path(tx, path)?.map(MailboxEntity::into_mailbox))
        })
    }

    fn find_with_path_like(
        &self,
        pattern: &MailboxPath,
        delimiter: char,
    ) -> MailStoreResult<Vec<Mailbox<u64>>> {
        let regex = compile_pattern(&pattern.name, delimiter)?;
        self.frame.read(|tx| {
            Ok(Self::all_entities(tx)?
                .into_iter()
                .filter(|entity| {
                    entity.namespace == pattern.namespace
                        && entity.user == pattern.user
                        && regex.is_match(&entity.name)
                })
                .map(MailboxEntity::into_mailbox)
                .collect())
        })
    }

    fn has_children(&self, mailbox: &Mailbox<u64>, delimiter: char) -> MailStoreResult<bool> {
        let prefix = format!("{}{}", mailbox.path.name, delimiter);
        self.frame.read(|tx| {
            Ok(Self::all_entities(tx)?.iter().any(|entity| {
                entity.namespace == mailbox.path.namespace
                    && entity.user == mailbox.path.user
                    && entity.name.starts_with(&prefix)
            }))
        })
    }

    fn save(&self, mailbox: &mut Mailbox<u64>) -> MailStoreResult<()> {
        let collision = self
            .frame
            .read(|tx| Self::entity_by_path(tx, &mailbox.path))?;
        match mailbox.id {
            Some(id) => {
                if let Some(existing) = &collision {
                    if existing.id != id {
                        return Err(raise_error!(
                            format!("mailbox {} already exists", mailbox.path),
                            ErrorCode::MailboxExists
                        ));
                    }
                }
                let stored = self
                    .frame
                    .read(|tx| {
                        tx.get()
                            .primary::<MailboxEntity>(id)
                            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))
                    })?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("mailbox {} vanished from the store", mailbox.path),
                            ErrorCode::MailboxNotFound
                        )
                    })?;
                // Renames keep the stored uid-validity and counters.
                let mut updated = MailboxEntity::from_mailbox(id, mailbox);
                updated.uid_validity = stored.uid_validity;
                updated.last_uid = stored.last_uid;
                updated.highest_modseq = stored.highest_modseq;
                mailbox.uid_validity = stored.uid_validity;
                self.frame.queue_write(move |tx| {
                    tx.update(stored, updated)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                    Ok(())
                })?;
            }
            None => {
                if collision.is_some() {
                    return Err(raise_error!(
                        format!("mailbox {} already exists", mailbox.path),
                        ErrorCode::MailboxExists
                    ));
                }
                let id = mailbox_key(&mailbox.path);
                let entity = MailboxEntity::from_mailbox(id, mailbox);
                self.frame.queue_write(move |tx| {
                    tx.insert(entity)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                    Ok(())
                })?;
                mailbox.id = Some(id);
            }
        }
        Ok(())
    }

    fn delete(&self, mailbox: &Mailbox<u64>) -> MailStoreResult<()> {
        let id = mailbox.stored_id()?;
        self.frame.queue_write(move |tx| {
            let messages: Vec<MessageEntity> = tx
                .scan()
                .secondary::<MessageEntity>(MessageEntityKey::mailbox_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .start_with(id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .try_collect()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            for message in messages {
                tx.remove(message)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            }
            if let Some(entity) = tx
                .get()
                .primary::<MailboxEntity>(id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
            {
                tx.remove(entity)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            }
            Ok(())
        })
    }

    fn list(&self) -> MailStoreResult<Vec<Mailbox<u64>>> {
        self.frame.read(|tx| {
            Ok(Self::all_entities(tx)?
                .into_iter()
                .map(MailboxEntity::into_mailbox)
                .collect())
        })
    }
}

pub struct NativeDbSubscriptionMapper {
    frame: FrameTransaction,
    state: TransactionState,
}

impl NativeDbSubscriptionMapper {
    pub fn new(db: Arc<Database<'static>>) -> Self {
        Self {
            frame: FrameTransaction::new(db),
            state: TransactionState::new(),
        }
    }
}

impl TransactionalMapper for NativeDbSubscriptionMapper {
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

impl SubscriptionMapper for NativeDbSubscriptionMapper {
    fn save(&self, subscription: &Subscription) -> MailStoreResult<()> {
        let entity = SubscriptionEntity {
            user: subscription.user.clone(),
            mailbox: subscription.mailbox.clone(),
        };
        self.frame.queue_write(move |tx| {
            tx.upsert(entity)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            Ok(())
        })
    }

    fn delete(&self, subscription: &Subscription) -> MailStoreResult<()> {
        let entity = SubscriptionEntity {
            user: subscription.user.clone(),
            mailbox: subscription.mailbox.clone(),
        };
        self.frame.queue_write(move |tx| {
            if tx
                .get()
                .primary::<SubscriptionEntity>(entity.pk())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .is_some()
            {
                tx.remove(entity)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            }
            Ok(())
        })
    }

    fn find_subscriptions_for_user(&self, user: &str) -> MailStoreResult<Vec<Subscription>> {
        let user = user.to_string();
        self.frame.read(|tx| {
            let entities: Vec<SubscriptionEntity> = tx
                .scan()
                .secondary::<SubscriptionEntity>(SubscriptionEntityKey::user)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .start_with(user.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?
                .try_collect()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            Ok(entities
                .into_iter()
                .filter(|entity| entity.user == user)
                .map(SubscriptionEntity::into_subscription)
                .collect())
        })
    }
}
