// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

//! Document-store backend over `native_db`/`redb`. Mailbox ids are stable
//! murmur3 hashes of the path; messages are keyed by a zero-padded
//! `"{mailbox_id}_{uid}"` string so primary order walks uids ascending.

use crate::modules::backends::nativedb::mailbox::{
    NativeDbMailboxMapper, NativeDbSubscriptionMapper,
};
use crate::modules::backends::nativedb::message::NativeDbMessageMapper;
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::{Mailbox, MailboxAcl, MailboxPath};
use crate::modules::mapper::SessionMapperFactory;
use crate::modules::message::{Flags, MailMessage, MessageHeader, MessageMetaData, Subscription};
use crate::modules::sequence::SequenceRegistry;
use crate::modules::session::MailboxSession;
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;
use native_db::transaction::{RTransaction, RwTransaction};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, LazyLock};

pub mod mailbox;
pub mod message;

pub static STORE_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models
        .define::<MailboxEntity>()
        .expect("failed to define mailbox model");
    models
        .define::<MessageEntity>()
        .expect("failed to define message model");
    models
        .define::<SubscriptionEntity>()
        .expect("failed to define subscription model");
    models
});

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 1, version = 1)]
#[native_db(secondary_key(path_key -> String, unique))]
pub struct MailboxEntity {
    /// Stable path-hash id, preserved across renames.
    #[primary_key]
    pub id: u64,
    pub namespace: String,
    pub user: String,
    pub name: String,
    pub uid_validity: u64,
    pub last_uid: u64,
    pub highest_modseq: u64,
    pub acl: String,
}

impl MailboxEntity {
    pub fn path_key(&self) -> String {
        path_key(&MailboxPath::new(&self.namespace, &self.user, &self.name))
    }

    pub fn from_mailbox(id: u64, mailbox: &Mailbox<u64>) -> Self {
        Self {
            id,
            namespace: mailbox.path.namespace.clone(),
            user: mailbox.path.user.clone(),
            name: mailbox.path.name.clone(),
            uid_validity: mailbox.uid_validity,
            last_uid: mailbox.last_known_uid,
            highest_modseq: mailbox.highest_known_modseq,
            acl: mailbox.acl.rights.clone(),
        }
    }

    pub fn into_mailbox(self) -> Mailbox<u64> {
        Mailbox {
            id: Some(self.id),
            path: MailboxPath::new(&self.namespace, &self.user, &self.name),
            uid_validity: self.uid_validity,
            last_known_uid: self.last_uid,
            highest_known_modseq: self.highest_modseq,
            acl: MailboxAcl { rights: self.acl },
        }
    }
}

pub fn path_key(path: &MailboxPath) -> String {
    format!("{}\u{1f}{}\u{1f}{}", path.namespace, path.user, path.name)
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 2, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct MessageEntity {
    #[secondary_key]
    pub mailbox_id: u64,
    pub uid: u64,
    pub modseq: u64,
    pub internal_date: i64,
    pub size: u64,
    pub flags: Flags,
    pub headers: Vec<MessageHeader>,
    pub body: Vec<u8>,
}

impl MessageEntity {
    pub fn pk(&self) -> String {
        Self::key(self.mailbox_id, self.uid)
    }

    /// Zero-padded so lexicographic key order equals (mailbox, uid) order.
    pub fn key(mailbox_id: u64, uid: u64) -> String {
        format!("{:020}_{:020}", mailbox_id, uid)
    }

    pub fn from_message(message: &MailMessage<u64>) -> Self {
        Self {
            mailbox_id: message.mailbox_id,
            uid: message.uid,
            modseq: message.modseq,
            internal_date: message.internal_date,
            size: message.size,
            flags: message.flags.clone(),
            headers: message.headers.clone(),
            body: message.body.clone(),
        }
    }

    pub fn into_message(self) -> MailMessage<u64> {
        MailMessage {
            mailbox_id: self.mailbox_id,
            uid: self.uid,
            modseq: self.modseq,
            internal_date: self.internal_date,
            size: self.size,
            flags: self.flags,
            headers: self.headers,
            body: self.body,
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
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 3, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct SubscriptionEntity {
    #[secondary_key]
    pub user: String,
    pub mailbox: String,
}

impl SubscriptionEntity {
    pub fn pk(&self) -> String {
        format!("{}\u{1f}{}", self.user, self.mailbox)
    }

    pub fn into_subscription(self) -> Subscription {
        Subscription {
            user: self.user,
            mailbox: self.mailbox,
        }
    }
}

/// One opened document store. The database borrows the process-wide
/// `STORE_MODELS` registry and is shared with the per-session mappers
/// through an `Arc`.
pub struct NativeDbStore {
    db: Arc<Database<'static>>,
    registry: Arc<SequenceRegistry<u64>>,
    delimiter: char,
}

impl NativeDbStore {
    pub fn open(path: impl AsRef<Path>, delimiter: char) -> MailStoreResult<Self> {
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .mailstore_db_cache_size
                    .unwrap_or(134217728)
                    .max(67108864),
            )
            .create(&STORE_MODELS, path.as_ref())
            .map_err(handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(Self::from_database(database, delimiter))
    }

    pub fn in_memory(delimiter: char) -> MailStoreResult<Self> {
        let database = Builder::new()
            .create_in_memory(&STORE_MODELS)
            .map_err(handle_database_error)?;
        Ok(Self::from_database(database, delimiter))
    }

    fn from_database(database: Database<'static>, delimiter: char) -> Self {
        Self {
            db: Arc::new(database),
            registry: Arc::new(SequenceRegistry::new()),
            delimiter,
        }
    }

    pub fn registry(&self) -> Arc<SequenceRegistry<u64>> {
        self.registry.clone()
    }
}

impl SessionMapperFactory for NativeDbStore {
    type Id = u64;
    type MessageMapper = NativeDbMessageMapper;
    type MailboxMapper = NativeDbMailboxMapper;
    type SubscriptionMapper = NativeDbSubscriptionMapper;

    fn create_message_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MessageMapper> {
        session.ensure_open()?;
        Ok(NativeDbMessageMapper::new(
            self.db.clone(),
            self.registry.clone(),
        ))
    }

    fn create_mailbox_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MailboxMapper> {
        session.ensure_open()?;
        Ok(NativeDbMailboxMapper::new(self.db.clone()))
    }

    fn create_subscription_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::SubscriptionMapper> {
        session.ensure_open()?;
        Ok(NativeDbSubscriptionMapper::new(self.db.clone()))
    }

    fn delimiter(&self) -> char {
        self.delimiter
    }
}

fn handle_database_error(error: native_db::db_type::Error) -> crate::modules::error::MailStoreError {
    match error {
        native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                raise_error!(
                    "database is already open by another instance".into(),
                    ErrorCode::StorageError
                )
            }
            other => {
                raise_error!(
                    format!("database error: {:?}", other),
                    ErrorCode::StorageError
                )
            }
        },
        other => {
            raise_error!(
                format!("failed to create database: {:?}", other),
                ErrorCode::StorageError
            )
        }
    }
}

type WriteOp = Box<dyn FnOnce(&RwTransaction) -> MailStoreResult<()>>;

/// Frame state shared by the backend's mappers. Writes queued while a frame
/// is open are applied in a single write transaction at commit; rollback
/// discards the queue. Outside a frame every write runs in its own
/// transaction. Reads always run on a read transaction and observe the
/// committed state.
pub(crate) struct FrameTransaction {
    db: Arc<Database<'static>>,
    pending: RefCell<Option<Vec<WriteOp>>>,
}

impl FrameTransaction {
    pub fn new(db: Arc<Database<'static>>) -> Self {
        Self {
            db,
            pending: RefCell::new(None),
        }
    }

    pub fn begin(&self) -> MailStoreResult<()> {
        let mut slot = self.pending.borrow_mut();
        if slot.is_none() {
            *slot = Some(Vec::new());
        }
        Ok(())
    }

    pub fn commit(&self) -> MailStoreResult<()> {
        if let Some(ops) = self.pending.borrow_mut().take() {
            if ops.is_empty() {
                return Ok(());
            }
            let tx = self
                .db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            for op in ops {
                op(&tx)?;
            }
            tx.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> MailStoreResult<()> {
        self.pending.borrow_mut().take();
        Ok(())
    }

    pub fn queue_write(
        &self,
        op: impl FnOnce(&RwTransaction) -> MailStoreResult<()> + 'static,
    ) -> MailStoreResult<()> {
        let mut slot = self.pending.borrow_mut();
        match slot.as_mut() {
            Some(ops) => {
                ops.push(Box::new(op));
                Ok(())
            }
            None => {
                drop(slot);
                let tx = self
                    .db
                    .rw_transaction()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                op(&tx)?;
                tx.commit()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                Ok(())
            }
        }
    }

    pub fn read<T>(
        &self,
        work: impl FnOnce(&RTransaction) -> MailStoreResult<T>,
    ) -> MailStoreResult<T> {
        let tx = self
            .db
            .r_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        work(&tx)
    }
}
