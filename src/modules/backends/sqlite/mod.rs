// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

//! Relational backend over `rusqlite`. Mailbox ids are rowids; the
//! `messages` table keys on (mailbox_id, uid) and denormalizes the
//! seen/recent/deleted bits so the count and find queries stay indexed.

use crate::modules::backends::sqlite::mailbox::{SqliteMailboxMapper, SqliteSubscriptionMapper};
use crate::modules::backends::sqlite::message::SqliteMessageMapper;
use crate::modules::error::{code::ErrorCode, MailStoreError, MailStoreResult};
use crate::modules::mapper::SessionMapperFactory;
use crate::modules::sequence::SequenceRegistry;
use crate::modules::session::MailboxSession;
use crate::raise_error;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;

pub mod mailbox;
pub mod message;
#[cfg(test)]
mod tests;

/// Schema DDL run on open. Idempotent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mailboxes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    user TEXT NOT NULL,
    name TEXT NOT NULL,
    uid_validity INTEGER NOT NULL,
    last_uid INTEGER NOT NULL DEFAULT 0,
    highest_modseq INTEGER NOT NULL DEFAULT 0,
    acl TEXT NOT NULL DEFAULT '',
    UNIQUE(namespace, user, name)
);

CREATE TABLE IF NOT EXISTS messages (
    mailbox_id INTEGER NOT NULL,
    uid INTEGER NOT NULL,
    modseq INTEGER NOT NULL,
    internal_date INTEGER NOT NULL,
    size INTEGER NOT NULL,
    seen INTEGER NOT NULL DEFAULT 0,
    recent INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    flags TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    PRIMARY KEY (mailbox_id, uid)
);

CREATE INDEX IF NOT EXISTS idx_messages_unseen
    ON messages(mailbox_id, seen, uid);

CREATE TABLE IF NOT EXISTS subscriptions (
    user TEXT NOT NULL,
    mailbox TEXT NOT NULL,
    PRIMARY KEY (user, mailbox)
);
";

pub(crate) fn db_err(error: rusqlite::Error) -> MailStoreError {
    raise_error!(format!("{:#?}", error), ErrorCode::StorageError)
}

pub struct SqliteStore {
    path: PathBuf,
    delimiter: char,
    registry: Arc<SequenceRegistry<i64>>,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>, delimiter: char) -> MailStoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        }
        let conn = Connection::open(&path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            path,
            delimiter,
            registry: Arc::new(SequenceRegistry::new()),
        })
    }

    pub fn registry(&self) -> Arc<SequenceRegistry<i64>> {
        self.registry.clone()
    }

    /// Connections are per-session and never shared across threads.
    fn connect(&self) -> MailStoreResult<Connection> {
        let conn = Connection::open(&self.path).map_err(db_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        Ok(conn)
    }
}

impl SessionMapperFactory for SqliteStore {
    type Id = i64;
    type MessageMapper = SqliteMessageMapper;
    type MailboxMapper = SqliteMailboxMapper;
    type SubscriptionMapper = SqliteSubscriptionMapper;

    fn create_message_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MessageMapper> {
        session.ensure_open()?;
        Ok(SqliteMessageMapper::new(
            self.connect()?,
            self.registry.clone(),
        ))
    }

    fn create_mailbox_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MailboxMapper> {
        session.ensure_open()?;
        Ok(SqliteMailboxMapper::new(self.connect()?))
    }

    fn create_subscription_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::SubscriptionMapper> {
        session.ensure_open()?;
        Ok(SqliteSubscriptionMapper::new(self.connect()?))
    }

    fn delimiter(&self) -> char {
        self.delimiter
    }
}
