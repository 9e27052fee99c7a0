// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::sqlite::db_err;
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::Mailbox;
use crate::modules::mapper::MessageMapper;
use crate::modules::message::{
    FetchType, Flag, Flags, MailMessage, MessageHeader, MessageMetaData, MessageRange,
};
use crate::modules::sequence::{SequenceRegistry, SequenceSource};
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::raise_error;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SqliteMessageMapper {
    conn: Connection,
    registry: Arc<SequenceRegistry<i64>>,
    state: TransactionState,
}

impl SqliteMessageMapper {
    pub fn new(conn: Connection, registry: Arc<SequenceRegistry<i64>>) -> Self {
        Self {
            conn,
            registry,
            state: TransactionState::new(),
        }
    }

    fn row_to_message(row: &Row<'_>, fetch_type: FetchType) -> rusqlite::Result<MailMessage<i64>> {
        let flags_json: String = row.get(5)?;
        let flags: Flags = serde_json::from_str(&flags_json).unwrap_or_default();
        let mut message = MailMessage {
            mailbox_id: row.get(0)?,
            uid: row.get::<_, i64>(1)? as u64,
            modseq: row.get::<_, i64>(2)? as u64,
            internal_date: row.get(3)?,
            size: row.get::<_, i64>(4)? as u64,
            flags,
            headers: Vec::new(),
            body: Vec::new(),
        };
        if matches!(fetch_type, FetchType::Headers | FetchType::Full) {
            let headers_json: String = row.get(6)?;
            message.headers = serde_json::from_str::<Vec<MessageHeader>>(&headers_json)
                .unwrap_or_default();
        }
        if fetch_type == FetchType::Full {
            message.body = row.get(7)?;
        }
        Ok(message)
    }

    fn flag_columns(flags: &Flags) -> (i64, i64, i64) {
        (
            flags.contains(&Flag::Seen) as i64,
            flags.contains(&Flag::Recent) as i64,
            flags.contains(&Flag::Deleted) as i64,
        )
    }

    fn flags_json(flags: &Flags) -> MailStoreResult<String> {
        serde_json::to_string(flags)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
    }
}

impl TransactionalMapper for SqliteMessageMapper {
    fn transaction(&self) -> &TransactionState {
        &self.state
    }

    fn begin(&self) -> MailStoreResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(db_err)
    }

    fn commit(&self) -> MailStoreResult<()> {
        self.conn.execute_batch("COMMIT").map_err(db_err)
    }

    fn rollback(&self) -> MailStoreResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(db_err)
    }
}

impl SequenceSource<i64> for SqliteMessageMapper {
    fn calculate_last_uid(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(uid) FROM messages WHERE mailbox_id = ?1",
                params![mailbox_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(max.unwrap_or(0) as u64)
    }

    fn calculate_highest_modseq(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(modseq) FROM messages WHERE mailbox_id = ?1",
                params![mailbox_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(max.unwrap_or(0) as u64)
    }
}

impl MessageMapper<i64> for SqliteMessageMapper {
    fn count_messages(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE mailbox_id = ?1",
                params![mailbox_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn count_unseen(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<u64> {
        let mailbox_id = mailbox.stored_id()?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE mailbox_id = ?1 AND seen = 0",
                params![mailbox_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox<i64>,
        range: MessageRange,
        fetch_type: FetchType,
        max: Option<usize>,
    ) -> MailStoreResult<Vec<MailMessage<i64>>> {
        let mailbox_id = mailbox.stored_id()?;
        let (lo, hi) = range.bounds();
        // Open-ended ranges reach u64::MAX; clamp before the signed cast.
        let hi = hi.min(i64::MAX as u64);
        let limit = max.map(|m| m as i64).unwrap_or(-1);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT mailbox_id, uid, modseq, internal_date, size, flags, headers, body
                 FROM messages
                 WHERE mailbox_id = ?1 AND uid >= ?2 AND uid <= ?3
                 ORDER BY uid
                 LIMIT ?4",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![mailbox_id, lo as i64, hi as i64, limit],
                |row| Self::row_to_message(row, fetch_type),
            )
            .map_err(db_err)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row.map_err(db_err)?);
        }
        Ok(members)
    }

    fn find_recent_uids(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<Vec<u64>> {
        let mailbox_id = mailbox.stored_id()?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT uid FROM messages WHERE mailbox_id = ?1 AND recent = 1 ORDER BY uid",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![mailbox_id], |row| row.get::<_, i64>(0))
            .map_err(db_err)?;
        let mut uids = Vec::new();
        for row in rows {
            uids.push(row.map_err(db_err)? as u64);
        }
        Ok(uids)
    }

    fn find_first_unseen_uid(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<Option<u64>> {
        let mailbox_id = mailbox.stored_id()?;
        let uid: Option<i64> = self
            .conn
            .query_row(
                "SELECT uid FROM messages WHERE mailbox_id = ?1 AND seen = 0 ORDER BY uid LIMIT 1",
                params![mailbox_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(uid.map(|value| value as u64))
    }

    fn save(&self, mailbox: &Mailbox<i64>, message: &MailMessage<i64>) -> MailStoreResult<()> {
        let mailbox_id = mailbox.stored_id()?;
        let (seen, recent, deleted) = Self::flag_columns(&message.flags);
        let flags_json = Self::flags_json(&message.flags)?;
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM messages WHERE mailbox_id = ?1 AND uid = ?2",
                params![mailbox_id, message.uid as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if exists.is_some() {
            // Stored content stays authoritative; only the mutable metadata
            // moves.
            self.conn
                .execute(
                    "UPDATE messages
                     SET modseq = ?3, flags = ?4, seen = ?5, recent = ?6, deleted = ?7
                     WHERE mailbox_id = ?1 AND uid = ?2",
                    params![
                        mailbox_id,
                        message.uid as i64,
                        message.modseq as i64,
                        flags_json,
                        seen,
                        recent,
                        deleted
                    ],
                )
                .map_err(db_err)?;
        } else {
            let headers_json = serde_json::to_string(&message.headers)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            self.conn
                .execute(
                    "INSERT INTO messages
                     (mailbox_id, uid, modseq, internal_date, size, seen, recent, deleted,
                      flags, headers, body)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        mailbox_id,
                        message.uid as i64,
                        message.modseq as i64,
                        message.internal_date,
                        message.size as i64,
                        seen,
                        recent,
                        deleted,
                        flags_json,
                        headers_json,
                        message.body
                    ],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn save_sequences(
        &self,
        mailbox: &Mailbox<i64>,
        last_uid: u64,
        highest_modseq: u64,
    ) -> MailStoreResult<()> {
        let mailbox_id = mailbox.stored_id()?;
        // MAX() keeps the persisted counters from regressing under races.
        self.conn
            .execute(
                "UPDATE mailboxes
                 SET last_uid = MAX(last_uid, ?2), highest_modseq = MAX(highest_modseq, ?3)
                 WHERE id = ?1",
                params![mailbox_id, last_uid as i64, highest_modseq as i64],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn copy_message(
        &self,
        mailbox: &Mailbox<i64>,
        uid: u64,
        modseq: u64,
        original: &MailMessage<i64>,
    ) -> MailStoreResult<MailMessage<i64>> {
        let mailbox_id = mailbox.stored_id()?;
        let mut duplicate = original.clone();
        duplicate.mailbox_id = mailbox_id;
        duplicate.uid = uid;
        duplicate.modseq = modseq;
        duplicate.flags.insert(Flag::Recent);
        self.save(mailbox, &duplicate)?;
        Ok(duplicate)
    }

    fn expunge(
        &self,
        mailbox: &Mailbox<i64>,
        range: MessageRange,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>> {
        let mailbox_id = mailbox.stored_id()?;
        let (lo, hi) = range.bounds();
        let hi = hi.min(i64::MAX as u64);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT uid, modseq, internal_date, size, flags
                 FROM messages
                 WHERE mailbox_id = ?1 AND deleted = 1 AND uid >= ?2 AND uid <= ?3
                 ORDER BY uid",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![mailbox_id, lo as i64, hi as i64], |row| {
                let flags_json: String = row.get(4)?;
                Ok(MessageMetaData {
                    uid: row.get::<_, i64>(0)? as u64,
                    modseq: row.get::<_, i64>(1)? as u64,
                    internal_date: row.get(2)?,
                    size: row.get::<_, i64>(3)? as u64,
                    flags: serde_json::from_str(&flags_json).unwrap_or_default(),
                })
            })
            .map_err(db_err)?;
        let mut data = BTreeMap::new();
        for row in rows {
            let metadata = row.map_err(db_err)?;
            data.insert(metadata.uid, metadata);
        }
        drop(stmt);
        for uid in data.keys() {
            self.conn
                .execute(
                    "DELETE FROM messages WHERE mailbox_id = ?1 AND uid = ?2",
                    params![mailbox_id, *uid as i64],
                )
                .map_err(db_err)?;
        }
        Ok(data)
    }

    fn sequences(&self) -> &SequenceRegistry<i64> {
        &self.registry
    }
}
