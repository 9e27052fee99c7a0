// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::sqlite::db_err;
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::{Mailbox, MailboxAcl, MailboxPath};
use crate::modules::mapper::mailbox::{compile_pattern, MailboxMapper};
use crate::modules::mapper::SubscriptionMapper;
use crate::modules::message::Subscription;
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::raise_error;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub struct SqliteMailboxMapper {
    conn: Connection,
    state: TransactionState,
}

impl SqliteMailboxMapper {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            state: TransactionState::new(),
        }
    }

    fn row_to_mailbox(row: &Row<'_>) -> rusqlite::Result<Mailbox<i64>> {
        Ok(Mailbox {
            id: Some(row.get(0)?),
            path: MailboxPath::new(
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
                &row.get::<_, String>(3)?,
            ),
            uid_validity: row.get::<_, i64>(4)? as u64,
            last_known_uid: row.get::<_, i64>(5)? as u64,
            highest_known_modseq: row.get::<_, i64>(6)? as u64,
            acl: MailboxAcl {
                rights: row.get(7)?,
            },
        })
    }

    fn id_by_path(&self, path: &MailboxPath) -> MailStoreResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM mailboxes WHERE namespace = ?1 AND user = ?2 AND name = ?3",
                params![path.namespace, path.user, path.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }
}

impl TransactionalMapper for SqliteMailboxMapper {
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

impl MailboxMapper<i64> for SqliteMailboxMapper {
    fn find_by_path(&self, path: &MailboxPath) -> MailStoreResult<Option<Mailbox<i64>>> {
        self.conn
            .query_row(
                "SELECT id, namespace, user, name, uid_validity, last_uid, highest_modseq, acl
                 FROM mailboxes WHERE namespace = ?1 AND user = ?2 AND name = ?3",
                params![path.namespace, path.user, path.name],
                Self::row_to_mailbox,
            )
            .optional()
            .map_err(db_err)
    }

    fn find_with_path_like(
        &self,
        pattern: &MailboxPath,
        delimiter: char,
    ) -> MailStoreResult<Vec<Mailbox<i64>>> {
        let regex = compile_pattern(&pattern.name, delimiter)?;
        Ok(self
            .list()?
            .into_iter()
            .filter(|mailbox| {
                mailbox.path.namespace == pattern.namespace
                    && mailbox.path.user == pattern.user
                    && regex.is_match(&mailbox.path.name)
            })
            .collect())
    }

    fn has_children(&self, mailbox: &Mailbox<i64>, delimiter: char) -> MailStoreResult<bool> {
        let prefix = format!("{}{}%", mailbox.path.name, delimiter);
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM mailboxes
                 WHERE namespace = ?1 AND user = ?2 AND name LIKE ?3",
                params![mailbox.path.namespace, mailbox.path.user, prefix],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn save(&self, mailbox: &mut Mailbox<i64>) -> MailStoreResult<()> {
        let collision = self.id_by_path(&mailbox.path)?;
        match mailbox.id {
            Some(id) => {
                if let Some(existing) = collision {
                    if existing != id {
                        return Err(raise_error!(
                            format!("mailbox {} already exists", mailbox.path),
                            ErrorCode::MailboxExists
                        ));
                    }
                }
                // Renames update the path columns only; uid_validity and
                // the persisted counters stay untouched.
                self.conn
                    .execute(
                        "UPDATE mailboxes SET namespace = ?2, user = ?3, name = ?4, acl = ?5
                         WHERE id = ?1",
                        params![
                            id,
                            mailbox.path.namespace,
                            mailbox.path.user,
                            mailbox.path.name,
                            mailbox.acl.rights
                        ],
                    )
                    .map_err(db_err)?;
            }
            None => {
                if collision.is_some() {
                    return Err(raise_error!(
                        format!("mailbox {} already exists", mailbox.path),
                        ErrorCode::MailboxExists
                    ));
                }
                self.conn
                    .execute(
                        "INSERT INTO mailboxes
                         (namespace, user, name, uid_validity, last_uid, highest_modseq, acl)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            mailbox.path.namespace,
                            mailbox.path.user,
                            mailbox.path.name,
                            mailbox.uid_validity as i64,
                            mailbox.last_known_uid as i64,
                            mailbox.highest_known_modseq as i64,
                            mailbox.acl.rights
                        ],
                    )
                    .map_err(db_err)?;
                mailbox.id = Some(self.conn.last_insert_rowid());
            }
        }
        Ok(())
    }

    fn delete(&self, mailbox: &Mailbox<i64>) -> MailStoreResult<()> {
        let id = mailbox.stored_id()?;
        self.conn
            .execute("DELETE FROM messages WHERE mailbox_id = ?1", params![id])
            .map_err(db_err)?;
        self.conn
            .execute("DELETE FROM mailboxes WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    fn list(&self) -> MailStoreResult<Vec<Mailbox<i64>>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, namespace, user, name, uid_validity, last_uid, highest_modseq, acl
                 FROM mailboxes ORDER BY namespace, user, name",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_mailbox).map_err(db_err)?;
        let mut mailboxes = Vec::new();
        for row in rows {
            mailboxes.push(row.map_err(db_err)?);
        }
        Ok(mailboxes)
    }
}

pub struct SqliteSubscriptionMapper {
    conn: Connection,
    state: TransactionState,
}

impl SqliteSubscriptionMapper {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            state: TransactionState::new(),
        }
    }
}

impl TransactionalMapper for SqliteSubscriptionMapper {
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

impl SubscriptionMapper for SqliteSubscriptionMapper {
    fn save(&self, subscription: &Subscription) -> MailStoreResult<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO subscriptions (user, mailbox) VALUES (?1, ?2)",
                params![subscription.user, subscription.mailbox],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, subscription: &Subscription) -> MailStoreResult<()> {
        self.conn
            .execute(
                "DELETE FROM subscriptions WHERE user = ?1 AND mailbox = ?2",
                params![subscription.user, subscription.mailbox],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn find_subscriptions_for_user(&self, user: &str) -> MailStoreResult<Vec<Subscription>> {
        let mut stmt = self
            .conn
            .prepare("SELECT mailbox FROM subscriptions WHERE user = ?1 ORDER BY mailbox")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(Subscription {
                user: user.to_string(),
                mailbox: row.map_err(db_err)?,
            });
        }
        Ok(subscriptions)
    }
}
