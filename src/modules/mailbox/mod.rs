// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Reserved per-user root mailbox name.
pub const INBOX: &str = "INBOX";

/// Default namespace for user-owned mailboxes.
pub const USER_NAMESPACE: &str = "#private";

/// Bound for backend-native mailbox identifiers. The document backend uses
/// `u64`, the relational backend `i64` rowids, the maildir backend the
/// relative folder key as a `String`.
pub trait MailboxId:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> MailboxId for T where
    T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Identifies a mailbox inside a user's namespace. The hierarchy delimiter
/// is carried by the manager, not the path; `name` is an opaque value to
/// this crate.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MailboxPath {
    pub namespace: String,
    pub user: String,
    pub name: String,
}

impl MailboxPath {
    pub fn new(namespace: &str, user: &str, name: &str) -> Self {
        Self {
            namespace: namespace.into(),
            user: user.into(),
            name: name.into(),
        }
    }

    pub fn for_user(user: &str, name: &str) -> Self {
        Self::new(USER_NAMESPACE, user, name)
    }

    pub fn inbox(user: &str) -> Self {
        Self::for_user(user, INBOX)
    }

    pub fn is_inbox(&self) -> bool {
        self.name == INBOX
    }

    /// Path of a child mailbox one hierarchy level below this one.
    pub fn child(&self, name: &str, delimiter: char) -> Self {
        Self::new(
            &self.namespace,
            &self.user,
            &format!("{}{}{}", self.name, delimiter, name),
        )
    }
}

impl fmt::Display for MailboxPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.user, self.name)
    }
}

/// Opaque rights value consumed by the external ACL oracle. The engine
/// stores and round-trips it without interpreting individual rights.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MailboxAcl {
    pub rights: String,
}

impl MailboxAcl {
    pub fn full() -> Self {
        Self {
            rights: "aeiklprstwx".into(),
        }
    }
}

/// A mailbox value as seen by the mappers. `id` is assigned by the backend
/// on first save. `last_known_uid` and `highest_known_modseq` are persisted
/// hints used to seed the sequence registry when the backend cannot cheaply
/// compute the high-water marks itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mailbox<Id: MailboxId> {
    pub id: Option<Id>,
    pub path: MailboxPath,
    pub uid_validity: u64,
    pub last_known_uid: u64,
    pub highest_known_modseq: u64,
    pub acl: MailboxAcl,
}

impl<Id: MailboxId> Mailbox<Id> {
    pub fn new(path: MailboxPath, uid_validity: u64) -> Self {
        Self {
            id: None,
            path,
            uid_validity,
            last_known_uid: 0,
            highest_known_modseq: 0,
            acl: MailboxAcl::full(),
        }
    }

    /// Backend-native id. Only valid after the mailbox was saved.
    pub fn stored_id(&self) -> crate::modules::error::MailStoreResult<Id> {
        self.id.clone().ok_or_else(|| {
            crate::raise_error!(
                format!("mailbox {} was never saved", self.path),
                crate::modules::error::code::ErrorCode::InternalError
            )
        })
    }
}
