// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

//! Filesystem maildir backend. Each mailbox is a `cur/` / `new/` / `tmp/`
//! directory; system flags live in the `:2,` filename segment, Recent is
//! residence in `new/`, and a per-mailbox `mailstore-uidlist` file persists
//! the uid-validity, the sequence high-water marks and the per-message
//! metadata that classic maildir cannot carry (modseq, keywords).
//!
//! Folder keys (the backend-native mailbox id) are paths relative to the
//! store root: `"{user}"` for the INBOX, `"{user}/.{folder}"` for everything
//! else, maildir++ style, with names encoded in modified UTF-7.

use crate::encode_mailbox_name;
use crate::modules::backends::maildir::mailbox::{
    MaildirMailboxMapper, MaildirSubscriptionMapper,
};
use crate::modules::backends::maildir::message::MaildirMessageMapper;
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::{MailboxPath, INBOX};
use crate::modules::mapper::SessionMapperFactory;
use crate::modules::message::{Flag, Flags};
use crate::modules::sequence::SequenceRegistry;
use crate::modules::session::MailboxSession;
use crate::raise_error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod mailbox;
pub mod message;
#[cfg(test)]
mod tests;

pub const UIDLIST_FILE: &str = "mailstore-uidlist";
pub const SUBSCRIPTION_FILE: &str = "mailstore-subscriptions";

pub struct MaildirStore {
    root: PathBuf,
    registry: Arc<SequenceRegistry<String>>,
    delimiter: char,
}

impl MaildirStore {
    pub fn open(root: impl Into<PathBuf>, delimiter: char) -> MailStoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(Self {
            root,
            registry: Arc::new(SequenceRegistry::new()),
            delimiter,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> Arc<SequenceRegistry<String>> {
        self.registry.clone()
    }
}

/// Relative folder key for a mailbox path: the user directory for INBOX,
/// a dot-prefixed maildir++ directory below it for everything else.
pub fn folder_key(path: &MailboxPath, delimiter: char) -> String {
    if path.name == INBOX {
        path.user.clone()
    } else {
        let encoded = encode_mailbox_name!(&path.name);
        format!("{}/.{}", path.user, encoded.replace(delimiter, "."))
    }
}

/// Mailbox path a folder key maps back to.
pub fn key_to_path(key: &str, delimiter: char) -> MailboxPath {
    match key.split_once("/.") {
        Some((user, dotted)) => {
            let name = crate::decode_mailbox_name!(dotted.replace('.', &delimiter.to_string()));
            MailboxPath::for_user(user, &name)
        }
        None => MailboxPath::inbox(key),
    }
}

impl SessionMapperFactory for MaildirStore {
    type Id = String;
    type MessageMapper = MaildirMessageMapper;
    type MailboxMapper = MaildirMailboxMapper;
    type SubscriptionMapper = MaildirSubscriptionMapper;

    fn create_message_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MessageMapper> {
        session.ensure_open()?;
        Ok(MaildirMessageMapper::new(
            self.root.clone(),
            self.registry.clone(),
        ))
    }

    fn create_mailbox_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MailboxMapper> {
        session.ensure_open()?;
        Ok(MaildirMailboxMapper::new(self.root.clone(), self.delimiter))
    }

    fn create_subscription_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::SubscriptionMapper> {
        session.ensure_open()?;
        Ok(MaildirSubscriptionMapper::new(self.root.clone()))
    }

    fn delimiter(&self) -> char {
        self.delimiter
    }
}

/// One line of the uidlist file:
/// `uid modseq internal_date size keywords filename`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UidEntry {
    pub uid: u64,
    pub modseq: u64,
    pub internal_date: i64,
    pub size: u64,
    pub keywords: Vec<String>,
    pub filename: String,
}

impl UidEntry {
    /// Flags persisted for this entry: system flags from the filename info
    /// segment, keywords from the uidlist line, Recent from residence.
    pub fn flags(&self, recent: bool) -> Flags {
        let mut flags: Flags = info_flags(&self.filename);
        for keyword in &self.keywords {
            flags.insert(Flag::Custom(keyword.clone()));
        }
        if recent {
            flags.insert(Flag::Recent);
        }
        flags
    }
}

/// Parsed `mailstore-uidlist` contents.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UidList {
    pub uid_validity: u64,
    pub last_uid: u64,
    pub highest_modseq: u64,
    pub entries: Vec<UidEntry>,
}

impl UidList {
    pub fn new(uid_validity: u64) -> Self {
        Self {
            uid_validity,
            last_uid: 0,
            highest_modseq: 0,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, uid: u64) -> Option<&UidEntry> {
        self.entries.iter().find(|entry| entry.uid == uid)
    }
}

/// A single mailbox directory with its uidlist.
pub struct MaildirFolder {
    dir: PathBuf,
}

impl MaildirFolder {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.join("cur").is_dir()
    }

    /// Create the maildir structure and seed the uidlist.
    pub fn create(&self, uid_validity: u64) -> MailStoreResult<()> {
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir_all(self.dir.join(sub))
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        }
        if !self.dir.join(UIDLIST_FILE).exists() {
            self.store(&UidList::new(uid_validity))?;
        }
        Ok(())
    }

    pub fn load(&self) -> MailStoreResult<UidList> {
        let path = self.dir.join(UIDLIST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            raise_error!(
                format!("cannot read uidlist {:?}: {}", path, e),
                ErrorCode::MailboxNotFound
            )
        })?;
        parse_uidlist(&content)
    }

    /// Rewrite the uidlist atomically (write into tmp/, rename over).
    pub fn store(&self, list: &UidList) -> MailStoreResult<()> {
        let mut rendered = format!(
            "1 V{} L{} M{}\n",
            list.uid_validity, list.last_uid, list.highest_modseq
        );
        for entry in &list.entries {
            let keywords = if entry.keywords.is_empty() {
                "-".to_string()
            } else {
                entry.keywords.join(",")
            };
            rendered.push_str(&format!(
                "{} {} {} {} {} {}\n",
                entry.uid,
                entry.modseq,
                entry.internal_date,
                entry.size,
                keywords,
                entry.filename
            ));
        }
        let tmp = self.dir.join("tmp").join(UIDLIST_FILE);
        fs::write(&tmp, rendered)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        fs::rename(&tmp, self.dir.join(UIDLIST_FILE))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(())
    }

    /// Absolute path of a stored message file, preferring `new/`.
    pub fn message_path(&self, filename: &str) -> Option<(PathBuf, bool)> {
        let in_new = self.dir.join("new").join(filename);
        if in_new.is_file() {
            return Some((in_new, true));
        }
        let in_cur = self.dir.join("cur").join(filename);
        if in_cur.is_file() {
            return Some((in_cur, false));
        }
        None
    }
}

/// System flags encoded in a maildir info segment (`...:2,DFRST`).
pub fn info_flags(filename: &str) -> Flags {
    match filename.rsplit_once(":2,") {
        Some((_, info)) => info.chars().filter_map(Flag::from_maildir_char).collect(),
        None => Flags::new(),
    }
}

/// Filename for a message: `{internal_date}.M{uid}P{pid}.mailstore:2,{info}`.
pub fn message_filename(uid: u64, internal_date: i64, flags: &Flags) -> String {
    let mut info: Vec<char> = flags.iter().filter_map(Flag::maildir_char).collect();
    info.sort_unstable();
    format!(
        "{}.M{}P{}.mailstore:2,{}",
        internal_date,
        uid,
        std::process::id(),
        info.into_iter().collect::<String>()
    )
}

fn parse_uidlist(content: &str) -> MailStoreResult<UidList> {
    let mut lines = content.lines();
    let header = lines.next().ok_or_else(|| {
        raise_error!("uidlist is empty".into(), ErrorCode::StorageError)
    })?;
    let mut list = UidList::default();
    for field in header.split_whitespace().skip(1) {
        let (tag, value) = field.split_at(1);
        let value: u64 = value
            .parse()
            .map_err(|_| raise_error!(format!("bad uidlist header {}", header), ErrorCode::StorageError))?;
        match tag {
            "V" => list.uid_validity = value,
            "L" => list.last_uid = value,
            "M" => list.highest_modseq = value,
            _ => {}
        }
    }
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(6, ' ');
        let entry = (|| -> Option<UidEntry> {
            Some(UidEntry {
                uid: fields.next()?.parse().ok()?,
                modseq: fields.next()?.parse().ok()?,
                internal_date: fields.next()?.parse().ok()?,
                size: fields.next()?.parse().ok()?,
                keywords: match fields.next()? {
                    "-" => Vec::new(),
                    joined => joined.split(',').map(String::from).collect(),
                },
                filename: fields.next()?.to_string(),
            })
        })()
        .ok_or_else(|| {
            raise_error!(format!("bad uidlist line '{}'", line), ErrorCode::StorageError)
        })?;
        list.entries.push(entry);
    }
    list.entries.sort_by_key(|entry| entry.uid);
    Ok(list)
}
