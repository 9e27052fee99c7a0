// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::maildir::{
    message_filename, MaildirFolder, UidEntry,
};
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::Mailbox;
use crate::modules::mapper::MessageMapper;
use crate::modules::message::{
    enumerate_headers, FetchType, Flag, MailMessage, MessageMetaData, MessageRange,
};
use crate::modules::sequence::{SequenceRegistry, SequenceSource};
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::raise_error;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub struct MaildirMessageMapper {
    root: PathBuf,
    registry: Arc<SequenceRegistry<String>>,
    state: TransactionState,
}

impl MaildirMessageMapper {
    pub fn new(root: PathBuf, registry: Arc<SequenceRegistry<String>>) -> Self {
        Self {
            root,
            registry,
            state: TransactionState::new(),
        }
    }

    fn folder(&self, mailbox: &Mailbox<String>) -> MailStoreResult<MaildirFolder> {
        let key = mailbox.stored_id()?;
        Ok(MaildirFolder::new(self.root.join(key)))
    }

    /// Materialize one uidlist entry as a message at the requested depth.
    fn entry_to_message(
        &self,
        folder: &MaildirFolder,
        mailbox_id: &str,
        entry: &UidEntry,
        fetch_type: FetchType,
    ) -> MailStoreResult<MailMessage<String>> {
        let located = folder.message_path(&entry.filename);
        let recent = located.as_ref().map(|(_, in_new)| *in_new).unwrap_or(false);
        let mut message = MailMessage {
            mailbox_id: mailbox_id.to_string(),
            uid: entry.uid,
            modseq: entry.modseq,
            internal_date: entry.internal_date,
            size: entry.size,
            flags: entry.flags(recent),
            headers: Vec::new(),
            body: Vec::new(),
        };
        if matches!(fetch_type, FetchType::Headers | FetchType::Full) {
            let (path, _) = located.ok_or_else(|| {
                raise_error!(
                    format!("message file {} is missing", entry.filename),
                    ErrorCode::MessageNotFound
                )
            })?;
            let raw = fs::read(&path)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            message.headers = enumerate_headers(&raw);
            if fetch_type == FetchType::Full {
                message.body = raw;
            }
        }
        Ok(message)
    }

    /// Deliver raw content into the maildir: write under tmp/, then rename
    /// into new/ (recent) or cur/.
    fn deliver(
        &self,
        folder: &MaildirFolder,
        filename: &str,
        raw: &[u8],
        recent: bool,
    ) -> MailStoreResult<()> {
        let tmp = folder.dir().join("tmp").join(filename);
        fs::write(&tmp, raw)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        let target = folder
            .dir()
            .join(if recent { "new" } else { "cur" })
            .join(filename);
        fs::rename(&tmp, &target)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(())
    }
}

impl TransactionalMapper for MaildirMessageMapper {
    fn transaction(&self) -> &TransactionState {
        &self.state
    }

    // The filesystem has no transactions; individual writes are atomic via
    // the tmp-then-rename discipline, so the frame is degenerate.
    fn begin(&self) -> MailStoreResult<()> {
        Ok(())
    }

    fn commit(&self) -> MailStoreResult<()> {
        Ok(())
    }

    fn rollback(&self) -> MailStoreResult<()> {
        Ok(())
    }
}

impl SequenceSource<String> for MaildirMessageMapper {
    fn calculate_last_uid(&self, mailbox: &Mailbox<String>) -> MailStoreResult<u64> {
        let list = self.folder(mailbox)?.load()?;
        Ok(list
            .entries
            .last()
            .map(|entry| entry.uid)
            .unwrap_or(list.last_uid))
    }

    fn calculate_highest_modseq(&self, mailbox: &Mailbox<String>) -> MailStoreResult<u64> {
        let list = self.folder(mailbox)?.load()?;
        Ok(list
            .entries
            .iter()
            .map(|entry| entry.modseq)
            .max()
            .unwrap_or(list.highest_modseq))
    }
}

impl MessageMapper<String> for MaildirMessageMapper {
    fn count_messages(&self, mailbox: &Mailbox<String>) -> MailStoreResult<u64> {
        Ok(self.folder(mailbox)?.load()?.entries.len() as u64)
    }

    fn count_unseen(&self, mailbox: &Mailbox<String>) -> MailStoreResult<u64> {
        Ok(self
            .folder(mailbox)?
            .load()?
            .entries
            .iter()
            .filter(|entry| !entry.flags(false).contains(&Flag::Seen))
            .count() as u64)
    }

    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox<String>,
        range: MessageRange,
        fetch_type: FetchType,
        max: Option<usize>,
    ) -> MailStoreResult<Vec<MailMessage<String>>> {
        let mailbox_id = mailbox.stored_id()?;
        let folder = self.folder(mailbox)?;
        let list = folder.load()?;
        let mut members = Vec::new();
        for entry in list.entries.iter().filter(|entry| range.contains(entry.uid)) {
            if let Some(max) = max {
                if members.len() >= max {
                    break;
                }
            }
            members.push(self.entry_to_message(&folder, &mailbox_id, entry, fetch_type)?);
        }
        Ok(members)
    }

    fn find_recent_uids(&self, mailbox: &Mailbox<String>) -> MailStoreResult<Vec<u64>> {
        let folder = self.folder(mailbox)?;
        let list = folder.load()?;
        Ok(list
            .entries
            .iter()
            .filter(|entry| {
                matches!(folder.message_path(&entry.filename), Some((_, true)))
            })
            .map(|entry| entry.uid)
            .collect())
    }

    fn find_first_unseen_uid(&self, mailbox: &Mailbox<String>) -> MailStoreResult<Option<u64>> {
        Ok(self
            .folder(mailbox)?
            .load()?
            .entries
            .iter()
            .find(|entry| !entry.flags(false).contains(&Flag::Seen))
            .map(|entry| entry.uid))
    }

    fn save(&self, mailbox: &Mailbox<String>, message: &MailMessage<String>) -> MailStoreResult<()> {
        let folder = self.folder(mailbox)?;
        let mut list = folder.load()?;
        let recent = message.flags.contains(&Flag::Recent);
        let position = list
            .entries
            .iter()
            .position(|entry| entry.uid == message.uid);
        match position {
            Some(index) => {
                let entry = &mut list.entries[index];
                // Flag change: rename the file so the info segment and the
                // new/cur residence reflect the new flag set.
                let (current, _) = folder.message_path(&entry.filename).ok_or_else(|| {
                    raise_error!(
                        format!("message file {} is missing", entry.filename),
                        ErrorCode::MessageNotFound
                    )
                })?;
                let filename = message_filename(message.uid, entry.internal_date, &message.flags);
                let target = folder
                    .dir()
                    .join(if recent { "new" } else { "cur" })
                    .join(&filename);
                fs::rename(&current, &target)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                entry.filename = filename;
                entry.modseq = message.modseq;
                entry.keywords = message.flags.keywords();
            }
            None => {
                let filename = message_filename(message.uid, message.internal_date, &message.flags);
                self.deliver(&folder, &filename, &message.body, recent)?;
                list.entries.push(UidEntry {
                    uid: message.uid,
                    modseq: message.modseq,
                    internal_date: message.internal_date,
                    size: message.size,
                    keywords: message.flags.keywords(),
                    filename,
                });
                list.entries.sort_by_key(|entry| entry.uid);
            }
        }
        folder.store(&list)
    }

    fn save_sequences(
        &self,
        mailbox: &Mailbox<String>,
        last_uid: u64,
        highest_modseq: u64,
    ) -> MailStoreResult<()> {
        let folder = self.folder(mailbox)?;
        let mut list = folder.load()?;
        list.last_uid = list.last_uid.max(last_uid);
        list.highest_modseq = list.highest_modseq.max(highest_modseq);
        folder.store(&list)
    }

    fn copy_message(
        &self,
        mailbox: &Mailbox<String>,
        uid: u64,
        modseq: u64,
        original: &MailMessage<String>,
    ) -> MailStoreResult<MailMessage<String>> {
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
        mailbox: &Mailbox<String>,
        range: MessageRange,
    ) -> MailStoreResult<BTreeMap<u64, MessageMetaData>> {
        let folder = self.folder(mailbox)?;
        let mut list = folder.load()?;
        let mut data = BTreeMap::new();
        let mut kept = Vec::with_capacity(list.entries.len());
        for entry in list.entries.drain(..) {
            let deleted = entry.flags(false).contains(&Flag::Deleted) && range.contains(entry.uid);
            if deleted {
                if let Some((path, in_new)) = folder.message_path(&entry.filename) {
                    fs::remove_file(&path)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                    data.insert(
                        entry.uid,
                        MessageMetaData {
                            uid: entry.uid,
                            modseq: entry.modseq,
                            flags: entry.flags(in_new),
                            size: entry.size,
                            internal_date: entry.internal_date,
                        },
                    );
                } else {
                    data.insert(
                        entry.uid,
                        MessageMetaData {
                            uid: entry.uid,
                            modseq: entry.modseq,
                            flags: entry.flags(false),
                            size: entry.size,
                            internal_date: entry.internal_date,
                        },
                    );
                }
            } else {
                kept.push(entry);
            }
        }
        list.entries = kept;
        folder.store(&list)?;
        Ok(data)
    }

    fn sequences(&self) -> &SequenceRegistry<String> {
        &self.registry
    }
}
