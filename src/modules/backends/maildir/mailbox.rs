// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::backends::maildir::{
    folder_key, key_to_path, MaildirFolder, SUBSCRIPTION_FILE,
};
use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::mailbox::{Mailbox, MailboxAcl, MailboxPath};
use crate::modules::mapper::mailbox::{compile_pattern, MailboxMapper};
use crate::modules::mapper::SubscriptionMapper;
use crate::modules::message::Subscription;
use crate::modules::transaction::{TransactionState, TransactionalMapper};
use crate::raise_error;
use std::fs;
use std::path::PathBuf;

pub struct MaildirMailboxMapper {
    root: PathBuf,
    delimiter: char,
    state: TransactionState,
}

impl MaildirMailboxMapper {
    pub fn new(root: PathBuf, delimiter: char) -> Self {
        Self {
            root,
            delimiter,
            state: TransactionState::new(),
        }
    }

    fn load_mailbox(&self, key: &str) -> MailStoreResult<Option<Mailbox<String>>> {
        let folder = MaildirFolder::new(self.root.join(key));
        if !folder.exists() {
            return Ok(None);
        }
        let list = folder.load()?;
        Ok(Some(Mailbox {
            id: Some(key.to_string()),
            path: key_to_path(key, self.delimiter),
            uid_validity: list.uid_validity,
            last_known_uid: list.last_uid,
            highest_known_modseq: list.highest_modseq,
            acl: MailboxAcl::full(),
        }))
    }

    fn folder_keys(&self) -> MailStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let users = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Ok(keys),
        };
        for user_entry in users {
            let user_entry =
                user_entry.map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            if !user_entry.path().is_dir() {
                continue;
            }
            let user = user_entry.file_name().to_string_lossy().to_string();
            if user_entry.path().join("cur").is_dir() {
                keys.push(user.clone());
            }
            let children = fs::read_dir(user_entry.path())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            for child in children {
                let child =
                    child.map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                let name = child.file_name().to_string_lossy().to_string();
                if child.path().is_dir() && name.starts_with('.') && child.path().join("cur").is_dir()
                {
                    keys.push(format!("{}/{}", user, name));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl TransactionalMapper for MaildirMailboxMapper {
    fn transaction(&self) -> &TransactionState {
        &self.state
    }

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

impl MailboxMapper<String> for MaildirMailboxMapper {
    fn find_by_path(&self, path: &MailboxPath) -> MailStoreResult<Option<Mailbox<String>>> {
        self.load_mailbox(&folder_key(path, self.delimiter))
    }

    fn find_with_path_like(
        &self,
        pattern: &MailboxPath,
        delimiter: char,
    ) -> MailStoreResult<Vec<Mailbox<String>>> {
        let regex = compile_pattern(&pattern.name, delimiter)?;
        let mut matches = Vec::new();
        for key in self.folder_keys()? {
            let path = key_to_path(&key, self.delimiter);
            if path.namespace == pattern.namespace
                && path.user == pattern.user
                && regex.is_match(&path.name)
            {
                if let Some(mailbox) = self.load_mailbox(&key)? {
                    matches.push(mailbox);
                }
            }
        }
        Ok(matches)
    }

    fn has_children(&self, mailbox: &Mailbox<String>, delimiter: char) -> MailStoreResult<bool> {
        let prefix = format!("{}{}", mailbox.path.name, delimiter);
        for key in self.folder_keys()? {
            let path = key_to_path(&key, self.delimiter);
            if path.user == mailbox.path.user && path.name.starts_with(&prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn save(&self, mailbox: &mut Mailbox<String>) -> MailStoreResult<()> {
        let target_key = folder_key(&mailbox.path, self.delimiter);
        match &mailbox.id {
            None => {
                let folder = MaildirFolder::new(self.root.join(&target_key));
                if folder.exists() {
                    return Err(raise_error!(
                        format!("mailbox {} already exists", mailbox.path),
                        ErrorCode::MailboxExists
                    ));
                }
                folder.create(mailbox.uid_validity)?;
                mailbox.id = Some(target_key);
            }
            Some(current_key) if *current_key == target_key => {
                // Same path: the uidlist is the durable state, nothing to do.
            }
            Some(current_key) => {
                let target = MaildirFolder::new(self.root.join(&target_key));
                if target.exists() {
                    return Err(raise_error!(
                        format!("mailbox {} already exists", mailbox.path),
                        ErrorCode::MailboxExists
                    ));
                }
                // A rename moves the directory wholesale; the uidlist rides
                // along, so uid-validity is preserved.
                fs::rename(self.root.join(current_key), self.root.join(&target_key))
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                mailbox.id = Some(target_key);
            }
        }
        Ok(())
    }

    fn delete(&self, mailbox: &Mailbox<String>) -> MailStoreResult<()> {
        let key = mailbox.stored_id()?;
        let dir = self.root.join(&key);
        if mailbox.path.is_inbox() {
            // The INBOX is the user root; its sub-mailboxes live inside it
            // as dot-directories and must survive.
            for sub in ["cur", "new", "tmp"] {
                let path = dir.join(sub);
                if path.is_dir() {
                    fs::remove_dir_all(&path)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
                }
            }
            let uidlist = dir.join(super::UIDLIST_FILE);
            if uidlist.is_file() {
                fs::remove_file(&uidlist)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
            }
        } else {
            fs::remove_dir_all(&dir)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        }
        Ok(())
    }

    fn list(&self) -> MailStoreResult<Vec<Mailbox<String>>> {
        let mut mailboxes = Vec::new();
        for key in self.folder_keys()? {
            if let Some(mailbox) = self.load_mailbox(&key)? {
                mailboxes.push(mailbox);
            }
        }
        Ok(mailboxes)
    }
}

pub struct MaildirSubscriptionMapper {
    root: PathBuf,
    state: TransactionState,
}

impl MaildirSubscriptionMapper {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: TransactionState::new(),
        }
    }

    fn subscription_file(&self, user: &str) -> PathBuf {
        self.root.join(user).join(SUBSCRIPTION_FILE)
    }

    fn read_subscriptions(&self, user: &str) -> MailStoreResult<Vec<String>> {
        match fs::read_to_string(self.subscription_file(user)) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(String::from)
                .collect()),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn write_subscriptions(&self, user: &str, names: &[String]) -> MailStoreResult<()> {
        fs::create_dir_all(self.root.join(user))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        fs::write(self.subscription_file(user), names.join("\n"))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))
    }
}

impl TransactionalMapper for MaildirSubscriptionMapper {
    fn transaction(&self) -> &TransactionState {
        &self.state
    }

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

impl SubscriptionMapper for MaildirSubscriptionMapper {
    fn save(&self, subscription: &Subscription) -> MailStoreResult<()> {
        let mut names = self.read_subscriptions(&subscription.user)?;
        if !names.contains(&subscription.mailbox) {
            names.push(subscription.mailbox.clone());
            self.write_subscriptions(&subscription.user, &names)?;
        }
        Ok(())
    }

    fn delete(&self, subscription: &Subscription) -> MailStoreResult<()> {
        let mut names = self.read_subscriptions(&subscription.user)?;
        let before = names.len();
        names.retain(|name| name != &subscription.mailbox);
        if names.len() != before {
            self.write_subscriptions(&subscription.user, &names)?;
        }
        Ok(())
    }

    fn find_subscriptions_for_user(&self, user: &str) -> MailStoreResult<Vec<Subscription>> {
        Ok(self
            .read_subscriptions(user)?
            .into_iter()
            .map(|mailbox| Subscription {
                user: user.to_string(),
                mailbox,
            })
            .collect())
    }
}
