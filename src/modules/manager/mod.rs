// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::event::dispatcher::ListenerDispatcher;
use crate::modules::event::{EventPayload, MailboxEvent, MailboxListener};
use crate::modules::mailbox::{Mailbox, MailboxPath};
use crate::modules::mapper::{MailboxMapper, SessionMapperFactory, SubscriptionMapper};
use crate::modules::message::Subscription;
use crate::modules::session::MailboxSession;
use crate::modules::transaction::TransactionalMapper;
use crate::raise_error;
use std::sync::Arc;
use tracing::{debug, info};

pub mod message;
#[cfg(test)]
mod tests;

pub use message::{MailboxMetaData, MessageManager};

/// Session-facing mailbox manager over one backend factory. Owns the event
/// dispatcher; every state change is announced through it.
pub struct StoreMailboxManager<F: SessionMapperFactory> {
    factory: Arc<F>,
    dispatcher: Arc<ListenerDispatcher>,
}

impl<F: SessionMapperFactory> StoreMailboxManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            dispatcher: Arc::new(ListenerDispatcher::new()),
        }
    }

    pub fn delimiter(&self) -> char {
        self.factory.delimiter()
    }

    pub fn dispatcher(&self) -> Arc<ListenerDispatcher> {
        self.dispatcher.clone()
    }

    /// Create a session for the user. Authentication happens upstream; an
    /// empty user name is the one credential fault visible here.
    pub fn create_system_session(&self, user: &str) -> MailStoreResult<MailboxSession> {
        if user.is_empty() {
            return Err(raise_error!(
                "cannot create a session without a user".into(),
                ErrorCode::BadCredentials
            ));
        }
        let session = MailboxSession::create(user);
        info!(
            "created session {} for user {}",
            session.session_id(),
            user
        );
        Ok(session)
    }

    /// Bracket the start of one request. Backend handles are scoped to the
    /// mappers created inside the request and released with them.
    pub fn start_processing_request(&self, session: &MailboxSession) -> MailStoreResult<()> {
        session.ensure_open()?;
        debug!("session {} begins processing", session.session_id());
        Ok(())
    }

    /// Bracket the end of one request. Must be invoked on every exit path,
    /// including termination of the owning thread.
    pub fn end_processing_request(&self, session: &MailboxSession) {
        debug!("session {} ends processing", session.session_id());
    }

    pub fn logout(&self, session: &MailboxSession, force: bool) {
        let _guard = session.span().enter();
        info!("session {} logout (force: {})", session.session_id(), force);
        session.close();
    }

    pub fn mailbox_exists(
        &self,
        path: &MailboxPath,
        session: &MailboxSession,
    ) -> MailStoreResult<bool> {
        session.ensure_open()?;
        let mapper = self.factory.create_mailbox_mapper(session)?;
        Ok(mapper.find_by_path(path)?.is_some())
    }

    pub fn create_mailbox(
        &self,
        path: &MailboxPath,
        session: &MailboxSession,
    ) -> MailStoreResult<()> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        if path.name.is_empty() {
            return Err(raise_error!(
                "mailbox name must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let mapper = self.factory.create_mailbox_mapper(session)?;
        let mut mailbox = Mailbox::new(path.clone(), new_uid_validity());
        mapper.execute(|| mapper.save(&mut mailbox))?;
        info!("created mailbox {}", path);
        self.dispatcher
            .dispatch(&MailboxEvent::new(path.clone(), EventPayload::MailboxAdded));
        Ok(())
    }

    /// Delete the mailbox. Sub-mailboxes are independent and survive.
    pub fn delete_mailbox(
        &self,
        path: &MailboxPath,
        session: &MailboxSession,
    ) -> MailStoreResult<()> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let mapper = self.factory.create_mailbox_mapper(session)?;
        let mailbox = mapper.find_by_path(path)?.ok_or_else(|| {
            raise_error!(
                format!("mailbox {} not found", path),
                ErrorCode::MailboxNotFound
            )
        })?;
        mapper.execute(|| mapper.delete(&mailbox))?;
        info!("deleted mailbox {}", path);
        self.dispatcher.dispatch(&MailboxEvent::new(
            path.clone(),
            EventPayload::MailboxDeleted,
        ));
        Ok(())
    }

    /// Rename a mailbox and every mailbox below it. Uid-validity of each
    /// renamed mailbox is preserved by the mapper.
    pub fn rename_mailbox(
        &self,
        from: &MailboxPath,
        to: &MailboxPath,
        session: &MailboxSession,
    ) -> MailStoreResult<()> {
        session.ensure_open()?;
        let _guard = session.span().enter();
        let delimiter = self.factory.delimiter();
        let mapper = self.factory.create_mailbox_mapper(session)?;
        if mapper.find_by_path(to)?.is_some() {
            return Err(raise_error!(
                format!("mailbox {} already exists", to),
                ErrorCode::MailboxExists
            ));
        }
        let mut mailbox = mapper.find_by_path(from)?.ok_or_else(|| {
            raise_error!(
                format!("mailbox {} not found", from),
                ErrorCode::MailboxNotFound
            )
        })?;

        mapper.execute(|| {
            mailbox.path = to.clone();
            mapper.save(&mut mailbox)
        })?;
        info!("renamed mailbox {} to {}", from, to);
        self.dispatcher.dispatch(&MailboxEvent::new(
            from.clone(),
            EventPayload::MailboxRenamed {
                new_path: to.clone(),
            },
        ));

        // Children ride along one level at a time.
        let child_pattern = MailboxPath::new(
            &from.namespace,
            &from.user,
            &format!("{}{}*", from.name, delimiter),
        );
        for mut child in mapper.find_with_path_like(&child_pattern, delimiter)? {
            let old_child_path = child.path.clone();
            let remainder = old_child_path.name[from.name.len()..].to_string();
            child.path.name = format!("{}{}", to.name, remainder);
            let new_child_path = child.path.clone();
            mapper.execute(|| mapper.save(&mut child))?;
            self.dispatcher.dispatch(&MailboxEvent::new(
                old_child_path,
                EventPayload::MailboxRenamed {
                    new_path: new_child_path,
                },
            ));
        }
        Ok(())
    }

    /// Open a mailbox for message operations. The INBOX is autocreated on
    /// first access.
    pub fn get_mailbox(
        &self,
        path: &MailboxPath,
        session: &MailboxSession,
    ) -> MailStoreResult<MessageManager<F>> {
        session.ensure_open()?;
        let mapper = self.factory.create_mailbox_mapper(session)?;
        let mailbox = match mapper.find_by_path(path)? {
            Some(mailbox) => mailbox,
            None if path.is_inbox() => {
                let mut mailbox = Mailbox::new(path.clone(), new_uid_validity());
                mapper.execute(|| mapper.save(&mut mailbox))?;
                info!("autocreated INBOX for {}", path.user);
                self.dispatcher
                    .dispatch(&MailboxEvent::new(path.clone(), EventPayload::MailboxAdded));
                mailbox
            }
            None => {
                return Err(raise_error!(
                    format!("mailbox {} not found", path),
                    ErrorCode::MailboxNotFound
                ))
            }
        };
        let message_mapper = self.factory.create_message_mapper(session)?;
        MessageManager::open(mailbox, message_mapper, self.dispatcher.clone())
    }

    /// Every mailbox path the session may enumerate. Access filtering
    /// belongs to the external ACL oracle.
    pub fn list(&self, session: &MailboxSession) -> MailStoreResult<Vec<MailboxPath>> {
        session.ensure_open()?;
        let mapper = self.factory.create_mailbox_mapper(session)?;
        Ok(mapper
            .list()?
            .into_iter()
            .map(|mailbox| mailbox.path)
            .collect())
    }

    pub fn subscribe(&self, session: &MailboxSession, mailbox: &str) -> MailStoreResult<()> {
        session.ensure_open()?;
        let mapper = self.factory.create_subscription_mapper(session)?;
        mapper.save(&Subscription {
            user: session.user().to_string(),
            mailbox: mailbox.to_string(),
        })
    }

    pub fn unsubscribe(&self, session: &MailboxSession, mailbox: &str) -> MailStoreResult<()> {
        session.ensure_open()?;
        let mapper = self.factory.create_subscription_mapper(session)?;
        mapper.delete(&Subscription {
            user: session.user().to_string(),
            mailbox: mailbox.to_string(),
        })
    }

    pub fn subscriptions(&self, session: &MailboxSession) -> MailStoreResult<Vec<String>> {
        session.ensure_open()?;
        let mapper = self.factory.create_subscription_mapper(session)?;
        Ok(mapper
            .find_subscriptions_for_user(session.user())?
            .into_iter()
            .map(|subscription| subscription.mailbox)
            .collect())
    }

    /// Register a listener for events on the path.
    pub fn add_listener(
        &self,
        path: &MailboxPath,
        listener: Arc<dyn MailboxListener>,
        session: &MailboxSession,
    ) -> MailStoreResult<()> {
        session.ensure_open()?;
        self.dispatcher.subscribe(path, listener);
        Ok(())
    }
}

/// Fresh uid-validity stamp for a new mailbox. Nonzero 32-bit per the IMAP
/// convention.
fn new_uid_validity() -> u64 {
    (rand::random::<u32>() as u64).max(1)
}
