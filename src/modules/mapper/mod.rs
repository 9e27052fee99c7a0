// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::mailbox::MailboxId;
use crate::modules::session::MailboxSession;

pub mod mailbox;
pub mod message;
pub mod subscription;

pub use mailbox::MailboxMapper;
pub use message::MessageMapper;
pub use subscription::SubscriptionMapper;

/// Creates the per-session mappers of one backend. A session exclusively
/// owns the mappers it obtains; mapper instances are never shared across
/// threads.
pub trait SessionMapperFactory: Send + Sync + 'static {
    type Id: MailboxId;
    type MessageMapper: MessageMapper<Self::Id>;
    type MailboxMapper: MailboxMapper<Self::Id>;
    type SubscriptionMapper: SubscriptionMapper;

    fn create_message_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MessageMapper>;

    fn create_mailbox_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::MailboxMapper>;

    fn create_subscription_mapper(
        &self,
        session: &MailboxSession,
    ) -> MailStoreResult<Self::SubscriptionMapper>;

    /// Hierarchy delimiter this backend presents.
    fn delimiter(&self) -> char;
}
