// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use crate::modules::message::Subscription;
use crate::modules::transaction::TransactionalMapper;

/// Per-user mailbox subscriptions.
pub trait SubscriptionMapper: TransactionalMapper {
    /// Record the subscription; saving an existing one is a no-op.
    fn save(&self, subscription: &Subscription) -> MailStoreResult<()>;

    /// Drop the subscription if present.
    fn delete(&self, subscription: &Subscription) -> MailStoreResult<()>;

    /// Every mailbox name the user subscribed to.
    fn find_subscriptions_for_user(&self, user: &str) -> MailStoreResult<Vec<Subscription>>;

    fn is_subscribed(&self, user: &str, mailbox: &str) -> MailStoreResult<bool>
    where
        Self: Sized,
    {
        Ok(self
            .find_subscriptions_for_user(user)?
            .iter()
            .any(|subscription| subscription.mailbox == mailbox))
    }
}
