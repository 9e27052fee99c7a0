// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::{code::ErrorCode, MailStoreResult};
use crate::modules::utils::generate_id;
use crate::raise_error;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info_span, Span};

/// A per-login session. Sessions are created by the manager, bracketed by
/// `start_processing_request` / `end_processing_request`, and closed by
/// `logout`. Once closed, no mapper-facing call succeeds.
#[derive(Debug)]
pub struct MailboxSession {
    session_id: u64,
    user: String,
    open: AtomicBool,
    span: Span,
}

impl MailboxSession {
    pub(crate) fn create(user: &str) -> Self {
        let session_id = generate_id();
        Self {
            session_id,
            user: user.into(),
            open: AtomicBool::new(true),
            span: info_span!("session", user, session_id),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// The session's log sink; operations enter it so backend log lines
    /// carry the user and session id.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Fail with `SessionClosed` unless the session is still open.
    pub fn ensure_open(&self) -> MailStoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(raise_error!(
                format!("session {} for {} is closed", self.session_id, self.user),
                ErrorCode::SessionClosed
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_session_is_rejected() {
        let session = MailboxSession::create("alice");
        assert!(session.ensure_open().is_ok());
        session.close();
        let error = session.ensure_open().unwrap_err();
        assert_eq!(error.code(), ErrorCode::SessionClosed);
    }

    #[test]
    fn test_session_ids_are_distinct() {
        let first = MailboxSession::create("alice");
        let second = MailboxSession::create("alice");
        assert_ne!(first.session_id(), second.session_id());
    }
}
