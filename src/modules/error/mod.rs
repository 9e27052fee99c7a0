// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailStoreError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type MailStoreResult<T, E = MailStoreError> = std::result::Result<T, E>;

impl MailStoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailStoreError::Generic { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MailStoreError::Generic { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raise_error;

    #[test]
    fn test_error_carries_code() {
        let error = raise_error!("mailbox INBOX not found".into(), ErrorCode::MailboxNotFound);
        assert_eq!(error.code(), ErrorCode::MailboxNotFound);
        assert_eq!(error.to_string(), "mailbox INBOX not found");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ErrorCode::StorageError.transient());
        assert!(!ErrorCode::MailboxExists.transient());
    }
}
