// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::error::MailStoreResult;
use std::cell::Cell;
use tracing::warn;

/// Frame bookkeeping owned by each mapper. Mappers are confined to one
/// session thread, so a plain `Cell` is enough.
#[derive(Debug, Default)]
pub struct TransactionState {
    depth: Cell<u32>,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }
}

/// A scoped unit of backend work. `execute` opens a frame only at the
/// outermost call; nested calls run inside the enclosing frame. On success
/// the frame commits, on failure it rolls back, and the frame is released
/// on every exit path. A rollback failure is logged and never shadows the
/// error that triggered it.
pub trait TransactionalMapper {
    fn transaction(&self) -> &TransactionState;

    /// Open a backend transaction. Non-transactional backends provide a
    /// no-op here.
    fn begin(&self) -> MailStoreResult<()>;

    /// Commit the open transaction.
    fn commit(&self) -> MailStoreResult<()>;

    /// Roll the open transaction back, best-effort.
    fn rollback(&self) -> MailStoreResult<()>;

    fn execute<T, F>(&self, work: F) -> MailStoreResult<T>
    where
        Self: Sized,
        F: FnOnce() -> MailStoreResult<T>,
    {
        let state = self.transaction();
        if state.in_transaction() {
            // Re-entrant call: reuse the outermost frame.
            state.depth.set(state.depth.get() + 1);
            let outcome = work();
            state.depth.set(state.depth.get() - 1);
            return outcome;
        }

        self.begin()?;
        state.depth.set(1);
        let outcome = work();
        state.depth.set(0);
        match outcome {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback() {
                    warn!(
                        "rollback after failed frame also failed: {}",
                        rollback_error
                    );
                }
                Err(error)
            }
        }
    }
}
