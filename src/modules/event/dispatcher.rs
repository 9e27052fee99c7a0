// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::event::{EventPayload, MailboxEvent, MailboxListener};
use crate::modules::mailbox::MailboxPath;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type ListenerTable = HashMap<MailboxPath, Vec<Arc<dyn MailboxListener>>>;

/// Delivers mailbox events to per-path subscribers. The table is guarded by
/// one mutex, so a rename moves its subscription list atomically with
/// respect to subsequent dispatches.
#[derive(Default)]
pub struct ListenerDispatcher {
    listeners: Mutex<ListenerTable>,
}

impl ListenerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the listener for the path unless the same instance is already
    /// subscribed. Membership is by identity, not value.
    pub fn subscribe(&self, path: &MailboxPath, listener: Arc<dyn MailboxListener>) {
        let mut table = self.lock();
        let entries = table.entry(path.clone()).or_default();
        if !entries.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            entries.push(listener);
        }
    }

    /// Deliver the event to every live listener of its path. Closed
    /// listeners are skipped and pruned. Deletion drops the path's list;
    /// a rename moves it to the new path.
    pub fn dispatch(&self, event: &MailboxEvent) {
        let mut table = self.lock();
        if let Some(entries) = table.get_mut(&event.path) {
            entries.retain(|listener| {
                if listener.is_closed() {
                    false
                } else {
                    listener.handle(event);
                    true
                }
            });
            if entries.is_empty() {
                table.remove(&event.path);
            }
        }

        match &event.payload {
            EventPayload::MailboxDeleted => {
                table.remove(&event.path);
            }
            EventPayload::MailboxRenamed { new_path } => {
                if let Some(entries) = table.remove(&event.path) {
                    debug!(
                        "moving {} listener(s) from {} to {}",
                        entries.len(),
                        event.path,
                        new_path
                    );
                    table.insert(new_path.clone(), entries);
                }
            }
            _ => {}
        }
    }

    pub fn listener_count(&self, path: &MailboxPath) -> usize {
        self.lock().get(path).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, ListenerTable> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        received: AtomicUsize,
        closed: AtomicBool,
    }

    impl MailboxListener for CountingListener {
        fn handle(&self, _event: &MailboxEvent) {
            self.received.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn added_event(path: &MailboxPath) -> MailboxEvent {
        MailboxEvent::new(path.clone(), EventPayload::MailboxAdded)
    }

    #[test]
    fn test_dispatch_reaches_path_listeners_only() {
        let dispatcher = ListenerDispatcher::new();
        let inbox = MailboxPath::inbox("alice");
        let trash = MailboxPath::for_user("alice", "Trash");
        let listener = Arc::new(CountingListener::default());
        dispatcher.subscribe(&inbox, listener.clone());

        dispatcher.dispatch(&added_event(&inbox));
        dispatcher.dispatch(&added_event(&trash));
        assert_eq!(listener.received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_is_by_identity() {
        let dispatcher = ListenerDispatcher::new();
        let inbox = MailboxPath::inbox("alice");
        let listener = Arc::new(CountingListener::default());
        dispatcher.subscribe(&inbox, listener.clone());
        dispatcher.subscribe(&inbox, listener.clone());
        assert_eq!(dispatcher.listener_count(&inbox), 1);

        let second = Arc::new(CountingListener::default());
        dispatcher.subscribe(&inbox, second);
        assert_eq!(dispatcher.listener_count(&inbox), 2);
    }

    #[test]
    fn test_closed_listeners_are_pruned() {
        let dispatcher = ListenerDispatcher::new();
        let inbox = MailboxPath::inbox("alice");
        let listener = Arc::new(CountingListener::default());
        dispatcher.subscribe(&inbox, listener.clone());

        listener.closed.store(true, Ordering::SeqCst);
        dispatcher.dispatch(&added_event(&inbox));
        assert_eq!(listener.received.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(&inbox), 0);
    }

    #[test]
    fn test_deletion_drops_subscriptions() {
        let dispatcher = ListenerDispatcher::new();
        let inbox = MailboxPath::inbox("alice");
        dispatcher.subscribe(&inbox, Arc::new(CountingListener::default()));

        dispatcher.dispatch(&MailboxEvent::new(inbox.clone(), EventPayload::MailboxDeleted));
        assert_eq!(dispatcher.listener_count(&inbox), 0);
    }

    #[test]
    fn test_rename_moves_subscriptions() {
        let dispatcher = ListenerDispatcher::new();
        let old_path = MailboxPath::for_user("alice", "Projects");
        let new_path = MailboxPath::for_user("alice", "Archive");
        let listener = Arc::new(CountingListener::default());
        dispatcher.subscribe(&old_path, listener.clone());

        dispatcher.dispatch(&MailboxEvent::new(
            old_path.clone(),
            EventPayload::MailboxRenamed {
                new_path: new_path.clone(),
            },
        ));
        // The rename itself was delivered at the old path.
        assert_eq!(listener.received.load(Ordering::SeqCst), 1);

        // Subsequent dispatches reach the listener at the new path only.
        dispatcher.dispatch(&added_event(&new_path));
        assert_eq!(listener.received.load(Ordering::SeqCst), 2);
        dispatcher.dispatch(&added_event(&old_path));
        assert_eq!(listener.received.load(Ordering::SeqCst), 2);
    }
}
