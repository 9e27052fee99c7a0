use crate::modules::error::code::ErrorCode;
use crate::modules::event::{EventPayload, MailboxEvent, MailboxListener};
use crate::modules::mailbox::MailboxPath;
use crate::modules::message::{FetchType, Flag, Flags, MessageRange};
use crate::modules::search::{Criterion, NumericRange, SearchQuery};
use crate::modules::testing::{raw_message, MockMailboxManager};
use crate::utc_now;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingListener {
    events: Mutex<Vec<MailboxEvent>>,
}

impl CollectingListener {
    fn payloads(&self) -> Vec<EventPayload> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }
}

impl MailboxListener for CollectingListener {
    fn handle(&self, event: &MailboxEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn test_basic_lifecycle() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox = MailboxPath::inbox("U1");
    let child = inbox.child("Test", manager.delimiter());

    assert!(!manager.mailbox_exists(&inbox, &session).unwrap());
    manager.create_mailbox(&inbox, &session).unwrap();
    assert!(manager.mailbox_exists(&inbox, &session).unwrap());

    let error = manager.create_mailbox(&inbox, &session).unwrap_err();
    assert_eq!(error.code(), ErrorCode::MailboxExists);

    manager.create_mailbox(&child, &session).unwrap();
    manager.delete_mailbox(&inbox, &session).unwrap();
    assert!(!manager.mailbox_exists(&inbox, &session).unwrap());
    // Deleting the parent does not cascade.
    assert!(manager.mailbox_exists(&child, &session).unwrap());
}

#[test]
fn test_concurrent_sessions_same_user() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let s1 = fixture.session("U1");
    let s2 = fixture.session("U1");
    let inbox = MailboxPath::inbox("U1");

    manager.create_mailbox(&inbox, &s1).unwrap();
    assert!(manager.mailbox_exists(&inbox, &s2).unwrap());

    let raw = raw_message("same bytes", "identical content");
    let m1 = manager.get_mailbox(&inbox, &s1).unwrap();
    let m2 = manager.get_mailbox(&inbox, &s2).unwrap();
    let uid1 = m1
        .append_message(&raw, utc_now!(), &s1, true, &Flags::new())
        .unwrap();
    let uid2 = m2
        .append_message(&raw, utc_now!(), &s2, true, &Flags::new())
        .unwrap();
    assert_ne!(uid1, uid2);
    assert!([1, 2].contains(&uid1));
    assert!([1, 2].contains(&uid2));
}

#[test]
fn test_subsequent_sessions_continue_uid_space() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let inbox = MailboxPath::inbox("U1");

    let s1 = fixture.session("U1");
    manager.create_mailbox(&inbox, &s1).unwrap();
    let m1 = manager.get_mailbox(&inbox, &s1).unwrap();
    let uid = m1
        .append_message(&raw_message("first", "body"), utc_now!(), &s1, true, &Flags::new())
        .unwrap();
    assert_eq!(uid, 1);
    manager.logout(&s1, false);

    let s2 = fixture.session("U1");
    let m2 = manager.get_mailbox(&inbox, &s2).unwrap();
    let metadata = m2.get_metadata(&s2).unwrap();
    assert_eq!(metadata.message_count, 1);
    assert_eq!(metadata.next_uid, 2);
    let uid = m2
        .append_message(&raw_message("second", "body"), utc_now!(), &s2, true, &Flags::new())
        .unwrap();
    assert_eq!(uid, 2);
}

#[test]
fn test_subfolder_without_parent_and_inbox_autocreation() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");

    manager
        .create_mailbox(&MailboxPath::for_user("U1", "Trash"), &session)
        .unwrap();
    let subfolder = MailboxPath::inbox("U1").child("testfolder", manager.delimiter());
    manager.create_mailbox(&subfolder, &session).unwrap();

    // INBOX itself was never created; appending autocreates it.
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    let uid = inbox
        .append_message(&raw_message("hello", "body"), utc_now!(), &session, true, &Flags::new())
        .unwrap();
    assert_eq!(uid, 1);
    assert!(manager
        .mailbox_exists(&MailboxPath::inbox("U1"), &session)
        .unwrap());
}

#[test]
fn test_search_by_uid_range() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    for index in 0..5 {
        inbox
            .append_message(
                &raw_message(&format!("message {}", index), "body"),
                utc_now!(),
                &session,
                true,
                &Flags::new(),
            )
            .unwrap();
    }
    let query = SearchQuery::of(Criterion::Uid(vec![NumericRange::new(2, 4)]));
    assert_eq!(inbox.search(&query, &session).unwrap(), vec![2, 3, 4]);
}

#[test]
fn test_flag_update_batch_shares_modseq() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let path = MailboxPath::inbox("U1");
    let listener = Arc::new(CollectingListener::default());
    manager
        .add_listener(&path, listener.clone(), &session)
        .unwrap();

    let inbox = manager.get_mailbox(&path, &session).unwrap();
    let mut modseqs = Vec::new();
    for index in 0..3 {
        inbox
            .append_message(
                &raw_message(&format!("message {}", index), "body"),
                utc_now!(),
                &session,
                true,
                &Flags::new(),
            )
            .unwrap();
        modseqs.push(inbox.get_metadata(&session).unwrap().highest_modseq);
    }
    assert!(modseqs.windows(2).all(|pair| pair[0] < pair[1]));

    let updated = inbox
        .set_flags(
            MessageRange::All,
            &Flags::new().with(Flag::Seen),
            true,
            true,
            &session,
        )
        .unwrap();
    assert_eq!(updated.len(), 3);
    let batch_modseq = updated[0].modseq;
    assert!(batch_modseq > *modseqs.last().unwrap());
    assert!(updated.iter().all(|entry| entry.modseq == batch_modseq));

    let flag_events: Vec<_> = listener
        .payloads()
        .into_iter()
        .filter_map(|payload| match payload {
            EventPayload::FlagsUpdated { updated } => Some(updated),
            _ => None,
        })
        .collect();
    assert_eq!(flag_events.len(), 3);
    assert!(flag_events.iter().all(|entry| entry.modseq == batch_modseq));
}

#[test]
fn test_expunge_returns_metadata_and_advances_counters() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    for index in 0..5 {
        inbox
            .append_message(
                &raw_message(&format!("message {}", index), "body"),
                utc_now!(),
                &session,
                true,
                &Flags::new(),
            )
            .unwrap();
    }
    for uid in [2, 4] {
        inbox
            .set_flags(
                MessageRange::One(uid),
                &Flags::new().with(Flag::Deleted),
                true,
                false,
                &session,
            )
            .unwrap();
    }

    let data = inbox.expunge(MessageRange::All, &session).unwrap();
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![2, 4]);
    assert_eq!(data[&2].uid, 2);
    assert!(data[&4].flags.contains(&Flag::Deleted));
    assert_eq!(inbox.get_metadata(&session).unwrap().message_count, 3);

    // Counters advance past the expunge: uid 6 is consumed by the expunge
    // itself, so the next append lands on 7.
    let uid = inbox
        .append_message(&raw_message("after", "body"), utc_now!(), &session, true, &Flags::new())
        .unwrap();
    assert_eq!(uid, 7);
}

#[test]
fn test_listener_follows_rename() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let old_path = MailboxPath::for_user("U1", "Projects");
    let new_path = MailboxPath::for_user("U1", "Archive");
    manager.create_mailbox(&old_path, &session).unwrap();

    let listener = Arc::new(CollectingListener::default());
    manager
        .add_listener(&old_path, listener.clone(), &session)
        .unwrap();
    manager
        .rename_mailbox(&old_path, &new_path, &session)
        .unwrap();

    // Events dispatched to the new path reach the listener.
    let mailbox = manager.get_mailbox(&new_path, &session).unwrap();
    mailbox
        .append_message(&raw_message("post-rename", "body"), utc_now!(), &session, true, &Flags::new())
        .unwrap();
    let payloads = listener.payloads();
    assert!(payloads
        .iter()
        .any(|payload| matches!(payload, EventPayload::MailboxRenamed { new_path: p } if *p == new_path)));
    assert!(payloads
        .iter()
        .any(|payload| matches!(payload, EventPayload::MessageAdded { .. })));

    // The old path no longer reaches it.
    let count_before = listener.payloads().len();
    manager.create_mailbox(&old_path, &session).unwrap();
    assert_eq!(listener.payloads().len(), count_before);
}

#[test]
fn test_rename_carries_children_and_uid_validity() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let parent = MailboxPath::for_user("U1", "Projects");
    let child = parent.child("rust", manager.delimiter());
    manager.create_mailbox(&parent, &session).unwrap();
    manager.create_mailbox(&child, &session).unwrap();
    let validity_before = manager
        .get_mailbox(&parent, &session)
        .unwrap()
        .mailbox()
        .uid_validity;

    let renamed = MailboxPath::for_user("U1", "Archive");
    manager.rename_mailbox(&parent, &renamed, &session).unwrap();

    assert!(!manager.mailbox_exists(&parent, &session).unwrap());
    assert!(manager.mailbox_exists(&renamed, &session).unwrap());
    let renamed_child = renamed.child("rust", manager.delimiter());
    assert!(manager.mailbox_exists(&renamed_child, &session).unwrap());
    assert_eq!(
        manager
            .get_mailbox(&renamed, &session)
            .unwrap()
            .mailbox()
            .uid_validity,
        validity_before
    );
}

#[test]
fn test_closed_session_is_rejected_everywhere() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox_path = MailboxPath::inbox("U1");
    let inbox = manager.get_mailbox(&inbox_path, &session).unwrap();
    manager.logout(&session, false);

    assert_eq!(
        manager
            .mailbox_exists(&inbox_path, &session)
            .unwrap_err()
            .code(),
        ErrorCode::SessionClosed
    );
    assert_eq!(
        inbox.get_metadata(&session).unwrap_err().code(),
        ErrorCode::SessionClosed
    );
    assert_eq!(
        inbox
            .append_message(&raw_message("late", "body"), utc_now!(), &session, true, &Flags::new())
            .unwrap_err()
            .code(),
        ErrorCode::SessionClosed
    );
}

#[test]
fn test_empty_user_is_bad_credentials() {
    let fixture = MockMailboxManager::empty();
    let error = fixture.manager.create_system_session("").unwrap_err();
    assert_eq!(error.code(), ErrorCode::BadCredentials);
}

#[test]
fn test_append_round_trip() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    let raw = raw_message("round trip", "the exact body bytes");
    let stamp = 1_700_000_000_000;
    let uid = inbox
        .append_message(&raw, stamp, &session, true, &Flags::new())
        .unwrap();

    let fetched = inbox
        .get_messages(MessageRange::One(uid), FetchType::Full, &session)
        .unwrap()
        .remove(0);
    assert_eq!(fetched.body, raw);
    assert_eq!(fetched.internal_date, stamp);
    assert_eq!(fetched.header_value("Subject"), Some("round trip"));
}

#[test]
fn test_copy_between_mailboxes_sets_recent() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let archive_path = MailboxPath::for_user("U1", "Archive");
    manager.create_mailbox(&archive_path, &session).unwrap();
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    let archive = manager.get_mailbox(&archive_path, &session).unwrap();

    inbox
        .append_message(
            &raw_message("to copy", "body"),
            utc_now!(),
            &session,
            false,
            &Flags::new().with(Flag::Seen),
        )
        .unwrap();
    let copies = inbox.copy_to(MessageRange::All, &archive, &session).unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].uid, 1);
    assert!(copies[0].flags.contains(&Flag::Recent));
    // Flags are preserved apart from Recent.
    assert!(copies[0].flags.contains(&Flag::Seen));
    assert_eq!(archive.get_metadata(&session).unwrap().message_count, 1);
}

#[test]
fn test_close_releases_recent_claim() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    let inbox = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &session)
        .unwrap();
    inbox
        .append_message(&raw_message("recent", "body"), utc_now!(), &session, true, &Flags::new())
        .unwrap();
    assert_eq!(inbox.get_metadata(&session).unwrap().recent, vec![1]);

    inbox.close(&session).unwrap();
    assert!(inbox.get_metadata(&session).unwrap().recent.is_empty());

    // A later session no longer observes the message as Recent.
    let next_session = fixture.session("U1");
    let reopened = manager
        .get_mailbox(&MailboxPath::inbox("U1"), &next_session)
        .unwrap();
    assert!(reopened.get_metadata(&next_session).unwrap().recent.is_empty());
}

#[test]
fn test_subscriptions() {
    let fixture = MockMailboxManager::empty();
    let manager = &fixture.manager;
    let session = fixture.session("U1");
    manager.subscribe(&session, "INBOX").unwrap();
    manager.subscribe(&session, "Trash").unwrap();
    manager.subscribe(&session, "INBOX").unwrap();
    assert_eq!(
        manager.subscriptions(&session).unwrap(),
        vec!["INBOX".to_string(), "Trash".to_string()]
    );
    manager.unsubscribe(&session, "Trash").unwrap();
    assert_eq!(
        manager.subscriptions(&session).unwrap(),
        vec!["INBOX".to_string()]
    );
}

#[test]
fn test_list_seeded_population() {
    let fixture = MockMailboxManager::seeded();
    let session = fixture.session("user1");
    let paths = fixture.manager.list(&session).unwrap();
    assert!(paths.contains(&MailboxPath::inbox("user1")));
    assert!(paths.contains(&MailboxPath::for_user("user1", "Trash")));
    assert!(paths.contains(&MailboxPath::inbox("user2")));
}
