use crate::modules::backends::sqlite::SqliteStore;
use crate::modules::error::code::ErrorCode;
use crate::modules::mailbox::{Mailbox, MailboxPath};
use crate::modules::mapper::{MailboxMapper, MessageMapper, SessionMapperFactory, SubscriptionMapper};
use crate::modules::message::{FetchType, Flag, Flags, MailMessage, MessageRange, Subscription};
use crate::modules::session::MailboxSession;
use crate::modules::testing::raw_message;
use crate::modules::transaction::TransactionalMapper;
use tempfile::TempDir;

fn store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("mailstore.db"), '.').unwrap();
    (dir, store)
}

fn session() -> MailboxSession {
    MailboxSession::create("alice")
}

fn create_mailbox(store: &SqliteStore, session: &MailboxSession, name: &str) -> Mailbox<i64> {
    let mapper = store.create_mailbox_mapper(session).unwrap();
    let mut mailbox = Mailbox::new(MailboxPath::for_user("alice", name), 31337);
    mapper.save(&mut mailbox).unwrap();
    mailbox
}

#[test]
fn test_mailbox_rowid_assignment() {
    let (_dir, store) = store();
    let session = session();
    let inbox = create_mailbox(&store, &session, "INBOX");
    let trash = create_mailbox(&store, &session, "Trash");
    assert!(inbox.id.is_some());
    assert!(trash.id.is_some());
    assert_ne!(inbox.id, trash.id);

    let mapper = store.create_mailbox_mapper(&session).unwrap();
    let found = mapper.find_by_path(&inbox.path).unwrap().unwrap();
    assert_eq!(found.id, inbox.id);
    assert_eq!(found.uid_validity, 31337);

    let mut duplicate = Mailbox::new(inbox.path.clone(), 1);
    assert_eq!(
        mapper.save(&mut duplicate).unwrap_err().code(),
        ErrorCode::MailboxExists
    );
}

#[test]
fn test_message_round_trip_and_counts() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();

    let raw = raw_message("relational", "row body");
    let metadata = mapper
        .add(
            &mailbox,
            MailMessage::from_raw(
                mailbox.stored_id().unwrap(),
                &raw,
                1_650_000_000_000,
                Flags::new().with(Flag::Recent),
            ),
        )
        .unwrap();
    assert_eq!(metadata.uid, 1);

    let fetched = mapper
        .find_in_mailbox(&mailbox, MessageRange::One(1), FetchType::Full, None)
        .unwrap()
        .remove(0);
    assert_eq!(fetched.body, raw);
    assert_eq!(fetched.header_value("Subject"), Some("relational"));
    assert_eq!(mapper.count_messages(&mailbox).unwrap(), 1);
    assert_eq!(mapper.count_unseen(&mailbox).unwrap(), 1);
    assert_eq!(mapper.find_recent_uids(&mailbox).unwrap(), vec![1]);
    assert_eq!(mapper.find_first_unseen_uid(&mailbox).unwrap(), Some(1));

    // Metadata fetches skip the stored content.
    let light = mapper
        .find_in_mailbox(&mailbox, MessageRange::One(1), FetchType::Metadata, None)
        .unwrap()
        .remove(0);
    assert!(light.body.is_empty());
    assert!(light.headers.is_empty());
    assert_eq!(light.size, raw.len() as u64);
}

#[test]
fn test_update_flags_and_expunge() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();
    for index in 0..4 {
        mapper
            .add(
                &mailbox,
                MailMessage::from_raw(
                    mailbox.stored_id().unwrap(),
                    &raw_message(&format!("message {}", index), "body"),
                    0,
                    Flags::new(),
                ),
            )
            .unwrap();
    }

    let updated = mapper
        .update_flags(
            &mailbox,
            &Flags::new().with(Flag::Deleted),
            true,
            false,
            MessageRange::Range(2, 3),
        )
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].modseq, updated[1].modseq);

    let data = mapper
        .expunge_marked_for_deletion(&mailbox, MessageRange::All)
        .unwrap();
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(mapper.count_messages(&mailbox).unwrap(), 2);
}

#[test]
fn test_sql_transaction_rollback() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();

    let result: crate::modules::error::MailStoreResult<()> = mapper.execute(|| {
        let message = MailMessage {
            mailbox_id: mailbox.stored_id().unwrap(),
            uid: 99,
            modseq: 1,
            internal_date: 0,
            size: 4,
            flags: Flags::new(),
            headers: Vec::new(),
            body: b"body".to_vec(),
        };
        mapper.save(&mailbox, &message)?;
        Err(crate::raise_error!(
            "forced failure".into(),
            ErrorCode::StorageError
        ))
    });
    assert!(result.is_err());
    assert_eq!(mapper.count_messages(&mailbox).unwrap(), 0);
}

#[test]
fn test_sequences_persist_across_stores() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mailstore.db");
    let mailbox_path = MailboxPath::inbox("alice");
    {
        let store = SqliteStore::open(&path, '.').unwrap();
        let session = session();
        let mapper = store.create_mailbox_mapper(&session).unwrap();
        let mut mailbox = Mailbox::new(mailbox_path.clone(), 1);
        mapper.save(&mut mailbox).unwrap();
        let messages = store.create_message_mapper(&session).unwrap();
        for index in 0..2 {
            messages
                .add(
                    &mailbox,
                    MailMessage::from_raw(
                        mailbox.stored_id().unwrap(),
                        &raw_message(&format!("message {}", index), "body"),
                        0,
                        Flags::new(),
                    ),
                )
                .unwrap();
        }
    }

    let store = SqliteStore::open(&path, '.').unwrap();
    let session = session();
    let mapper = store.create_mailbox_mapper(&session).unwrap();
    let mailbox = mapper.find_by_path(&mailbox_path).unwrap().unwrap();
    assert_eq!(mailbox.last_known_uid, 2);
    assert_eq!(mailbox.highest_known_modseq, 2);

    let messages = store.create_message_mapper(&session).unwrap();
    let metadata = messages
        .add(
            &mailbox,
            MailMessage::from_raw(
                mailbox.stored_id().unwrap(),
                &raw_message("after restart", "body"),
                0,
                Flags::new(),
            ),
        )
        .unwrap();
    assert_eq!(metadata.uid, 3);
}

#[test]
fn test_subscription_table() {
    let (_dir, store) = store();
    let session = session();
    let mapper = store.create_subscription_mapper(&session).unwrap();
    mapper
        .save(&Subscription {
            user: "alice".into(),
            mailbox: "INBOX".into(),
        })
        .unwrap();
    mapper
        .save(&Subscription {
            user: "alice".into(),
            mailbox: "INBOX".into(),
        })
        .unwrap();
    assert_eq!(mapper.find_subscriptions_for_user("alice").unwrap().len(), 1);
    mapper
        .delete(&Subscription {
            user: "alice".into(),
            mailbox: "INBOX".into(),
        })
        .unwrap();
    assert!(!mapper.is_subscribed("alice", "INBOX").unwrap());
}
