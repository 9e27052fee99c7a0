use crate::modules::backends::maildir::{folder_key, info_flags, message_filename, MaildirStore};
use crate::modules::error::code::ErrorCode;
use crate::modules::mailbox::{Mailbox, MailboxPath};
use crate::modules::mapper::{MailboxMapper, MessageMapper, SessionMapperFactory, SubscriptionMapper};
use crate::modules::message::{FetchType, Flag, Flags, MailMessage, MessageRange, Subscription};
use crate::modules::session::MailboxSession;
use crate::modules::testing::raw_message;
use tempfile::TempDir;

fn store() -> (TempDir, MaildirStore) {
    let dir = TempDir::new().unwrap();
    let store = MaildirStore::open(dir.path(), '.').unwrap();
    (dir, store)
}

fn session() -> MailboxSession {
    MailboxSession::create("alice")
}

fn create_mailbox(store: &MaildirStore, session: &MailboxSession, name: &str) -> Mailbox<String> {
    let mapper = store.create_mailbox_mapper(session).unwrap();
    let mut mailbox = Mailbox::new(MailboxPath::for_user("alice", name), 7);
    mapper.save(&mut mailbox).unwrap();
    mailbox
}

#[test]
fn test_folder_key_layout() {
    let inbox = MailboxPath::inbox("alice");
    assert_eq!(folder_key(&inbox, '.'), "alice");
    let nested = MailboxPath::for_user("alice", "INBOX.work.rust");
    assert_eq!(folder_key(&nested, '.'), "alice/.INBOX.work.rust");
}

#[test]
fn test_filename_flags_round_trip() {
    let flags = Flags::new().with(Flag::Seen).with(Flag::Flagged);
    let filename = message_filename(12, 1_700_000_000_000, &flags);
    assert!(filename.ends_with(":2,FS"));
    assert_eq!(info_flags(&filename), flags);
}

#[test]
fn test_append_lands_in_new_until_flags_change() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();

    let raw = raw_message("maildir", "delivered body");
    let metadata = mapper
        .add(
            &mailbox,
            MailMessage::from_raw(
                mailbox.stored_id().unwrap(),
                &raw,
                1_700_000_000_000,
                Flags::new().with(Flag::Recent),
            ),
        )
        .unwrap();
    assert_eq!(metadata.uid, 1);
    assert_eq!(mapper.find_recent_uids(&mailbox).unwrap(), vec![1]);

    // Clearing Recent moves the file from new/ to cur/.
    mapper
        .update_flags(
            &mailbox,
            &Flags::new().with(Flag::Recent),
            false,
            false,
            MessageRange::All,
        )
        .unwrap();
    assert!(mapper.find_recent_uids(&mailbox).unwrap().is_empty());

    let fetched = mapper
        .find_in_mailbox(&mailbox, MessageRange::One(1), FetchType::Full, None)
        .unwrap()
        .remove(0);
    assert_eq!(fetched.body, raw);
}

#[test]
fn test_flags_and_keywords_survive_reload() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();
    mapper
        .add(
            &mailbox,
            MailMessage::from_raw(
                mailbox.stored_id().unwrap(),
                &raw_message("keywords", "body"),
                0,
                Flags::new(),
            ),
        )
        .unwrap();
    mapper
        .update_flags(
            &mailbox,
            &Flags::new()
                .with(Flag::Seen)
                .with(Flag::Custom("$Label".into())),
            true,
            false,
            MessageRange::All,
        )
        .unwrap();

    // A fresh mapper re-reads everything from disk.
    let reloaded = store.create_message_mapper(&session).unwrap();
    let fetched = reloaded
        .find_in_mailbox(&mailbox, MessageRange::One(1), FetchType::Metadata, None)
        .unwrap()
        .remove(0);
    assert!(fetched.flags.contains(&Flag::Seen));
    assert!(fetched.flags.contains(&Flag::Custom("$Label".into())));
    assert_eq!(reloaded.count_unseen(&mailbox).unwrap(), 0);
}

#[test]
fn test_expunge_removes_files() {
    let (_dir, store) = store();
    let session = session();
    let mailbox = create_mailbox(&store, &session, "INBOX");
    let mapper = store.create_message_mapper(&session).unwrap();
    for index in 0..3 {
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
    mapper
        .update_flags(
            &mailbox,
            &Flags::new().with(Flag::Deleted),
            true,
            false,
            MessageRange::One(2),
        )
        .unwrap();

    let data = mapper
        .expunge_marked_for_deletion(&mailbox, MessageRange::All)
        .unwrap();
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(mapper.count_messages(&mailbox).unwrap(), 2);
}

#[test]
fn test_sequences_persist_in_uidlist_across_stores() {
    let dir = TempDir::new().unwrap();
    {
        let store = MaildirStore::open(dir.path(), '.').unwrap();
        let session = session();
        let mailbox = create_mailbox(&store, &session, "INBOX");
        let mapper = store.create_message_mapper(&session).unwrap();
        for index in 0..2 {
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
    }

    // A new store (fresh registry, as after a restart) continues the uid
    // space instead of reusing uids.
    let store = MaildirStore::open(dir.path(), '.').unwrap();
    let session = session();
    let mapper_factory = &store;
    let mailbox_mapper = mapper_factory.create_mailbox_mapper(&session).unwrap();
    let mailbox = mailbox_mapper
        .find_by_path(&MailboxPath::inbox("alice"))
        .unwrap()
        .unwrap();
    assert_eq!(mailbox.last_known_uid, 2);
    assert_eq!(mailbox.uid_validity, 7);

    let mapper = store.create_message_mapper(&session).unwrap();
    let metadata = mapper
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
fn test_inbox_delete_keeps_subfolders() {
    let (_dir, store) = store();
    let session = session();
    let inbox = create_mailbox(&store, &session, "INBOX");
    let sub = create_mailbox(&store, &session, "INBOX.keep");

    let mapper = store.create_mailbox_mapper(&session).unwrap();
    mapper.delete(&inbox).unwrap();
    assert!(mapper.find_by_path(&MailboxPath::inbox("alice")).unwrap().is_none());
    assert!(mapper.find_by_path(&sub.path).unwrap().is_some());
}

#[test]
fn test_rename_moves_directory() {
    let (_dir, store) = store();
    let session = session();
    let mut mailbox = create_mailbox(&store, &session, "Projects");
    let mapper = store.create_mailbox_mapper(&session).unwrap();

    mailbox.path = MailboxPath::for_user("alice", "Archive");
    mapper.save(&mut mailbox).unwrap();
    assert_eq!(mailbox.id.as_deref(), Some("alice/.Archive"));

    let renamed = mapper
        .find_by_path(&MailboxPath::for_user("alice", "Archive"))
        .unwrap()
        .unwrap();
    assert_eq!(renamed.uid_validity, 7);
    assert!(mapper
        .find_by_path(&MailboxPath::for_user("alice", "Projects"))
        .unwrap()
        .is_none());
}

#[test]
fn test_create_collision() {
    let (_dir, store) = store();
    let session = session();
    create_mailbox(&store, &session, "Trash");
    let mapper = store.create_mailbox_mapper(&session).unwrap();
    let mut duplicate = Mailbox::new(MailboxPath::for_user("alice", "Trash"), 9);
    assert_eq!(
        mapper.save(&mut duplicate).unwrap_err().code(),
        ErrorCode::MailboxExists
    );
}

#[test]
fn test_subscription_file_round_trip() {
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
    assert!(mapper.is_subscribed("alice", "INBOX").unwrap());
}
