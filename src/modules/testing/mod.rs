//! Deterministic fixtures shared by the manager and backend tests.

use crate::modules::backends::nativedb::NativeDbStore;
use crate::modules::mailbox::MailboxPath;
use crate::modules::manager::StoreMailboxManager;
use crate::modules::message::Flags;
use crate::modules::session::MailboxSession;
use crate::utc_now;

pub const MOCK_USERS: [&str; 2] = ["user1", "user2"];
pub const MOCK_FOLDERS_PER_USER: usize = 3;
pub const MOCK_MESSAGES_PER_FOLDER: usize = 2;

pub fn raw_message(subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: sender@example.com\r\nTo: receiver@example.com\r\nSubject: {}\r\nDate: Mon, 3 Mar 2025 10:15:00 +0000\r\n\r\n{}\r\n",
        subject, body
    )
    .into_bytes()
}

/// Manager over the in-memory document backend, seeded with a fixed
/// population: for every mock user an INBOX, a Trash folder, and N
/// sub-folders carrying M messages each.
pub struct MockMailboxManager {
    pub manager: StoreMailboxManager<NativeDbStore>,
}

impl MockMailboxManager {
    pub fn empty() -> Self {
        let store = NativeDbStore::in_memory('.').expect("in-memory store");
        Self {
            manager: StoreMailboxManager::new(store),
        }
    }

    pub fn seeded() -> Self {
        let fixture = Self::empty();
        let delimiter = fixture.manager.delimiter();
        for user in MOCK_USERS {
            let session = fixture.session(user);
            let inbox = MailboxPath::inbox(user);
            fixture.manager.create_mailbox(&inbox, &session).unwrap();
            fixture
                .manager
                .create_mailbox(&MailboxPath::for_user(user, "Trash"), &session)
                .unwrap();
            for folder in 0..MOCK_FOLDERS_PER_USER {
                let path = inbox.child(&format!("folder{}", folder), delimiter);
                fixture.manager.create_mailbox(&path, &session).unwrap();
                let mailbox = fixture.manager.get_mailbox(&path, &session).unwrap();
                for index in 0..MOCK_MESSAGES_PER_FOLDER {
                    mailbox
                        .append_message(
                            &raw_message(
                                &format!("message {} in folder {}", index, folder),
                                "fixture body",
                            ),
                            utc_now!(),
                            &session,
                            true,
                            &Flags::new(),
                        )
                        .unwrap();
                }
            }
            fixture.manager.logout(&session, false);
        }
        fixture
    }

    pub fn session(&self, user: &str) -> MailboxSession {
        self.manager.create_system_session(user).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_population() {
        let fixture = MockMailboxManager::seeded();
        for user in MOCK_USERS {
            let session = fixture.session(user);
            let paths = fixture.manager.list(&session).unwrap();
            let user_paths: Vec<_> = paths.iter().filter(|path| path.user == user).collect();
            // INBOX + Trash + N folders
            assert_eq!(user_paths.len(), 2 + MOCK_FOLDERS_PER_USER);
        }
    }
}
