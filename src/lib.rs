pub mod modules;

pub use modules::backends::maildir::MaildirStore;
pub use modules::backends::nativedb::NativeDbStore;
pub use modules::backends::sqlite::SqliteStore;
pub use modules::error::{code::ErrorCode, MailStoreError, MailStoreResult};
pub use modules::index::MessageSearchIndex;
pub use modules::event::{dispatcher::ListenerDispatcher, EventPayload, MailboxEvent, MailboxListener};
pub use modules::mailbox::{Mailbox, MailboxAcl, MailboxId, MailboxPath};
pub use modules::manager::{MailboxMetaData, MessageManager, StoreMailboxManager};
pub use modules::mapper::{
    MailboxMapper, MessageMapper, SessionMapperFactory, SubscriptionMapper,
};
pub use modules::message::{
    FetchType, Flag, Flags, MailMessage, MessageHeader, MessageMetaData, MessageRange,
    Subscription, UpdatedFlags,
};
pub use modules::search::{Criterion, SearchQuery};
pub use modules::sequence::{SequenceRegistry, SequenceSource};
pub use modules::session::MailboxSession;
pub use modules::transaction::{TransactionState, TransactionalMapper};
