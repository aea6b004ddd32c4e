//! Persistence seam
//!
//! Services talk to storage only through these traits. `PgStore` is the
//! production backend; `MemoryStore` serves tests and database-less
//! development runs. Implementations must make each single-record write
//! atomic; nothing here spans records transactionally.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::messaging::{Conversation, Message};
use crate::models::{Page, User};
use crate::trade::{Trade, TradeFilter, TradeSearch};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("{0} already exists")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("record").to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the subject already has a record.
    async fn insert_user(&self, user: User) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>>;

    /// Users among `ids`, in no particular order. Unknown ids are skipped.
    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>>;

    async fn save_user(&self, user: &User) -> StoreResult<()>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_trade(&self, trade: Trade) -> StoreResult<Trade>;

    async fn find_trade(&self, id: Uuid) -> StoreResult<Option<Trade>>;

    /// Whole-record write; concurrent saves are last-write-wins. The view
    /// counter is owned by `increment_views` and is left untouched.
    async fn save_trade(&self, trade: &Trade) -> StoreResult<()>;

    /// Returns whether a record was removed.
    async fn delete_trade(&self, id: Uuid) -> StoreResult<bool>;

    async fn increment_views(&self, id: Uuid) -> StoreResult<()>;

    /// Newest first, with the total number of matches.
    async fn list_trades(&self, filter: &TradeFilter, page: Page) -> StoreResult<(Vec<Trade>, i64)>;

    /// Text/category/radius search. Results are ordered by distance when a
    /// point is given, newest first otherwise.
    async fn search_trades(&self, search: &TradeSearch) -> StoreResult<Vec<Trade>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fails with `Conflict` when a conversation for the same participant
    /// pair and trade already exists.
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Lookup by unordered participant pair and trade.
    async fn find_conversation_between(
        &self,
        first: Uuid,
        second: Uuid,
        trade_id: Uuid,
    ) -> StoreResult<Option<Conversation>>;

    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()>;

    /// Conversations the user participates in, most recently updated first.
    async fn list_conversations_for(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: Message) -> StoreResult<Message>;

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// Oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Adds `reader` to `readBy` of every message in the conversation not
    /// sent by them. Returns the number of messages changed.
    async fn mark_messages_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<u64>;

    async fn delete_message(&self, id: Uuid) -> StoreResult<bool>;
}

/// Everything the services need from storage
#[async_trait]
pub trait Repository: UserStore + TradeStore + ConversationStore + MessageStore {
    /// Connectivity check for /health
    async fn ping(&self) -> StoreResult<()>;
}
