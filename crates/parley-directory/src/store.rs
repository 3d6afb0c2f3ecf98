mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use parley_types::{CanonicalPair, Conversation, ConversationId, MessageId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The pair already has a conversation; the insert was rejected.
    #[error("a conversation already exists for users {0} and {1}")]
    Conflict(UserId, UserId),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence for conversation records.
///
/// Implementations must enforce uniqueness on the unordered pair and apply
/// each update as one atomic read-modify-write.
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation with zeroed counters, or fail with
    /// [`StoreError::Conflict`] if the pair already has one.
    fn insert(&self, pair: CanonicalPair, now: DateTime<Utc>) -> StoreResult<Conversation>;

    fn get(&self, id: ConversationId) -> StoreResult<Option<Conversation>>;

    /// Conversations whose stored pair equals `{user_a, user_b}` in either
    /// slot orientation. Returns at most two so duplicates can be detected.
    fn find_by_pair(&self, user_a: UserId, user_b: UserId) -> StoreResult<Vec<Conversation>>;

    /// Most recently updated first.
    fn list_for_user(&self, user: UserId) -> StoreResult<Vec<Conversation>>;

    /// Increment `recipient`'s unread count and set their last-unread marker.
    /// `None` if the conversation or participant no longer exists.
    fn record_message(
        &self,
        id: ConversationId,
        recipient: UserId,
        message_id: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>>;

    /// Zero `reader`'s unread count and set their last-read marker.
    /// `None` if the conversation or participant no longer exists.
    fn record_read(
        &self,
        id: ConversationId,
        reader: UserId,
        up_to: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>>;

    /// Delete every conversation involving `user`. Returns how many went.
    fn delete_for_user(&self, user: UserId) -> StoreResult<usize>;
}
