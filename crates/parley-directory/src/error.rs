use parley_types::{ConversationId, UserId};
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user {0} cannot start a conversation with themselves")]
    SameParticipant(UserId),

    /// Storage holds more than one conversation for a pair. Never resolved
    /// by picking one of them.
    #[error("data integrity: {count} conversations stored for users {user_a} and {user_b}")]
    DuplicateConversation {
        user_a: UserId,
        user_b: UserId,
        count: usize,
    },

    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    InvalidParticipant {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("conversation for users {0} and {1} conflicted on create and was not found on retry")]
    CreateConflict(UserId, UserId),

    #[error(transparent)]
    Store(anyhow::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(a, b) => Self::CreateConflict(a, b),
            StoreError::Backend(e) => Self::Store(e),
        }
    }
}
