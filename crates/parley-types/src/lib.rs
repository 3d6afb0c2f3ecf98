pub mod events;
pub mod models;

pub use events::DirectoryEvent;
pub use models::{
    CanonicalPair, Conversation, ConversationId, ConversationSummary, MessageId, Participant,
    ReadReceipt, UserId,
};
