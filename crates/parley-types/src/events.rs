use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, MessageId, ReadReceipt, UserId};

/// Events published by the conversation directory after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DirectoryEvent {
    /// First exchange between two users opened a conversation
    ConversationCreated {
        conversation_id: ConversationId,
        user_one_id: UserId,
        user_two_id: UserId,
        created_at: DateTime<Utc>,
    },

    /// A message was counted as unread for the recipient
    MessageRegistered {
        conversation_id: ConversationId,
        sender_id: UserId,
        recipient_id: UserId,
        message_id: MessageId,
        recipient_unread: u32,
    },

    /// A participant acknowledged messages up to a marker
    MessagesRead(ReadReceipt),

    /// A user's conversations were removed along with the account
    ConversationsPurged { user_id: UserId, removed: usize },
}
