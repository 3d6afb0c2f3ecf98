use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MessageId = i64;
pub type ConversationId = i64;

/// Unordered pair of distinct users, normalized so the lower id comes first.
/// Both orientations of the same two users produce an equal value.
/// Only [`CanonicalPair::new`] builds one, so it is serialize-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalPair {
    low: UserId,
    high: UserId,
}

impl CanonicalPair {
    /// Returns `None` when both ids name the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The member of the pair that is not `user`, if `user` is a member.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// Per-user bookkeeping inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub unread_count: u32,
    pub last_unread_id: Option<MessageId>,
    pub last_read_id: Option<MessageId>,
}

impl Participant {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            unread_count: 0,
            last_unread_id: None,
            last_read_id: None,
        }
    }
}

/// A messaging thread between exactly two users.
///
/// `user_one_id`/`user_two_id` record the storage slots. Counters and
/// markers are always resolved by user id through the accessors, never by
/// slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_one_id: UserId,
    pub user_two_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: [Participant; 2],
}

impl Conversation {
    /// A fresh conversation with zeroed counters. The lower id takes slot one.
    pub fn new(id: ConversationId, pair: CanonicalPair, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_one_id: pair.low(),
            user_two_id: pair.high(),
            created_at: now,
            updated_at: now,
            participants: [Participant::new(pair.low()), Participant::new(pair.high())],
        }
    }

    pub fn pair(&self) -> CanonicalPair {
        CanonicalPair {
            low: self.user_one_id.min(self.user_two_id),
            high: self.user_one_id.max(self.user_two_id),
        }
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.pair().contains(user)
    }

    pub fn participant(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user)
    }

    pub fn participant_mut(&mut self, user: UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user)
    }

    /// The participant record of whoever is talking to `user`.
    pub fn other_participant(&self, user: UserId) -> Option<&Participant> {
        if !self.has_participant(user) {
            return None;
        }
        self.participants.iter().find(|p| p.user_id != user)
    }

    pub fn other_user(&self, user: UserId) -> Option<UserId> {
        self.other_participant(user).map(|p| p.user_id)
    }

    pub fn unread_count(&self, user: UserId) -> Option<u32> {
        self.participant(user).map(|p| p.unread_count)
    }

    pub fn last_unread_id(&self, user: UserId) -> Option<Option<MessageId>> {
        self.participant(user).map(|p| p.last_unread_id)
    }

    pub fn last_read_id(&self, user: UserId) -> Option<Option<MessageId>> {
        self.participant(user).map(|p| p.last_read_id)
    }

    /// How `user` sees this conversation in their list.
    pub fn summary_for(&self, user: UserId) -> Option<ConversationSummary> {
        let me = self.participant(user)?;
        let other = self.other_participant(user)?;
        Some(ConversationSummary {
            conversation_id: self.id,
            other_user_id: other.user_id,
            unread_count: me.unread_count,
            last_read_id: me.last_read_id,
            other_user_last_read_id: other.last_read_id,
            updated_at: self.updated_at,
        })
    }
}

/// One user's view of a conversation, as shown in a conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub other_user_id: UserId,
    pub unread_count: u32,
    pub last_read_id: Option<MessageId>,
    /// Drives the "seen" indicator on the user's own messages.
    pub other_user_last_read_id: Option<MessageId>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a read acknowledgement, addressed to both participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub conversation_id: ConversationId,
    pub reader_id: UserId,
    pub other_user_id: UserId,
    pub reader_last_read: Option<MessageId>,
    pub other_user_last_read: Option<MessageId>,
}
