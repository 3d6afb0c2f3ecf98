use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use parley_types::{CanonicalPair, Conversation, ConversationId, MessageId, UserId};

use super::{ConversationStore, StoreError, StoreResult};

/// In-process [`ConversationStore`]. Same pair uniqueness as the SQLite
/// store; one mutex makes every operation atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: ConversationId,
    conversations: BTreeMap<ConversationId, Conversation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Memory store lock poisoned: {}", e)))
    }

    /// Store a record without the uniqueness check, for reproducing
    /// corrupted storage in tests.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, conversation: Conversation) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = inner.next_id.max(conversation.id);
        inner.conversations.insert(conversation.id, conversation);
    }
}

impl ConversationStore for MemoryStore {
    fn insert(&self, pair: CanonicalPair, now: DateTime<Utc>) -> StoreResult<Conversation> {
        let mut inner = self.lock()?;
        if inner.conversations.values().any(|c| c.pair() == pair) {
            return Err(StoreError::Conflict(pair.low(), pair.high()));
        }

        inner.next_id += 1;
        let conversation = Conversation::new(inner.next_id, pair, now);
        inner.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    fn get(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.lock()?.conversations.get(&id).cloned())
    }

    fn find_by_pair(&self, user_a: UserId, user_b: UserId) -> StoreResult<Vec<Conversation>> {
        let inner = self.lock()?;
        Ok(inner
            .conversations
            .values()
            .filter(|c| {
                (c.user_one_id == user_a && c.user_two_id == user_b)
                    || (c.user_one_id == user_b && c.user_two_id == user_a)
            })
            .take(2)
            .cloned()
            .collect())
    }

    fn list_for_user(&self, user: UserId) -> StoreResult<Vec<Conversation>> {
        let inner = self.lock()?;
        let mut found: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.has_participant(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    fn record_message(
        &self,
        id: ConversationId,
        recipient: UserId,
        message_id: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>> {
        let mut inner = self.lock()?;
        let Some(conversation) = inner.conversations.get_mut(&id) else {
            return Ok(None);
        };
        let Some(participant) = conversation.participant_mut(recipient) else {
            return Ok(None);
        };

        participant.unread_count = participant.unread_count.saturating_add(1);
        participant.last_unread_id = Some(message_id);
        conversation.updated_at = now;
        Ok(Some(conversation.clone()))
    }

    fn record_read(
        &self,
        id: ConversationId,
        reader: UserId,
        up_to: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>> {
        let mut inner = self.lock()?;
        let Some(conversation) = inner.conversations.get_mut(&id) else {
            return Ok(None);
        };
        let Some(participant) = conversation.participant_mut(reader) else {
            return Ok(None);
        };

        participant.unread_count = 0;
        participant.last_read_id = Some(up_to);
        conversation.updated_at = now;
        Ok(Some(conversation.clone()))
    }

    fn delete_for_user(&self, user: UserId) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let before = inner.conversations.len();
        inner.conversations.retain(|_, c| !c.has_participant(user));
        Ok(before - inner.conversations.len())
    }
}
