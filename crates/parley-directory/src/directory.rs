use chrono::Utc;
use parley_types::{
    CanonicalPair, Conversation, ConversationId, ConversationSummary, DirectoryEvent, MessageId,
    ReadReceipt, UserId,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_EVENT_CAPACITY, DirectoryConfig};
use crate::error::{DirectoryError, Result};
use crate::store::{ConversationStore, SqliteStore, StoreError};

/// Owns conversation records through a [`ConversationStore`] and keeps the
/// per-participant counters consistent. Holds no conversation state itself.
pub struct ConversationDirectory<S> {
    store: S,
    events: broadcast::Sender<DirectoryEvent>,
}

impl ConversationDirectory<SqliteStore> {
    /// Open the SQLite database named by `config` and build a directory on it.
    pub fn open(config: &DirectoryConfig) -> anyhow::Result<Self> {
        let store = SqliteStore::open(&config.db_path, config.reader_pool_size)?;
        Ok(Self::with_event_capacity(store, config.event_capacity))
    }
}

impl<S: ConversationStore> ConversationDirectory<S> {
    pub fn new(store: S) -> Self {
        Self::with_event_capacity(store, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(store: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { store, events }
    }

    /// Subscribe to events for every successful write.
    ///
    /// Events are sent after the store commits, so writes racing on the same
    /// conversation may be observed out of order. `recipient_unread` and the
    /// receipt markers are snapshots; re-read the conversation when exact
    /// current state matters.
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: DirectoryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Look up the conversation between two users, in either order.
    /// `Ok(None)` when they have never talked, including `user_a == user_b`.
    pub fn find(&self, user_a: UserId, user_b: UserId) -> Result<Option<Conversation>> {
        if user_a == user_b {
            return Ok(None);
        }

        let mut found = self.store.find_by_pair(user_a, user_b)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => {
                error!(
                    user_a,
                    user_b, count, "Multiple conversations stored for one user pair"
                );
                Err(DirectoryError::DuplicateConversation {
                    user_a,
                    user_b,
                    count,
                })
            }
        }
    }

    pub fn get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        Ok(self.store.get(id)?)
    }

    /// Return the pair's conversation, creating it on first contact.
    ///
    /// A concurrent creator winning the insert race shows up as a store
    /// conflict; the lookup is then retried once and the winner's record
    /// returned.
    pub fn get_or_create(&self, user_a: UserId, user_b: UserId) -> Result<Conversation> {
        let pair =
            CanonicalPair::new(user_a, user_b).ok_or(DirectoryError::SameParticipant(user_a))?;

        if let Some(existing) = self.find(user_a, user_b)? {
            return Ok(existing);
        }

        match self.store.insert(pair, Utc::now()) {
            Ok(created) => {
                info!(
                    conversation_id = created.id,
                    user_one_id = created.user_one_id,
                    user_two_id = created.user_two_id,
                    "Conversation created"
                );
                self.publish(DirectoryEvent::ConversationCreated {
                    conversation_id: created.id,
                    user_one_id: created.user_one_id,
                    user_two_id: created.user_two_id,
                    created_at: created.created_at,
                });
                Ok(created)
            }
            Err(StoreError::Conflict(low, high)) => {
                warn!(low, high, "Conversation created concurrently, retrying lookup");
                self.find(user_a, user_b)?
                    .ok_or(DirectoryError::CreateConflict(low, high))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count `message_id` as unread for whoever did not send it.
    /// The sender's own counters are left alone.
    pub fn register_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        message_id: MessageId,
    ) -> Result<Conversation> {
        let conversation = self.require(conversation_id)?;
        let recipient_id = conversation
            .other_user(sender_id)
            .ok_or(DirectoryError::InvalidParticipant {
                conversation_id,
                user_id: sender_id,
            })?;

        let updated = self
            .store
            .record_message(conversation_id, recipient_id, message_id, Utc::now())?
            .ok_or(DirectoryError::ConversationNotFound(conversation_id))?;

        let recipient_unread = updated.unread_count(recipient_id).unwrap_or_default();
        debug!(
            conversation_id,
            sender_id, recipient_id, message_id, recipient_unread, "Message registered"
        );
        self.publish(DirectoryEvent::MessageRegistered {
            conversation_id,
            sender_id,
            recipient_id,
            message_id,
            recipient_unread,
        });
        Ok(updated)
    }

    /// Acknowledge everything up to `up_to` for `user_id`: their unread count
    /// drops to zero and their read marker moves to `up_to`.
    ///
    /// Repeating an acknowledgement that is already in effect writes nothing
    /// and leaves `updated_at` untouched.
    pub fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        up_to: MessageId,
    ) -> Result<ReadReceipt> {
        let conversation = self.require(conversation_id)?;
        let reader = conversation
            .participant(user_id)
            .ok_or(DirectoryError::InvalidParticipant {
                conversation_id,
                user_id,
            })?;

        if reader.unread_count == 0 && reader.last_read_id == Some(up_to) {
            debug!(conversation_id, user_id, up_to, "Read marker already current");
            return receipt(&conversation, user_id);
        }

        let updated = self
            .store
            .record_read(conversation_id, user_id, up_to, Utc::now())?
            .ok_or(DirectoryError::ConversationNotFound(conversation_id))?;

        let receipt = receipt(&updated, user_id)?;
        self.publish(DirectoryEvent::MessagesRead(receipt.clone()));
        Ok(receipt)
    }

    /// The user's conversation list, most recently active first.
    pub fn conversations_for(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        let conversations = self.store.list_for_user(user_id)?;
        Ok(conversations
            .iter()
            .filter_map(|c| c.summary_for(user_id))
            .collect())
    }

    /// Unread messages across all of the user's conversations.
    pub fn total_unread(&self, user_id: UserId) -> Result<u64> {
        let conversations = self.store.list_for_user(user_id)?;
        Ok(conversations
            .iter()
            .filter_map(|c| c.unread_count(user_id))
            .map(u64::from)
            .sum())
    }

    /// Hard-delete every conversation of a user whose account is going away.
    /// Publishes nothing when the user had no conversations.
    pub fn remove_user(&self, user_id: UserId) -> Result<usize> {
        let removed = self.store.delete_for_user(user_id)?;
        if removed == 0 {
            debug!(user_id, "No conversations to remove for deleted user");
            return Ok(0);
        }

        info!(user_id, removed, "Removed conversations for deleted user");
        self.publish(DirectoryEvent::ConversationsPurged { user_id, removed });
        Ok(removed)
    }

    fn require(&self, id: ConversationId) -> Result<Conversation> {
        self.store
            .get(id)?
            .ok_or(DirectoryError::ConversationNotFound(id))
    }
}

fn receipt(conversation: &Conversation, reader_id: UserId) -> Result<ReadReceipt> {
    let invalid = || DirectoryError::InvalidParticipant {
        conversation_id: conversation.id,
        user_id: reader_id,
    };
    let reader = conversation.participant(reader_id).ok_or_else(invalid)?;
    let other = conversation.other_participant(reader_id).ok_or_else(invalid)?;

    Ok(ReadReceipt {
        conversation_id: conversation.id,
        reader_id,
        other_user_id: other.user_id,
        reader_last_read: reader.last_read_id,
        other_user_last_read: other.last_read_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn directory() -> ConversationDirectory<MemoryStore> {
        ConversationDirectory::new(MemoryStore::new())
    }

    /// Hides the pair from the first `hidden_lookups` calls to
    /// `find_by_pair`, so `insert` runs against a row another caller already
    /// committed.
    struct LateWriter {
        inner: MemoryStore,
        hidden_lookups: AtomicUsize,
    }

    impl LateWriter {
        fn new(inner: MemoryStore, hidden_lookups: usize) -> Self {
            Self {
                inner,
                hidden_lookups: AtomicUsize::new(hidden_lookups),
            }
        }
    }

    impl ConversationStore for LateWriter {
        fn insert(&self, pair: CanonicalPair, now: DateTime<Utc>) -> StoreResult<Conversation> {
            self.inner.insert(pair, now)
        }

        fn get(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
            self.inner.get(id)
        }

        fn find_by_pair(&self, user_a: UserId, user_b: UserId) -> StoreResult<Vec<Conversation>> {
            let hide = self
                .hidden_lookups
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hide {
                return Ok(Vec::new());
            }
            self.inner.find_by_pair(user_a, user_b)
        }

        fn list_for_user(&self, user: UserId) -> StoreResult<Vec<Conversation>> {
            self.inner.list_for_user(user)
        }

        fn record_message(
            &self,
            id: ConversationId,
            recipient: UserId,
            message_id: MessageId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Conversation>> {
            self.inner.record_message(id, recipient, message_id, now)
        }

        fn record_read(
            &self,
            id: ConversationId,
            reader: UserId,
            up_to: MessageId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Conversation>> {
            self.inner.record_read(id, reader, up_to, now)
        }

        fn delete_for_user(&self, user: UserId) -> StoreResult<usize> {
            self.inner.delete_for_user(user)
        }
    }

    fn store_with_pair(a: UserId, b: UserId) -> (MemoryStore, Conversation) {
        let store = MemoryStore::new();
        let existing = store
            .insert(CanonicalPair::new(a, b).unwrap(), Utc::now())
            .unwrap();
        (store, existing)
    }

    #[test]
    fn create_conflict_falls_back_to_existing_record() {
        let (store, existing) = store_with_pair(7, 42);
        let dir = ConversationDirectory::new(LateWriter::new(store, 1));
        let mut events = dir.subscribe();

        let conv = dir.get_or_create(42, 7).unwrap();
        assert_eq!(conv, existing);
        assert_eq!(dir.conversations_for(7).unwrap().len(), 1);
        // The losing creator announces nothing.
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn create_conflict_with_empty_retry_is_an_error() {
        let (store, _) = store_with_pair(7, 42);
        let dir = ConversationDirectory::new(LateWriter::new(store, 2));

        assert!(matches!(
            dir.get_or_create(7, 42),
            Err(DirectoryError::CreateConflict(7, 42))
        ));
    }

    #[test]
    fn find_is_symmetric() {
        let dir = directory();
        assert!(dir.find(7, 42).unwrap().is_none());

        let created = dir.get_or_create(42, 7).unwrap();
        assert_eq!(dir.find(7, 42).unwrap(), Some(created.clone()));
        assert_eq!(dir.find(42, 7).unwrap(), Some(created));
    }

    #[test]
    fn self_conversation_is_rejected() {
        let dir = directory();
        assert!(matches!(
            dir.get_or_create(5, 5),
            Err(DirectoryError::SameParticipant(5))
        ));
        assert!(dir.find(5, 5).unwrap().is_none());
    }

    #[test]
    fn get_or_create_returns_existing() {
        let dir = directory();
        let first = dir.get_or_create(1, 2).unwrap();
        let second = dir.get_or_create(2, 1).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn duplicates_are_reported_not_resolved() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_unchecked(Conversation::new(1, CanonicalPair::new(1, 2).unwrap(), now));
        let mut reversed = Conversation::new(2, CanonicalPair::new(1, 2).unwrap(), now);
        reversed.user_one_id = 2;
        reversed.user_two_id = 1;
        store.insert_unchecked(reversed);

        let dir = ConversationDirectory::new(store);
        match dir.find(2, 1) {
            Err(DirectoryError::DuplicateConversation { count: 2, .. }) => {}
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert!(dir.get_or_create(1, 2).is_err());
    }

    #[test]
    fn register_message_counts_for_recipient_only() {
        let dir = directory();
        let conv = dir.get_or_create(7, 42).unwrap();

        let updated = dir.register_message(conv.id, 7, 101).unwrap();
        assert_eq!(updated.unread_count(42), Some(1));
        assert_eq!(updated.last_unread_id(42), Some(Some(101)));
        assert_eq!(updated.unread_count(7), Some(0));
        assert_eq!(updated.last_unread_id(7), Some(None));
        assert!(updated.updated_at >= conv.updated_at);
    }

    #[test]
    fn outsiders_are_invalid_participants() {
        let dir = directory();
        let conv = dir.get_or_create(7, 42).unwrap();

        assert!(matches!(
            dir.register_message(conv.id, 99, 1),
            Err(DirectoryError::InvalidParticipant { user_id: 99, .. })
        ));
        assert!(matches!(
            dir.mark_read(conv.id, 99, 1),
            Err(DirectoryError::InvalidParticipant { user_id: 99, .. })
        ));
        assert_eq!(dir.get(conv.id).unwrap(), Some(conv));
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let dir = directory();
        assert!(matches!(
            dir.register_message(404, 1, 1),
            Err(DirectoryError::ConversationNotFound(404))
        ));
        assert!(matches!(
            dir.mark_read(404, 1, 1),
            Err(DirectoryError::ConversationNotFound(404))
        ));
    }

    #[test]
    fn repeated_mark_read_changes_nothing() {
        let dir = directory();
        let conv = dir.get_or_create(7, 42).unwrap();
        dir.register_message(conv.id, 7, 101).unwrap();

        let first = dir.mark_read(conv.id, 42, 101).unwrap();
        let after_first = dir.get(conv.id).unwrap().unwrap();
        let mut events = dir.subscribe();

        let second = dir.mark_read(conv.id, 42, 101).unwrap();
        let after_second = dir.get(conv.id).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn receipt_carries_both_markers() {
        let dir = directory();
        let conv = dir.get_or_create(7, 42).unwrap();
        dir.register_message(conv.id, 42, 200).unwrap();
        dir.mark_read(conv.id, 7, 200).unwrap();
        dir.register_message(conv.id, 7, 201).unwrap();

        let receipt = dir.mark_read(conv.id, 42, 201).unwrap();
        assert_eq!(receipt.reader_id, 42);
        assert_eq!(receipt.other_user_id, 7);
        assert_eq!(receipt.reader_last_read, Some(201));
        assert_eq!(receipt.other_user_last_read, Some(200));
    }

    #[test]
    fn summaries_and_totals() {
        let dir = directory();
        let a = dir.get_or_create(1, 2).unwrap();
        let b = dir.get_or_create(3, 1).unwrap();
        dir.get_or_create(2, 3).unwrap();

        dir.register_message(a.id, 2, 10).unwrap();
        dir.register_message(a.id, 2, 11).unwrap();
        dir.register_message(b.id, 3, 12).unwrap();
        dir.register_message(b.id, 1, 13).unwrap();

        let summaries = dir.conversations_for(1).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].conversation_id, b.id);
        assert_eq!(summaries[0].other_user_id, 3);
        assert_eq!(summaries[0].unread_count, 1);
        assert_eq!(summaries[1].other_user_id, 2);
        assert_eq!(summaries[1].unread_count, 2);

        assert_eq!(dir.total_unread(1).unwrap(), 3);
        assert_eq!(dir.total_unread(3).unwrap(), 1);
        assert_eq!(dir.total_unread(99).unwrap(), 0);
    }

    #[test]
    fn remove_user_cascades() {
        let dir = directory();
        let gone = dir.get_or_create(1, 2).unwrap();
        dir.get_or_create(1, 3).unwrap();
        let kept = dir.get_or_create(2, 3).unwrap();

        assert_eq!(dir.remove_user(1).unwrap(), 2);
        assert!(dir.get(gone.id).unwrap().is_none());
        assert!(dir.find(1, 3).unwrap().is_none());
        assert_eq!(dir.find(3, 2).unwrap().map(|c| c.id), Some(kept.id));
        assert!(dir.conversations_for(1).unwrap().is_empty());
    }

    #[test]
    fn removing_a_user_without_conversations_is_silent() {
        let dir = directory();
        dir.get_or_create(2, 3).unwrap();
        let mut events = dir.subscribe();

        assert_eq!(dir.remove_user(1).unwrap(), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn events_follow_writes() {
        let dir = directory();
        let mut events = dir.subscribe();

        let conv = dir.get_or_create(7, 42).unwrap();
        dir.register_message(conv.id, 7, 101).unwrap();
        dir.mark_read(conv.id, 42, 101).unwrap();
        dir.remove_user(7).unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            DirectoryEvent::ConversationCreated { user_one_id: 7, user_two_id: 42, .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            DirectoryEvent::MessageRegistered { recipient_id: 42, recipient_unread: 1, .. }
        ));
        match events.try_recv().unwrap() {
            DirectoryEvent::MessagesRead(receipt) => {
                assert_eq!(receipt.reader_id, 42);
                assert_eq!(receipt.reader_last_read, Some(101));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            events.try_recv().unwrap(),
            DirectoryEvent::ConversationsPurged { user_id: 7, removed: 1 }
        ));
    }
}
