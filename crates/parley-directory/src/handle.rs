use std::sync::Arc;

use parley_types::{
    Conversation, ConversationId, ConversationSummary, DirectoryEvent, MessageId, ReadReceipt,
    UserId,
};
use tokio::sync::broadcast;

use crate::directory::ConversationDirectory;
use crate::error::Result;
use crate::store::ConversationStore;

/// Cloneable async front for a [`ConversationDirectory`]. Every call runs on
/// the blocking pool so store I/O never stalls the async runtime.
pub struct DirectoryHandle<S> {
    directory: Arc<ConversationDirectory<S>>,
}

impl<S> Clone for DirectoryHandle<S> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<S: ConversationStore + 'static> DirectoryHandle<S> {
    pub fn new(directory: ConversationDirectory<S>) -> Self {
        Self {
            directory: Arc::new(directory),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.directory.subscribe()
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ConversationDirectory<S>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let directory = Arc::clone(&self.directory);
        tokio::task::spawn_blocking(move || f(&directory)).await?
    }

    pub async fn find(&self, user_a: UserId, user_b: UserId) -> Result<Option<Conversation>> {
        self.run(move |d| d.find(user_a, user_b)).await
    }

    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        self.run(move |d| d.get(id)).await
    }

    pub async fn get_or_create(&self, user_a: UserId, user_b: UserId) -> Result<Conversation> {
        self.run(move |d| d.get_or_create(user_a, user_b)).await
    }

    pub async fn register_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        message_id: MessageId,
    ) -> Result<Conversation> {
        self.run(move |d| d.register_message(conversation_id, sender_id, message_id))
            .await
    }

    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        up_to: MessageId,
    ) -> Result<ReadReceipt> {
        self.run(move |d| d.mark_read(conversation_id, user_id, up_to))
            .await
    }

    pub async fn conversations_for(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        self.run(move |d| d.conversations_for(user_id)).await
    }

    pub async fn total_unread(&self, user_id: UserId) -> Result<u64> {
        self.run(move |d| d.total_unread(user_id)).await
    }

    pub async fn remove_user(&self, user_id: UserId) -> Result<usize> {
        self.run(move |d| d.remove_user(user_id)).await
    }
}
