use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use parley_db::Database;
use parley_db::models::{ConversationRow, NO_MESSAGE, ParticipantRow};
use parley_types::{CanonicalPair, Conversation, ConversationId, MessageId, Participant, UserId};

use super::{ConversationStore, StoreError, StoreResult};

/// [`ConversationStore`] backed by the SQLite database in `parley-db`.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path, reader_pool_size: usize) -> anyhow::Result<Self> {
        Ok(Self::new(Database::open(path, reader_pool_size)?))
    }
}

impl ConversationStore for SqliteStore {
    fn insert(&self, pair: CanonicalPair, now: DateTime<Utc>) -> StoreResult<Conversation> {
        match self.db.insert_conversation(pair.low(), pair.high(), &timestamp(now))? {
            Some(row) => Ok(into_conversation(row)?),
            None => Err(StoreError::Conflict(pair.low(), pair.high())),
        }
    }

    fn get(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.db.get_conversation(id)?.map(into_conversation).transpose()?)
    }

    fn find_by_pair(&self, user_a: UserId, user_b: UserId) -> StoreResult<Vec<Conversation>> {
        let rows = self.db.find_conversations_by_pair(user_a, user_b)?;
        Ok(rows
            .into_iter()
            .map(into_conversation)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }

    fn list_for_user(&self, user: UserId) -> StoreResult<Vec<Conversation>> {
        let rows = self.db.list_conversations_for_user(user)?;
        Ok(rows
            .into_iter()
            .map(into_conversation)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }

    fn record_message(
        &self,
        id: ConversationId,
        recipient: UserId,
        message_id: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>> {
        let row = self
            .db
            .increment_unread(id, recipient, message_id, &timestamp(now))?;
        Ok(row.map(into_conversation).transpose()?)
    }

    fn record_read(
        &self,
        id: ConversationId,
        reader: UserId,
        up_to: MessageId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>> {
        let row = self.db.mark_read(id, reader, up_to, &timestamp(now))?;
        Ok(row.map(into_conversation).transpose()?)
    }

    fn delete_for_user(&self, user: UserId) -> StoreResult<usize> {
        Ok(self.db.delete_conversations_for_user(user)?)
    }
}

/// Fixed-width UTC timestamps sort lexicographically, which the
/// `updated_at` ordering in SQL relies on.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn marker(raw: i64) -> Option<MessageId> {
    (raw != NO_MESSAGE).then_some(raw)
}

fn into_participant(row: ParticipantRow) -> anyhow::Result<Participant> {
    Ok(Participant {
        user_id: row.user_id,
        unread_count: u32::try_from(row.unread_count)
            .with_context(|| format!("unread count out of range: {}", row.unread_count))?,
        last_unread_id: marker(row.last_unread_id),
        last_read_id: marker(row.last_read_id),
    })
}

fn into_conversation(row: ConversationRow) -> anyhow::Result<Conversation> {
    let [one, two] = row.participants;
    Ok(Conversation {
        id: row.id,
        user_one_id: row.user_one_id,
        user_two_id: row.user_two_id,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
        participants: [into_participant(one)?, into_participant(two)?],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn timestamps_round_trip_at_micro_precision() {
        let now = Utc::now();
        let parsed = parse_timestamp(&timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn sentinel_maps_to_none() {
        assert_eq!(marker(NO_MESSAGE), None);
        assert_eq!(marker(0), Some(0));
        assert_eq!(marker(101), Some(101));
    }

    #[test]
    fn conflict_surfaces_as_store_conflict() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("store.db"), 1).unwrap();
        let pair = CanonicalPair::new(3, 4).unwrap();

        let created = store.insert(pair, Utc::now()).unwrap();
        assert_eq!(created.user_one_id, 3);
        assert_eq!(created.last_read_id(4), Some(None));

        match store.insert(pair, Utc::now()) {
            Err(StoreError::Conflict(3, 4)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
