use crate::Database;
use crate::models::{ConversationRow, NO_MESSAGE, ParticipantRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

const SELECT_CONVERSATION: &str = "
    SELECT c.id, c.user_one_id, c.user_two_id, c.created_at, c.updated_at,
           p1.unread_count, p1.last_unread_id, p1.last_read_id,
           p2.unread_count, p2.last_unread_id, p2.last_read_id
    FROM conversations c
    JOIN conversation_participants p1
        ON p1.conversation_id = c.id AND p1.user_id = c.user_one_id
    JOIN conversation_participants p2
        ON p2.conversation_id = c.id AND p2.user_id = c.user_two_id";

impl Database {
    // -- Conversations --

    /// Insert a conversation and both participant rows in one transaction.
    /// Returns `None` when the unordered pair already has a conversation.
    pub fn insert_conversation(
        &self,
        user_one_id: i64,
        user_two_id: i64,
        now: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let inserted = tx.execute(
                "INSERT INTO conversations (user_one_id, user_two_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![user_one_id, user_two_id, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();

            for user_id in [user_one_id, user_two_id] {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                    rusqlite::params![id, user_id],
                )?;
            }

            let row = query_conversation(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Matches the pair in either slot orientation. At most two rows are
    /// returned so callers can tell "one" apart from "more than one".
    pub fn find_conversations_by_pair(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SELECT_CONVERSATION}
                 WHERE (c.user_one_id = ?1 AND c.user_two_id = ?2)
                    OR (c.user_one_id = ?2 AND c.user_two_id = ?1)
                 LIMIT 2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_a, user_b], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every conversation the user takes part in, most recently active first.
    pub fn list_conversations_for_user(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SELECT_CONVERSATION}
                 WHERE c.user_one_id = ?1 OR c.user_two_id = ?1
                 ORDER BY c.updated_at DESC, c.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Count one more unread message for `recipient_id`.
    /// Returns `None` if the conversation or participant does not exist.
    pub fn increment_unread(
        &self,
        conversation_id: i64,
        recipient_id: i64,
        message_id: i64,
        now: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let changed = tx.execute(
                "UPDATE conversation_participants
                 SET unread_count = unread_count + 1, last_unread_id = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, recipient_id, message_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            touch(&tx, conversation_id, now)?;

            let row = query_conversation(&tx, conversation_id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Clear `reader_id`'s unread count and move their read marker.
    /// Returns `None` if the conversation or participant does not exist.
    pub fn mark_read(
        &self,
        conversation_id: i64,
        reader_id: i64,
        up_to_message_id: i64,
        now: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let changed = tx.execute(
                "UPDATE conversation_participants
                 SET unread_count = 0, last_read_id = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, reader_id, up_to_message_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            touch(&tx, conversation_id, now)?;

            let row = query_conversation(&tx, conversation_id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Remove every conversation involving the user. Participant rows go
    /// with them through the foreign key cascade.
    pub fn delete_conversations_for_user(&self, user_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM conversations WHERE user_one_id = ?1 OR user_two_id = ?1",
                [user_id],
            )?;
            Ok(removed)
        })
    }
}

fn touch(conn: &Connection, conversation_id: i64, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
        rusqlite::params![conversation_id, now],
    )?;
    Ok(())
}

fn query_conversation(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    let sql = format!("{SELECT_CONVERSATION} WHERE c.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], map_conversation).optional()?;
    Ok(row)
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    let user_one_id: i64 = row.get(1)?;
    let user_two_id: i64 = row.get(2)?;
    Ok(ConversationRow {
        id: row.get(0)?,
        user_one_id,
        user_two_id,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        participants: [
            ParticipantRow {
                user_id: user_one_id,
                unread_count: row.get(5)?,
                last_unread_id: row.get::<_, Option<i64>>(6)?.unwrap_or(NO_MESSAGE),
                last_read_id: row.get::<_, Option<i64>>(7)?.unwrap_or(NO_MESSAGE),
            },
            ParticipantRow {
                user_id: user_two_id,
                unread_count: row.get(8)?,
                last_unread_id: row.get::<_, Option<i64>>(9)?.unwrap_or(NO_MESSAGE),
                last_read_id: row.get::<_, Option<i64>>(10)?.unwrap_or(NO_MESSAGE),
            },
        ],
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
