use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 1;

/// Bring the schema up to [`LATEST_VERSION`] and return the version in place.
pub fn run(conn: &Connection) -> Result<i64> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let mut version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (conversations)");
        conn.execute_batch(
            "
            CREATE TABLE conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_one_id INTEGER NOT NULL,
                user_two_id INTEGER NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                CHECK (user_one_id <> user_two_id)
            );

            -- One conversation per unordered pair, whatever the slot order
            CREATE UNIQUE INDEX idx_conversations_pair
                ON conversations(min(user_one_id, user_two_id), max(user_one_id, user_two_id));

            CREATE INDEX idx_conversations_created
                ON conversations(created_at);

            CREATE INDEX idx_conversations_user_two
                ON conversations(user_two_id);

            CREATE TABLE conversation_participants (
                conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL,
                unread_count    INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
                last_unread_id  INTEGER NOT NULL DEFAULT -1,
                last_read_id    INTEGER NOT NULL DEFAULT -1,
                PRIMARY KEY (conversation_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        version = 1;
    }

    Ok(version)
}
