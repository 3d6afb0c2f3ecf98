//! Database row types. These map directly to SQLite rows and stay
//! independent of parley-types so the DB layer has no domain dependency.

/// Marker value stored when a participant has no read/unread message yet.
pub const NO_MESSAGE: i64 = -1;

pub struct ConversationRow {
    pub id: i64,
    pub user_one_id: i64,
    pub user_two_id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub participants: [ParticipantRow; 2],
}

pub struct ParticipantRow {
    pub user_id: i64,
    pub unread_count: i64,
    pub last_unread_id: i64,
    pub last_read_id: i64,
}
