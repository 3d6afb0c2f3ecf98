//! Conversation directory: resolves an unordered pair of users to their one
//! conversation and keeps per-participant unread counters and read markers.

pub mod config;
pub mod directory;
pub mod error;
pub mod handle;
pub mod store;

pub use config::DirectoryConfig;
pub use directory::ConversationDirectory;
pub use error::{DirectoryError, Result};
pub use handle::DirectoryHandle;
pub use store::{ConversationStore, MemoryStore, SqliteStore, StoreError};
