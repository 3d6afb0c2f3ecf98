use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_DB_PATH: &str = "parley.db";
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Runtime settings for a SQLite-backed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub db_path: PathBuf,
    pub reader_pool_size: usize,
    pub event_capacity: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            reader_pool_size: parley_db::DEFAULT_READER_POOL_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DirectoryConfig {
    /// Read `PARLEY_DB_PATH`, `PARLEY_READER_POOL` and
    /// `PARLEY_EVENT_CAPACITY`, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("PARLEY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let reader_pool_size = match lookup("PARLEY_READER_POOL") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PARLEY_READER_POOL is not a number: {raw}"))?,
            None => defaults.reader_pool_size,
        };

        let event_capacity = match lookup("PARLEY_EVENT_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PARLEY_EVENT_CAPACITY is not a number: {raw}"))?,
            None => defaults.event_capacity,
        };

        if reader_pool_size == 0 {
            anyhow::bail!("PARLEY_READER_POOL must be at least 1");
        }
        if event_capacity == 0 {
            anyhow::bail!("PARLEY_EVENT_CAPACITY must be at least 1");
        }

        Ok(Self {
            db_path,
            reader_pool_size,
            event_capacity,
        })
    }
}
