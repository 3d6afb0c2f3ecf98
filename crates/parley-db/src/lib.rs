pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_READER_POOL_SIZE: usize = 4;

/// Writers queue behind each other on the writer mutex, but a reader can
/// still hit a checkpoint in progress. Wait instead of failing with
/// `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Conversation database: every counter update goes through the single
/// writer, lookups rotate over read-only connections.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    schema_version: i64,
}

impl Database {
    pub fn open(path: &Path, reader_pool_size: usize) -> Result<Self> {
        let writer = open_writer(path)?;
        let schema_version = migrations::run(&writer)?;

        // Readers open after migrations so they never see a partial schema.
        let readers = (0..reader_pool_size.max(1))
            .map(|_| open_reader(path).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;

        info!(
            path = %path.display(),
            schema_version,
            readers = readers.len(),
            "Conversation database ready"
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            schema_version,
        })
    }

    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    /// Run a read-only query on the next pooled reader.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let slot = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[slot]
            .lock()
            .map_err(|_| anyhow!("conversation reader {slot} poisoned"))?;
        f(&conn)
    }

    /// Run a write on the writer connection. Callers hold it for the whole
    /// read-modify-write so concurrent updates cannot interleave.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|_| anyhow!("conversation writer poisoned"))?;
        f(&conn)
    }
}

fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening conversation database {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Participant rows are removed through ON DELETE CASCADE
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("opening reader for {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}
