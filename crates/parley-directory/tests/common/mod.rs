use parley_directory::{ConversationDirectory, DirectoryConfig, SqliteStore};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_directory=debug,parley_db=info".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn sqlite_directory(dir: &TempDir) -> ConversationDirectory<SqliteStore> {
    init_tracing();
    let config = DirectoryConfig {
        db_path: dir.path().join("parley.db"),
        reader_pool_size: 2,
        event_capacity: 64,
    };
    ConversationDirectory::open(&config).expect("open directory")
}
