use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{ConnectOptions, SqlitePool};

use crate::{AppError, AppResult};

pub mod health;

/// Collections live as one JSON array per row; attachments get their own keyspace.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collections (
  name TEXT PRIMARY KEY,
  payload TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS collection_quarantine (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  payload TEXT NOT NULL,
  reason TEXT NOT NULL,
  quarantined_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
  id TEXT PRIMARY KEY,
  owner_id TEXT NOT NULL,
  file_path TEXT NOT NULL,
  mime_type TEXT NOT NULL,
  description TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attachments_owner_idx ON attachments(owner_id);
";

/// Open the on-disk store. The single connection is established lazily on
/// first use and reused for the life of the process.
pub fn open_sqlite_pool(db_path: &Path) -> AppResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            tracing::error!(
                target: "ironward",
                error = %err,
                event = "data_dir_create_failed",
                path = %parent.display()
            );
            AppError::from(err)
                .with_context("operation", "create_data_dir")
                .with_context("path", parent.display().to_string())
        })?;
    }
    tracing::info!(target: "ironward", event = "db_path", path = %db_path.display());

    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(log::LevelFilter::Off);

    Ok(single_connection_pool(opts))
}

/// Private in-memory store, used by tests and dry runs.
pub fn open_memory_pool() -> AppResult<SqlitePool> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|err| AppError::from(err).with_context("operation", "memory_options"))?
        .log_statements(log::LevelFilter::Off);
    Ok(single_connection_pool(opts))
}

fn single_connection_pool(opts: SqliteConnectOptions) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        // An in-memory database vanishes with its connection.
        .idle_timeout(None)
        .max_lifetime(None)
        .after_connect(|conn, _meta| {
            Box::pin(init_connection(conn))
        })
        .connect_lazy_with(opts)
}

async fn init_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(SCHEMA_SQL)).await?;
    log_effective_pragmas(conn).await;
    Ok(())
}

async fn log_effective_pragmas(conn: &mut SqliteConnection) {
    use tracing::{info, warn};

    let sqlite_ver: String = sqlx::query_scalar("select sqlite_version()")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or_else(|_| String::from("unknown"));

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode;")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or_else(|_| String::from("unknown"));

    let busy: i64 = sqlx::query_scalar("PRAGMA busy_timeout;")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or(i64::MIN);

    info!(
        target: "ironward",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %journal_mode,
        busy_timeout_ms = busy
    );

    if !journal_mode.eq_ignore_ascii_case("wal") && !journal_mode.eq_ignore_ascii_case("memory") {
        warn!(
            target: "ironward",
            event = "db_open_warning",
            msg = "journal_mode != WAL; running with reduced crash safety"
        );
    }
}

/// Write `bytes` to `path` through a sibling temp file and rename, so readers
/// never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    if let Ok(handle) = std::fs::File::open(dir) {
        handle.sync_all().ok();
    }
    Ok(())
}
