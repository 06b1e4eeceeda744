use std::env;
use std::path::{Path, PathBuf};

pub const APP_IDENTIFIER: &str = "ironward";
pub const DB_FILE_NAME: &str = "ironward.sqlite3";
const BACKUP_DIR_NAME: &str = "backups";
const ATTACHMENTS_DIR_NAME: &str = "attachments";
const LOG_DIR_NAME: &str = "logs";

pub const DEFAULT_LOG_FILTER: &str = "ironward=info,sqlx=warn";
/// Misclick guard for the raw-data console; not a security boundary.
pub const DEFAULT_CONSOLE_PASSPHRASE: &str = "dev123";
const DEFAULT_BACKUP_MAX_COUNT: usize = 10;
const HARD_MAX_BACKUP_COUNT: usize = 50;

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub console_passphrase: String,
    pub backup_max_count: usize,
    /// Test hook overriding the free-space check before backups.
    pub fake_free_bytes: Option<u64>,
}

impl AppConfig {
    /// Load from `IRONWARD_*` environment variables, falling back to the
    /// platform data directory.
    pub fn from_env() -> Self {
        let data_dir = env::var_os("IRONWARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let log_filter =
            env::var("IRONWARD_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let console_passphrase = env::var("IRONWARD_CONSOLE_PASSPHRASE")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONSOLE_PASSPHRASE.to_string());

        let backup_max_count = env::var("IRONWARD_BACKUP_MAX_COUNT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .map(|value| value.min(HARD_MAX_BACKUP_COUNT))
            .unwrap_or(DEFAULT_BACKUP_MAX_COUNT);

        let fake_free_bytes = env::var("IRONWARD_BACKUP_FAKE_FREE_BYTES")
            .ok()
            .and_then(|value| value.parse::<u64>().ok());

        Self {
            data_dir,
            log_filter,
            console_passphrase,
            backup_max_count,
            fake_free_bytes,
        }
    }

    /// Defaults rooted at `data_dir`; used by tests and embedders.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            console_passphrase: DEFAULT_CONSOLE_PASSPHRASE.to_string(),
            backup_max_count: DEFAULT_BACKUP_MAX_COUNT,
            fake_free_bytes: None,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR_NAME)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join(ATTACHMENTS_DIR_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(env::temp_dir);
    base.join(APP_IDENTIFIER)
}
