//! Snapshot files: capture, write, list and prune.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use fs2::available_space;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task;

use crate::collections::CollectionName;
use crate::config::AppConfig;
use crate::store::CollectionStore;
use crate::{AppError, AppResult};

mod restore;
mod snapshot;

pub use restore::{
    prepare_restore, reset_system, restore, ConfirmedRestore, PendingRestore, RestoreMode,
    RestorePreview, RestoreReport,
};
pub use snapshot::{current_version, parse_snapshot, BackupSnapshot, SNAPSHOT_VERSION};

pub const BACKUP_LOW_DISK: &str = "BACKUP/LOW_DISK";
pub const BACKUP_NAME_COLLISION: &str = "BACKUP/NAME_COLLISION";
const BACKUP_TASK: &str = "BACKUP/TASK";

const FILE_PREFIX: &str = "backup-";
const FILE_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const REQUIRED_FREE_MULTIPLIER: f64 = 1.2;
const MIN_REQUIRED_FREE_BYTES: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub path: String,
    pub file_name: String,
    pub created_at: String,
    pub size_bytes: u64,
    /// Only known for files written by this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Read every collection, in enumerated order, while no mutation can run.
///
/// Each collection is captured as the repositories see it, so an unwritten
/// `users` collection is saved as the seed admin rather than `[]`.
pub async fn create_snapshot(store: &CollectionStore) -> AppResult<BackupSnapshot> {
    let lock = store.lock_all().await;
    let mut collections = BTreeMap::new();
    for name in CollectionName::ALL {
        let default = restore::unwritten_default(name)?;
        collections.insert(name, lock.get(name, default).await?);
    }
    drop(lock);

    Ok(BackupSnapshot {
        version: current_version(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        collections,
    })
}

/// Snapshot the store into `<backup_dir>/backup-<stamp>.json` and prune old files.
pub async fn write_snapshot_file(
    store: &CollectionStore,
    config: &AppConfig,
) -> AppResult<BackupEntry> {
    let snapshot = create_snapshot(store).await?;
    let bytes = snapshot
        .to_json_pretty()
        .map_err(|err| AppError::from(err).with_context("operation", "serialize_snapshot"))?;
    let dir = config.backup_dir();
    let fake_free = config.fake_free_bytes;
    let max_count = config.backup_max_count;

    let entry = task::spawn_blocking(move || write_sync(&dir, &bytes, fake_free, max_count))
        .await
        .map_err(|err| {
            AppError::new(BACKUP_TASK, "Backup task panicked").with_context("error", err.to_string())
        })??;

    tracing::info!(
        target: "ironward",
        event = "backup_written",
        path = %entry.path,
        size_bytes = entry.size_bytes
    );
    Ok(entry)
}

/// Snapshot files in `dir`, newest first.
pub async fn list_snapshot_files(dir: &Path) -> AppResult<Vec<BackupEntry>> {
    let dir = dir.to_path_buf();
    task::spawn_blocking(move || {
        let mut files = collect_backups(&dir)?;
        files.reverse();
        Ok(files.into_iter().map(|file| file.entry).collect())
    })
    .await
    .map_err(|err| {
        AppError::new(BACKUP_TASK, "Backup listing task panicked")
            .with_context("error", err.to_string())
    })?
}

pub async fn read_snapshot_file(path: &Path) -> AppResult<BackupSnapshot> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        AppError::from(err)
            .with_context("operation", "read_backup")
            .with_context("path", path.display().to_string())
    })?;
    parse_snapshot(&bytes).map(|snapshot| {
        tracing::info!(
            target: "ironward",
            event = "backup_parsed",
            path = %path.display(),
            version = %snapshot.version
        );
        snapshot
    })
}

fn write_sync(
    dir: &Path,
    bytes: &[u8],
    fake_free: Option<u64>,
    max_count: usize,
) -> AppResult<BackupEntry> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backups_dir")
            .with_context("path", dir.display().to_string())
    })?;

    let required = required_free_bytes(bytes.len() as u64);
    let available = free_disk_space(dir, fake_free)?;
    if available < required {
        return Err(AppError::new(
            BACKUP_LOW_DISK,
            format!("Not enough disk space (need ~{required} bytes)."),
        )
        .with_context("available_bytes", available.to_string())
        .with_context("required_bytes", required.to_string()));
    }

    let now = Utc::now();
    let path = unique_backup_path(dir, &now)?;
    crate::db::write_atomic(&path, bytes).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "write_backup")
            .with_context("path", path.display().to_string())
    })?;

    let entry = BackupEntry {
        path: path.to_string_lossy().into_owned(),
        file_name: file_name_of(&path),
        created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        size_bytes: bytes.len() as u64,
        sha256: Some(format!("{:x}", Sha256::digest(bytes))),
    };

    apply_retention(dir, max_count)?;
    Ok(entry)
}

fn required_free_bytes(payload: u64) -> u64 {
    let scaled = (payload as f64 * REQUIRED_FREE_MULTIPLIER).ceil() as u64;
    scaled.max(MIN_REQUIRED_FREE_BYTES)
}

fn free_disk_space(path: &Path, fake: Option<u64>) -> AppResult<u64> {
    if let Some(value) = fake {
        return Ok(value);
    }
    available_space(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "available_space")
            .with_context("path", path.display().to_string())
    })
}

fn unique_backup_path(dir: &Path, timestamp: &DateTime<Utc>) -> AppResult<PathBuf> {
    let base = format!("{FILE_PREFIX}{}", timestamp.format(STAMP_FORMAT));
    for suffix in 0..100 {
        let candidate = if suffix == 0 {
            dir.join(format!("{base}{FILE_SUFFIX}"))
        } else {
            dir.join(format!("{base}-{suffix:02}{FILE_SUFFIX}"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(AppError::new(
        BACKUP_NAME_COLLISION,
        "Unable to allocate a backup file name",
    )
    .with_context("dir", dir.display().to_string()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `backup-YYYYMMDD-HHMMSS[-NN].json` -> (stamp, NN).
fn parse_backup_name(name: &str) -> Option<(NaiveDateTime, u32)> {
    let body = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (stamp, suffix) = match body.len() {
        15 => (body, 0),
        18 => {
            let (stamp, rest) = body.split_at(15);
            (stamp, rest.strip_prefix('-')?.parse().ok()?)
        }
        _ => return None,
    };
    let stamp = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some((stamp, suffix))
}

struct BackupFile {
    key: (NaiveDateTime, u32),
    path: PathBuf,
    entry: BackupEntry,
}

/// Snapshot files in `dir`, oldest first.
fn collect_backups(dir: &Path) -> AppResult<Vec<BackupFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let reader = fs::read_dir(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "read_backups_dir")
            .with_context("path", dir.display().to_string())
    })?;

    let mut files = Vec::new();
    for entry in reader {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(target: "ironward", event = "backup_entry_skipped", error = %err);
                continue;
            }
        };
        let path = entry.path();
        let name = file_name_of(&path);
        let Some(key) = parse_backup_name(&name) else {
            continue;
        };
        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        let created_at = key.0.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true);
        files.push(BackupFile {
            key,
            entry: BackupEntry {
                path: path.to_string_lossy().into_owned(),
                file_name: name,
                created_at,
                size_bytes,
                sha256: None,
            },
            path,
        });
    }
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

fn apply_retention(dir: &Path, max_count: usize) -> AppResult<()> {
    let files = collect_backups(dir)?;
    let excess = files.len().saturating_sub(max_count);
    for file in files.into_iter().take(excess) {
        match fs::remove_file(&file.path) {
            Ok(()) => tracing::info!(
                target: "ironward",
                event = "backup_pruned",
                path = %file.path.display()
            ),
            Err(err) => tracing::warn!(
                target: "ironward",
                event = "backup_prune_failed",
                path = %file.path.display(),
                error = %err
            ),
        }
    }
    Ok(())
}
