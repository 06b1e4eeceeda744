//! Binary attachments (photos, PDFs) kept outside the JSON collections.
//!
//! Bytes live under `<data_dir>/attachments/<id>.<ext>`; the `attachments`
//! table maps the id to the relative path, mime type and owning record.

use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::task;

use crate::id::new_record_id;
use crate::time::now_rfc3339;
use crate::{AppError, AppResult};

pub const ATTACHMENTS_NOT_FOUND: &str = "ATTACHMENTS/NOT_FOUND";
pub const ATTACHMENTS_EMPTY: &str = "ATTACHMENTS/EMPTY";
pub const ATTACHMENTS_INVALID_BASE64: &str = "ATTACHMENTS/INVALID_BASE64";
pub const ATTACHMENTS_INVALID_PATH: &str = "ATTACHMENTS/INVALID_PATH";
pub const ATTACHMENTS_IO: &str = "ATTACHMENTS/IO";

const FALLBACK_MIME: &str = "application/octet-stream";
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub id: String,
    pub owner_id: String,
    pub file_path: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
}

type AttachmentRow = (String, String, String, String, Option<String>, String);

impl From<AttachmentRow> for AttachmentRef {
    fn from(row: AttachmentRow) -> Self {
        let (id, owner_id, file_path, mime_type, description, created_at) = row;
        Self {
            id,
            owner_id,
            file_path,
            mime_type,
            description,
            created_at,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, owner_id, file_path, mime_type, description, created_at FROM attachments";

#[derive(Clone)]
pub struct AttachmentStore {
    pool: SqlitePool,
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` for `owner_id`. The mime type is sniffed when not given.
    pub async fn save(
        &self,
        owner_id: &str,
        bytes: Vec<u8>,
        mime_type: Option<&str>,
        description: Option<String>,
    ) -> AppResult<AttachmentRef> {
        if owner_id.trim().is_empty() {
            return Err(AppError::new(
                crate::error::VALIDATION_REQUIRED_FIELD,
                "Attachment owner is required",
            )
            .with_context("field", "ownerId"));
        }
        if bytes.is_empty() {
            return Err(AppError::new(ATTACHMENTS_EMPTY, "Attachment is empty")
                .with_context("owner_id", owner_id.to_string()));
        }

        let (mime, extension) = classify(&bytes, mime_type);
        let id = new_record_id();
        let file_path = format!("{id}.{extension}");
        let absolute = self.root.join(&file_path);

        let target = absolute.clone();
        task::spawn_blocking(move || crate::db::write_atomic(&target, &bytes))
            .await
            .map_err(|err| {
                AppError::new(ATTACHMENTS_IO, "Attachment write task panicked")
                    .with_context("error", err.to_string())
            })?
            .map_err(|err| io_error(err, "write_attachment", &absolute))?;

        let attachment = AttachmentRef {
            id,
            owner_id: owner_id.to_string(),
            file_path,
            mime_type: mime,
            description,
            created_at: now_rfc3339(),
        };

        let inserted = sqlx::query(
            "INSERT INTO attachments (id, owner_id, file_path, mime_type, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&attachment.id)
        .bind(&attachment.owner_id)
        .bind(&attachment.file_path)
        .bind(&attachment.mime_type)
        .bind(&attachment.description)
        .bind(&attachment.created_at)
        .execute(&self.pool)
        .await;

        if let Err(err) = inserted {
            let _ = tokio::fs::remove_file(&absolute).await;
            return Err(AppError::from(err).with_context("operation", "insert_attachment"));
        }

        tracing::info!(
            target: "ironward",
            event = "attachment_saved",
            id = %attachment.id,
            owner_id = %attachment.owner_id,
            mime_type = %attachment.mime_type
        );
        Ok(attachment)
    }

    /// Accepts bare base64 or a `data:<mime>;base64,` URL.
    pub async fn save_base64(
        &self,
        owner_id: &str,
        data: &str,
        mime_type: Option<&str>,
        description: Option<String>,
    ) -> AppResult<AttachmentRef> {
        let (declared, payload) = split_data_url(data);
        let bytes = BASE64.decode(payload.trim()).map_err(|err| {
            AppError::new(ATTACHMENTS_INVALID_BASE64, "Attachment data is not valid base64")
                .with_context("error", err.to_string())
        })?;
        self.save(owner_id, bytes, mime_type.or(declared), description)
            .await
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<AttachmentRef>> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "get_attachment"))?;
        Ok(row.map(AttachmentRef::from))
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> AppResult<Vec<AttachmentRef>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "list_attachments"))?;
        Ok(rows.into_iter().map(AttachmentRef::from).collect())
    }

    pub async fn read(&self, id: &str) -> AppResult<Vec<u8>> {
        let attachment = self.require(id).await?;
        let path = self.resolve(&attachment.file_path)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| io_error(err, "read_attachment", &path))
    }

    pub async fn update_description(&self, id: &str, description: Option<String>) -> AppResult<bool> {
        let result = sqlx::query("UPDATE attachments SET description = ? WHERE id = ?")
            .bind(description)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "update_attachment"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove metadata and file. A file already gone from disk is not an error.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let Some(attachment) = self.get(id).await? else {
            return Ok(false);
        };
        sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "delete_attachment"))?;

        let path = self.resolve(&attachment.file_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(target: "ironward", event = "attachment_file_missing", id = %id);
            }
            Err(err) => return Err(io_error(err, "remove_attachment", &path)),
        }
        Ok(true)
    }

    /// Drop every attachment row and the files directory.
    pub async fn wipe(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM attachments")
            .execute(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "wipe_attachments"))?;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(err, "wipe_attachments", &self.root)),
        }
    }

    async fn require(&self, id: &str) -> AppResult<AttachmentRef> {
        self.get(id).await?.ok_or_else(|| {
            AppError::new(ATTACHMENTS_NOT_FOUND, "Attachment not found")
                .with_context("id", id.to_string())
        })
    }

    fn resolve(&self, file_path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(file_path);
        let plain = !file_path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(AppError::new(
                ATTACHMENTS_INVALID_PATH,
                "Attachment path escapes the attachments directory",
            )
            .with_context("path", file_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn classify(bytes: &[u8], declared: Option<&str>) -> (String, String) {
    let sniffed = infer::get(bytes);
    let mime = declared
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| sniffed.map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| FALLBACK_MIME.to_string());

    let extension = sniffed
        .filter(|kind| kind.mime_type() == mime)
        .map(|kind| kind.extension().to_string())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&mime)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    (mime, extension)
}

fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header
                .split(';')
                .next()
                .filter(|value| !value.is_empty());
            (mime, payload)
        }
        None => (None, data),
    }
}

fn io_error(err: std::io::Error, operation: &'static str, path: &Path) -> AppError {
    AppError::new(ATTACHMENTS_IO, "Attachment file operation failed")
        .with_context("operation", operation)
        .with_context("path", path.display().to_string())
        .with_cause(err)
}
