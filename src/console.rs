//! Raw override console.
//!
//! Replaces a whole collection with operator-supplied JSON. The only check is
//! that the payload is an array; entity validation, id uniqueness and
//! cross-collection references are not enforced here. The passphrase keeps
//! ordinary users from wandering in and is not a security boundary.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::audit::AuditLog;
use crate::collections::CollectionName;
use crate::config::AppConfig;
use crate::error::{AUTH_INVALID_CREDENTIALS, CONSOLE_INVALID_JSON, CONSOLE_NOT_AN_ARRAY};
use crate::model::{Actor, AuditAction};
use crate::store::{json_kind, CollectionStore};
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOverrideReport {
    pub collection: CollectionName,
    pub records: usize,
    /// Elements without a string `id`; written anyway.
    pub missing_ids: usize,
}

impl RawOverrideReport {
    pub fn warning(&self) -> Option<String> {
        (self.missing_ids > 0).then(|| {
            format!(
                "{} of {} records in {} have no id; repository lookups will not find them",
                self.missing_ids, self.records, self.collection
            )
        })
    }
}

pub struct Console {
    store: Arc<CollectionStore>,
    audit: AuditLog,
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

impl Console {
    pub fn unlock(
        passphrase: &str,
        config: &AppConfig,
        store: Arc<CollectionStore>,
        audit: AuditLog,
    ) -> AppResult<Self> {
        if digest(passphrase) != digest(&config.console_passphrase) {
            tracing::warn!(target: "ironward", event = "console_unlock_denied");
            return Err(AppError::new(
                AUTH_INVALID_CREDENTIALS,
                "Console passphrase is incorrect",
            ));
        }
        tracing::info!(target: "ironward", event = "console_unlocked");
        Ok(Self { store, audit })
    }

    /// Stored array as pretty JSON; `[]` when absent or unreadable.
    pub async fn read_raw(&self, name: CollectionName) -> AppResult<String> {
        let records = self.store.get(name, Vec::new()).await?;
        serde_json::to_string_pretty(&records).map_err(AppError::from)
    }

    pub async fn update_raw_data(
        &self,
        name: CollectionName,
        payload: Value,
        actor: &Actor,
    ) -> AppResult<RawOverrideReport> {
        let records = match payload {
            Value::Array(records) => records,
            other => {
                return Err(AppError::new(
                    CONSOLE_NOT_AN_ARRAY,
                    format!("Data must be a JSON array, found {}", json_kind(&other)),
                )
                .with_context("collection", name.as_str()))
            }
        };

        let missing_ids = records
            .iter()
            .filter(|record| record.get("id").and_then(Value::as_str).is_none())
            .count();
        let report = RawOverrideReport {
            collection: name,
            records: records.len(),
            missing_ids,
        };
        if let Some(warning) = report.warning() {
            tracing::warn!(target: "ironward", event = "console_missing_ids", collection = %name, %warning);
        }

        self.store.replace(name, &records).await?;
        tracing::warn!(
            target: "ironward",
            event = "console_override",
            collection = %name,
            records = report.records
        );
        self.audit
            .record(AuditAction::Update, format!("Raw override: {name}"), actor)
            .await;
        Ok(report)
    }

    pub async fn update_raw_text(
        &self,
        name: CollectionName,
        text: &str,
        actor: &Actor,
    ) -> AppResult<RawOverrideReport> {
        let payload: Value = serde_json::from_str(text).map_err(|err| {
            AppError::new(CONSOLE_INVALID_JSON, "Data is not valid JSON")
                .with_context("collection", name.as_str())
                .with_cause(err)
        })?;
        self.update_raw_data(name, payload, actor).await
    }

    pub async fn clear(&self, name: CollectionName, actor: &Actor) -> AppResult<RawOverrideReport> {
        self.update_raw_data(name, Value::Array(Vec::new()), actor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use serde_json::json;

    fn open(passphrase: &str) -> AppResult<Console> {
        let store = Arc::new(CollectionStore::new(open_memory_pool().expect("pool")));
        let audit = AuditLog::new(Arc::clone(&store));
        Console::unlock(passphrase, &AppConfig::with_data_dir("/unused"), store, audit)
    }

    #[test]
    fn wrong_passphrase_is_refused() {
        let err = open("guess").err().expect("refused");
        assert_eq!(err.code(), AUTH_INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn non_arrays_and_bad_json_are_rejected() {
        let console = open("dev123").expect("unlock");
        let actor = Actor::system();
        let err = console
            .update_raw_data(CollectionName::Wards, json!({"id": "w"}), &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CONSOLE_NOT_AN_ARRAY);
        let err = console
            .update_raw_text(CollectionName::Wards, "[{", &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CONSOLE_INVALID_JSON);
    }

    #[tokio::test]
    async fn missing_ids_warn_but_still_write() {
        let console = open("dev123").expect("unlock");
        let report = console
            .update_raw_text(
                CollectionName::Favorites,
                r#"[{"id":"f1","label":"x"},{"label":"y"},{"id":7}]"#,
                &Actor::system(),
            )
            .await
            .expect("override");
        assert_eq!(report.records, 3);
        assert_eq!(report.missing_ids, 2);
        assert!(report.warning().is_some());
        let raw = console
            .read_raw(CollectionName::Favorites)
            .await
            .expect("read");
        let parsed: Value = serde_json::from_str(&raw).expect("pretty json");
        assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    }
}
