use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::collections::CollectionName;
use crate::model::seed_admin;
use crate::store::CollectionStore;
use crate::AppResult;

use super::snapshot::BackupSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Every collection becomes exactly the snapshot's array; absent ones empty.
    #[default]
    Replace,
    /// By-id union with the snapshot winning; absent collections untouched.
    Merge,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePreview {
    pub version: String,
    pub created_at: String,
    pub counts: BTreeMap<CollectionName, usize>,
    pub missing: Vec<CollectionName>,
}

/// A parsed snapshot awaiting the operator's go-ahead.
#[derive(Debug)]
pub struct PendingRestore {
    snapshot: BackupSnapshot,
    preview: RestorePreview,
}

/// The only input [`restore`] accepts.
#[derive(Debug)]
pub struct ConfirmedRestore {
    snapshot: BackupSnapshot,
}

impl PendingRestore {
    pub fn preview(&self) -> &RestorePreview {
        &self.preview
    }

    pub fn confirm(self) -> ConfirmedRestore {
        tracing::info!(
            target: "ironward",
            event = "restore_confirmed",
            version = %self.preview.version,
            created_at = %self.preview.created_at
        );
        ConfirmedRestore {
            snapshot: self.snapshot,
        }
    }
}

pub fn prepare_restore(snapshot: BackupSnapshot) -> PendingRestore {
    let missing = CollectionName::ALL
        .into_iter()
        .filter(|name| !snapshot.collections.contains_key(name))
        .collect();
    let preview = RestorePreview {
        version: snapshot.version.to_string(),
        created_at: snapshot.created_at.clone(),
        counts: snapshot.counts(),
        missing,
    };
    PendingRestore { snapshot, preview }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub mode: RestoreMode,
    /// Record count per collection written, in enumerated order.
    pub written: Vec<(CollectionName, usize)>,
}

/// Apply a confirmed snapshot in one transaction: either every collection is
/// written or none is.
pub async fn restore(
    store: &CollectionStore,
    confirmed: ConfirmedRestore,
    mode: RestoreMode,
) -> AppResult<RestoreReport> {
    let mut snapshot = confirmed.snapshot;
    let lock = store.lock_all().await;

    let mut entries = Vec::new();
    for name in CollectionName::ALL {
        let incoming = snapshot.collections.remove(&name);
        let records = match (mode, incoming) {
            (RestoreMode::Replace, incoming) => incoming.unwrap_or_default(),
            (RestoreMode::Merge, None) => continue,
            (RestoreMode::Merge, Some(incoming)) => {
                let current = lock.get(name, unwritten_default(name)?).await?;
                merge_by_id(current, incoming)
            }
        };
        entries.push((name, records));
    }

    let written = entries
        .iter()
        .map(|(name, records)| (*name, records.len()))
        .collect();
    lock.replace_many(entries).await.map_err(|err| {
        err.log_with_event("restore_failed");
        err
    })?;

    tracing::info!(target: "ironward", event = "restore_applied", mode = ?mode);
    Ok(RestoreReport { mode, written })
}

/// What a repository read sees for a collection that was never written:
/// `users` falls back to the seed admin, everything else to `[]`.
pub(crate) fn unwritten_default(name: CollectionName) -> AppResult<Vec<Value>> {
    Ok(match name {
        CollectionName::Users => vec![serde_json::to_value(seed_admin())?],
        _ => Vec::new(),
    })
}

fn record_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

fn merge_by_id(mut current: Vec<Value>, incoming: Vec<Value>) -> Vec<Value> {
    let mut positions: HashMap<String, usize> = current
        .iter()
        .enumerate()
        .filter_map(|(index, value)| record_id(value).map(|id| (id.to_string(), index)))
        .collect();

    for record in incoming {
        match record_id(&record).and_then(|id| positions.get(id).copied()) {
            Some(index) => current[index] = record,
            None => {
                if let Some(id) = record_id(&record) {
                    positions.insert(id.to_string(), current.len());
                }
                current.push(record);
            }
        }
    }
    current
}

/// Empty every collection, leaving only the seed admin account.
pub async fn reset_system(store: &CollectionStore) -> AppResult<()> {
    let mut entries = Vec::with_capacity(CollectionName::ALL.len());
    for name in CollectionName::ALL {
        entries.push((name, unwritten_default(name)?));
    }
    store.replace_many(entries).await?;
    tracing::warn!(target: "ironward", event = "system_reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_existing_and_lets_snapshot_win() {
        let current = vec![
            json!({"id": "a", "v": 1}),
            json!({"id": "b", "v": 1}),
            json!({"note": "no id"}),
        ];
        let incoming = vec![
            json!({"id": "b", "v": 2}),
            json!({"id": "c", "v": 2}),
            json!({"id": "c", "v": 3}),
        ];
        let merged = merge_by_id(current, incoming);
        assert_eq!(
            merged,
            vec![
                json!({"id": "a", "v": 1}),
                json!({"id": "b", "v": 2}),
                json!({"note": "no id"}),
                json!({"id": "c", "v": 3}),
            ]
        );
    }
}
