use std::sync::{Arc, Mutex};

use crate::collections::CollectionName;
use crate::id::new_record_id;
use crate::model::{Actor, AuditAction, AuditLogEntry, Extra};
use crate::store::{CollectionStore, Edit};
use crate::time::now_rfc3339;
use crate::{AppError, AppResult};

/// Append-only activity log stored in the `logs` collection.
///
/// Recording never fails the operation that triggered it. Failed appends are
/// logged and kept until [`AuditLog::drain_failures`] is called.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<CollectionStore>,
    failures: Arc<Mutex<Vec<AppError>>>,
}

impl AuditLog {
    pub fn new(store: Arc<CollectionStore>) -> Self {
        Self {
            store,
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn record(&self, action: AuditAction, target: impl Into<String>, actor: &Actor) {
        let entry = AuditLogEntry {
            id: new_record_id(),
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            action,
            target: target.into(),
            timestamp: now_rfc3339(),
            extra: Extra::new(),
        };

        let result = self
            .store
            .mutate(CollectionName::Logs, Vec::new(), |entries: &mut Vec<AuditLogEntry>| {
                entries.push(entry.clone());
                Ok(Edit::Changed(()))
            })
            .await;

        match result {
            Ok(_) => tracing::info!(
                target: "ironward",
                event = "audit",
                action = action.as_str(),
                user = %entry.user_name,
                subject = %entry.target
            ),
            Err(err) => {
                let err = err
                    .with_context("audit_action", action.as_str())
                    .with_context("audit_target", entry.target.clone());
                err.log_with_event("audit_write_failed");
                match self.failures.lock() {
                    Ok(mut failures) => failures.push(err),
                    Err(poisoned) => poisoned.into_inner().push(err),
                }
            }
        }
    }

    pub async fn entries(&self) -> AppResult<Vec<AuditLogEntry>> {
        self.store.get_typed(CollectionName::Logs, Vec::new()).await
    }

    /// The most recent `n` entries, oldest first.
    pub async fn tail(&self, n: usize) -> AppResult<Vec<AuditLogEntry>> {
        let mut entries = self.entries().await?;
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
        Ok(entries)
    }

    pub fn drain_failures(&self) -> Vec<AppError> {
        match self.failures.lock() {
            Ok(mut failures) => std::mem::take(&mut *failures),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}
