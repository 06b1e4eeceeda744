use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;

use crate::collections::CollectionName;
use crate::store::{CollectionState, CollectionStore};
use crate::AppResult;

const ACCEPTED_JOURNAL_MODES: [&str; 2] = ["wal", "memory"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbHealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHealthCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl DbHealthCheck {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            duration_ms: 0,
            details: None,
        }
    }

    fn fail(&mut self, details: String) {
        self.passed = false;
        self.details = Some(details);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionHealth {
    pub name: CollectionName,
    #[serde(flatten)]
    pub state: CollectionState,
    pub quarantined: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbHealthReport {
    pub status: DbHealthStatus,
    pub checks: Vec<DbHealthCheck>,
    pub collections: Vec<CollectionHealth>,
    pub app_version: String,
    pub generated_at: String,
}

impl DbHealthReport {
    pub fn corrupt_collections(&self) -> impl Iterator<Item = &CollectionHealth> {
        self.collections
            .iter()
            .filter(|c| matches!(c.state, CollectionState::Corrupt { .. }))
    }
}

/// Engine checks plus a parse check of every collection.
///
/// Individual check failures are reported in the result; only a failure to
/// reach the database at all is an error.
pub async fn run_health_checks(store: &CollectionStore) -> AppResult<DbHealthReport> {
    let mut checks = Vec::new();
    {
        let mut conn = store.pool().acquire().await?;
        checks.push(run_quick_check(&mut conn).await);
        checks.push(run_journal_check(&mut conn).await);
    }

    let start = Instant::now();
    let mut collections = Vec::with_capacity(CollectionName::ALL.len());
    for name in CollectionName::ALL {
        collections.push(CollectionHealth {
            name,
            state: store.inspect(name).await?,
            quarantined: store.quarantined(name).await?.len(),
        });
    }
    let mut parse_check = DbHealthCheck::new("collections_parse");
    let corrupt: Vec<&str> = collections
        .iter()
        .filter(|c| matches!(c.state, CollectionState::Corrupt { .. }))
        .map(|c| c.name.as_str())
        .collect();
    if !corrupt.is_empty() {
        parse_check.fail(format!("unreadable: {}", corrupt.join(", ")));
    }
    parse_check.duration_ms = start.elapsed().as_millis() as u64;
    checks.push(parse_check);

    let status = if checks.iter().all(|c| c.passed) {
        DbHealthStatus::Ok
    } else {
        DbHealthStatus::Error
    };

    let report = DbHealthReport {
        status,
        checks,
        collections,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    if report.status == DbHealthStatus::Error {
        tracing::warn!(target: "ironward", event = "db_health_failed", checks = ?report.checks);
    }
    Ok(report)
}

async fn run_quick_check(conn: &mut SqliteConnection) -> DbHealthCheck {
    let start = Instant::now();
    let mut check = DbHealthCheck::new("quick_check");

    match sqlx::query_scalar::<_, String>("PRAGMA quick_check;")
        .fetch_one(&mut *conn)
        .await
    {
        Ok(result) if result.eq_ignore_ascii_case("ok") => {}
        Ok(result) => check.fail(result),
        Err(err) => check.fail(format!("quick_check failed: {err}")),
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    check
}

async fn run_journal_check(conn: &mut SqliteConnection) -> DbHealthCheck {
    let start = Instant::now();
    let mut check = DbHealthCheck::new("journal_mode");

    match sqlx::query_scalar::<_, String>("PRAGMA journal_mode;")
        .fetch_one(&mut *conn)
        .await
    {
        Ok(mode) if ACCEPTED_JOURNAL_MODES
            .iter()
            .any(|accepted| mode.eq_ignore_ascii_case(accepted)) =>
        {
            check.details = Some(format!("journal_mode={mode}"));
        }
        Ok(mode) => check.fail(format!("journal_mode mismatch: expected wal, got {mode}")),
        Err(err) => check.fail(format!("journal_mode query failed: {err}")),
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    check
}
