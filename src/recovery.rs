//! Panic fence and recovery actions for the outer boundary.

use std::any::Any;
use std::panic::{self, catch_unwind, AssertUnwindSafe};

use futures::Future;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::db::health::{run_health_checks, DbHealthReport};
use crate::error::{panic_payload, stash_panic_crash_id, take_panic_crash_id, CrashId, RUNTIME_PANIC};
use crate::state::AppState;
use crate::{AppError, AppResult};

fn app_error_from_panic(payload: Box<dyn Any + Send>) -> AppError {
    let message = panic_payload(payload.as_ref());
    let crash_id = take_panic_crash_id().unwrap_or_else(CrashId::new);

    let mut error = AppError::new(RUNTIME_PANIC, message);
    error.set_crash_id(crash_id);
    error.log_with_event("panic_caught");
    error
}

/// Give every panic a crash id before unwinding so the fence can report it.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let crash_id = CrashId::new();
        tracing::error!(
            target: "ironward",
            event = "panic",
            crash_id = %crash_id,
            location = info.location().map(|l| l.to_string()).as_deref()
        );
        stash_panic_crash_id(crash_id);
        previous(info);
    }));
}

#[allow(clippy::result_large_err)]
pub fn dispatch_with_fence<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Ok(result),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

#[allow(clippy::result_large_err)]
pub async fn dispatch_async_with_fence<F, Fut, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let fut = dispatch_with_fence(|| AssertUnwindSafe(f()).catch_unwind())?;
    match fut.await {
        Ok(value) => Ok(value),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

pub async fn dispatch_async_app_result<F, Fut, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    dispatch_async_with_fence(f).await?
}

/// What the boundary offers after a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Keep the data; re-check it and carry on.
    SoftReload,
    /// Delete every collection and attachment. Users fall back to the seed admin.
    HardReset,
}

/// Run the health checks and remember the report on the state.
pub async fn check_health(state: &AppState) -> AppResult<DbHealthReport> {
    let report = run_health_checks(&state.store).await?;
    state.remember_health(&report);
    Ok(report)
}

pub async fn recover(state: &AppState, action: RecoveryAction) -> AppResult<DbHealthReport> {
    tracing::warn!(target: "ironward", event = "recovery_requested", action = ?action);
    match action {
        RecoveryAction::SoftReload => {
            for failure in state.audit.drain_failures() {
                failure.log_with_event("audit_failure_pending");
            }
        }
        RecoveryAction::HardReset => hard_reset(state).await?,
    }
    check_health(state).await
}

async fn hard_reset(state: &AppState) -> AppResult<()> {
    let _guard = state.begin_maintenance()?;
    state.store.wipe().await?;
    state.attachments.wipe().await?;
    state.audit.drain_failures();
    tracing::warn!(target: "ironward", event = "hard_reset_complete");
    Ok(())
}
