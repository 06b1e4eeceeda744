#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use ironward_lib::model::{Actor, Inmate, Ward};
use ironward_lib::{AppConfig, AppState};
use tempfile::TempDir;

/// In-memory store; attachments and backups land in the returned temp dir.
pub fn memory_state() -> (TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = AppState::in_memory(AppConfig::with_data_dir(dir.path())).expect("state");
    (dir, state)
}

/// On-disk store rooted at `dir`, for tests that reopen the database.
pub fn disk_state(dir: &Path) -> AppState {
    AppState::open(AppConfig::with_data_dir(dir)).expect("state")
}

pub fn officer() -> Actor {
    Actor::new("u-officer", "Officer Salem")
}

pub fn inmate(full_name: &str) -> Inmate {
    Inmate {
        full_name: full_name.to_string(),
        national_id: "1990-000-111".into(),
        entry_date: "2024-03-01".into(),
        referring_authority: "Central Police".into(),
        primary_charge: "Theft".into(),
        ..Inmate::default()
    }
}

pub fn ward(name: &str, capacity: u32) -> Ward {
    Ward {
        name: name.to_string(),
        capacity,
        ..Ward::default()
    }
}
