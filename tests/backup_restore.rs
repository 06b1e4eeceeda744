use anyhow::Result;
use ironward_lib::backup::{
    self, parse_snapshot, prepare_restore, reset_system, restore, RestoreMode, BACKUP_LOW_DISK,
};
use ironward_lib::auth::login;
use ironward_lib::error::{BACKUP_INVALID_FORMAT, BACKUP_UNSUPPORTED_VERSION};
use ironward_lib::model::SEED_ADMIN_ID;
use ironward_lib::{AppConfig, AppState, CollectionName};
use serde_json::json;
#[path = "util.rs"]
mod util;

async fn seed_inmates(state: &AppState, count: usize) -> Result<()> {
    for n in 0..count {
        state
            .inmates
            .add(util::inmate(&format!("Inmate {n}")), &util::officer())
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn snapshot_round_trip_reproduces_every_collection() -> Result<()> {
    let (_dir, state) = util::memory_state();
    seed_inmates(&state, 3).await?;
    state.wards.add(util::ward("North", 8), &util::officer()).await?;

    let snapshot = backup::create_snapshot(&state.store).await?;
    let bytes = snapshot.to_json_pretty()?;
    let parsed = parse_snapshot(&bytes)?;

    for name in CollectionName::ALL {
        let stored = if name == CollectionName::Users {
            serde_json::to_value(state.users.get_all().await?)?
                .as_array()
                .cloned()
                .unwrap_or_default()
        } else {
            state.store.get(name, Vec::new()).await?
        };
        assert_eq!(parsed.collection(name), Some(stored.as_slice()), "{name}");
    }

    let text = String::from_utf8(bytes)?;
    let users_at = text.find("\"users\"").expect("users key");
    let favorites_at = text.find("\"favorites\"").expect("favorites key");
    assert!(users_at < favorites_at, "collections keep enumerated order");
    Ok(())
}

#[tokio::test]
async fn restoring_a_fresh_systems_backup_keeps_admin_login() -> Result<()> {
    let (_dir, state) = util::memory_state();
    login(&state, "admin", "123").await?;

    let snapshot = backup::create_snapshot(&state.store).await?;
    assert_eq!(snapshot.collection(CollectionName::Users).map(<[_]>::len), Some(1));
    let parsed = parse_snapshot(&snapshot.to_json_pretty()?)?;
    restore(&state.store, prepare_restore(parsed).confirm(), RestoreMode::Replace).await?;

    let admin = login(&state, "admin", "123").await?;
    assert_eq!(admin.id, SEED_ADMIN_ID);
    assert_eq!(state.users.get_all().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn restore_replaces_rather_than_merges() -> Result<()> {
    let (_dir, state) = util::memory_state();
    seed_inmates(&state, 5).await?;

    let snapshot = parse_snapshot(
        json!({"version": "1.0.0", "createdAt": "2024-01-01T00:00:00Z", "inmates": []})
            .to_string()
            .as_bytes(),
    )?;
    let pending = prepare_restore(snapshot);
    assert_eq!(pending.preview().counts.get(&CollectionName::Inmates), Some(&0));
    restore(&state.store, pending.confirm(), RestoreMode::default()).await?;

    assert!(state.inmates.get_all().await?.is_empty());
    assert!(state.audit.entries().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn merge_restore_keeps_unrelated_records() -> Result<()> {
    let (_dir, state) = util::memory_state();
    seed_inmates(&state, 2).await?;
    let before = state.inmates.get_all().await?;

    let mut changed = serde_json::to_value(&before[0])?;
    changed["fullName"] = json!("Renamed In Snapshot");
    let snapshot = parse_snapshot(
        json!({
            "version": "1.0.0",
            "createdAt": "2024-01-01T00:00:00Z",
            "inmates": [changed, {"id": "from-backup", "fullName": "Restored Person"}]
        })
        .to_string()
        .as_bytes(),
    )?;
    restore(&state.store, prepare_restore(snapshot).confirm(), RestoreMode::Merge).await?;

    let after = state.inmates.get_all().await?;
    assert_eq!(after.len(), 3);
    assert_eq!(after[0].full_name, "Renamed In Snapshot");
    assert_eq!(after[1], before[1]);
    assert_eq!(after[2].id, "from-backup");
    assert_eq!(state.audit.entries().await?.len(), 2, "logs absent from snapshot");
    Ok(())
}

#[tokio::test]
async fn invalid_snapshots_are_rejected_before_anything_is_written() -> Result<()> {
    let (_dir, state) = util::memory_state();
    seed_inmates(&state, 2).await?;

    let cases: [(&str, &str); 5] = [
        ("not json at all", BACKUP_INVALID_FORMAT),
        ("[1, 2, 3]", BACKUP_INVALID_FORMAT),
        (r#"{"createdAt": "x", "inmates": []}"#, BACKUP_INVALID_FORMAT),
        (r#"{"version": "1.0.0", "inmates": {"id": "x"}}"#, BACKUP_INVALID_FORMAT),
        (r#"{"version": "2.0.0", "inmates": []}"#, BACKUP_UNSUPPORTED_VERSION),
    ];
    for (text, code) in cases {
        let err = parse_snapshot(text.as_bytes()).unwrap_err();
        assert_eq!(err.code(), code, "{text}");
    }
    assert_eq!(state.inmates.get_all().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn reset_leaves_only_the_seed_admin() -> Result<()> {
    let (_dir, state) = util::memory_state();
    seed_inmates(&state, 2).await?;
    reset_system(&state.store).await?;

    for name in CollectionName::ALL {
        let records = state.store.get(name, Vec::new()).await?;
        if name == CollectionName::Users {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["id"], SEED_ADMIN_ID);
        } else {
            assert!(records.is_empty(), "{name} should be empty");
        }
    }
    Ok(())
}

#[tokio::test]
async fn snapshot_files_are_written_listed_and_pruned() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = AppConfig::with_data_dir(dir.path());
    config.backup_max_count = 2;
    config.fake_free_bytes = Some(u64::MAX);
    let state = AppState::in_memory(config)?;
    seed_inmates(&state, 1).await?;

    let mut written = Vec::new();
    for _ in 0..3 {
        written.push(backup::write_snapshot_file(&state.store, &state.config).await?);
    }
    assert!(written.iter().all(|entry| entry.sha256.is_some()));

    let listed = backup::list_snapshot_files(&state.config.backup_dir()).await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].file_name, written[2].file_name);

    let restored = backup::read_snapshot_file(std::path::Path::new(&listed[0].path)).await?;
    assert_eq!(restored.collection(CollectionName::Inmates).map(<[_]>::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn low_disk_refuses_to_write() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = AppConfig::with_data_dir(dir.path());
    config.fake_free_bytes = Some(10);
    let state = AppState::in_memory(config)?;

    let err = backup::write_snapshot_file(&state.store, &state.config)
        .await
        .unwrap_err();
    assert_eq!(err.code(), BACKUP_LOW_DISK);
    assert!(backup::list_snapshot_files(&state.config.backup_dir())
        .await?
        .is_empty());
    Ok(())
}
