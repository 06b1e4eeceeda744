use anyhow::Result;
use ironward_lib::error::STORE_WRITE_FAILED;
use ironward_lib::store::CollectionState;
use ironward_lib::CollectionName;
use serde_json::json;
#[path = "util.rs"]
mod util;

async fn write_raw(state: &ironward_lib::AppState, name: &str, payload: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO collections (name, payload, updated_at) VALUES (?, ?, 'test')
         ON CONFLICT(name) DO UPDATE SET payload = excluded.payload",
    )
    .bind(name)
    .bind(payload)
    .execute(state.pool())
    .await?;
    Ok(())
}

#[tokio::test]
async fn non_json_payload_falls_back_to_default() -> Result<()> {
    let (_dir, state) = util::memory_state();
    write_raw(&state, "inmates", "this is not json").await?;

    assert!(state.inmates.get_all().await?.is_empty());
    let fallback = state
        .store
        .get(CollectionName::Inmates, vec![json!({"id": "fallback"})])
        .await?;
    assert_eq!(fallback, vec![json!({"id": "fallback"})]);
    assert!(matches!(
        state.store.inspect(CollectionName::Inmates).await?,
        CollectionState::Corrupt { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn object_payload_is_not_an_array() -> Result<()> {
    let (_dir, state) = util::memory_state();
    write_raw(&state, "wards", r#"{"id": "w-1", "name": "North"}"#).await?;

    assert!(state.wards.get_all().await?.is_empty());
    match state.store.inspect(CollectionName::Wards).await? {
        CollectionState::Corrupt { reason } => assert!(reason.contains("object"), "{reason}"),
        other => panic!("expected corrupt, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn corrupt_users_still_yield_the_seed_admin() -> Result<()> {
    let (_dir, state) = util::memory_state();
    write_raw(&state, "users", "[{").await?;

    let users = state.users.get_all().await?;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "admin");
    Ok(())
}

#[tokio::test]
async fn corrupt_payload_is_quarantined_before_overwrite() -> Result<()> {
    let (_dir, state) = util::memory_state();
    write_raw(&state, "wards", "garbage").await?;

    let saved = state
        .wards
        .add(util::ward("North", 10), &util::officer())
        .await?;
    assert_eq!(saved.records.len(), 1);

    let quarantined = state.store.quarantined(CollectionName::Wards).await?;
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, "garbage");
    assert_eq!(
        state.store.inspect(CollectionName::Wards).await?,
        CollectionState::Valid { len: 1 }
    );
    Ok(())
}

#[tokio::test]
async fn one_mistyped_record_is_quarantined_not_lost() -> Result<()> {
    let (_dir, state) = util::memory_state();
    let hand_edited = r#"[{"id":"w1","name":"North","capacity":10},{"id":"w2","name":"South","capacity":8},{"id":"w3","name":"East","capacity":"ten"}]"#;
    write_raw(&state, "wards", hand_edited).await?;
    assert!(state.wards.get_all().await?.is_empty());

    let saved = state
        .wards
        .add(util::ward("West", 6), &util::officer())
        .await?;
    assert_eq!(saved.records.len(), 1);

    let quarantined = state.store.quarantined(CollectionName::Wards).await?;
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, hand_edited);
    assert!(quarantined[0].reason.contains("schema"), "{}", quarantined[0].reason);

    state
        .wards
        .add(util::ward("Annex", 2), &util::officer())
        .await?;
    assert_eq!(
        state.store.quarantined(CollectionName::Wards).await?.len(),
        1,
        "a readable collection is not quarantined again"
    );
    Ok(())
}

#[tokio::test]
async fn failed_write_is_surfaced_and_keeps_stored_records() -> Result<()> {
    let (_dir, state) = util::memory_state();
    let actor = util::officer();
    state.wards.add(util::ward("North", 10), &actor).await?;
    sqlx::query(
        "CREATE TRIGGER wards_read_only BEFORE UPDATE ON collections
         WHEN NEW.name = 'wards'
         BEGIN SELECT RAISE(ABORT, 'wards are read-only'); END",
    )
    .execute(state.pool())
    .await?;

    let err = state
        .wards
        .add(util::ward("South", 8), &actor)
        .await
        .unwrap_err();
    assert_eq!(err.code(), STORE_WRITE_FAILED);

    let stored = state.wards.get_all().await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "North");
    Ok(())
}

#[tokio::test]
async fn reopening_the_database_reproduces_collections() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let first = {
        let state = util::disk_state(dir.path());
        state
            .inmates
            .add(util::inmate("Sample Person"), &util::officer())
            .await?;
        let all = state.inmates.get_all().await?;
        state.close().await;
        all
    };

    let state = util::disk_state(dir.path());
    assert_eq!(state.inmates.get_all().await?, first);
    assert_eq!(state.audit.entries().await?.len(), 1);
    state.close().await;
    Ok(())
}
