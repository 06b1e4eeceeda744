use std::collections::HashSet;

use anyhow::Result;
use ironward_lib::model::{AuditAction, Movement, MovementType};
#[path = "util.rs"]
mod util;

const WRITERS: usize = 8;
const PER_WRITER: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_never_lose_records() -> Result<()> {
    let (_dir, state) = util::memory_state();

    let mut tasks = Vec::new();
    for writer in 0..WRITERS {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let actor = util::officer();
            for n in 0..PER_WRITER {
                let movement = Movement {
                    id: String::new(),
                    inmate_id: format!("i-{writer}"),
                    inmate_name: format!("Writer {writer}"),
                    movement_type: MovementType::Court,
                    destination: format!("Court {n}"),
                    check_out_time: "2024-06-01T08:00:00Z".into(),
                    check_in_time: None,
                    officer_name: "Officer Salem".into(),
                    is_completed: false,
                    extra: Default::default(),
                };
                state.movements.add(movement, &actor).await?;
            }
            anyhow::Ok(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let all = state.movements.get_all().await?;
    assert_eq!(all.len(), WRITERS * PER_WRITER);
    let ids: HashSet<_> = all.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids.len(), all.len());

    let creates = state
        .audit
        .entries()
        .await?
        .into_iter()
        .filter(|entry| entry.action == AuditAction::Create)
        .count();
    assert_eq!(creates, WRITERS * PER_WRITER);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_respect_capacity() -> Result<()> {
    let (_dir, state) = util::memory_state();
    let actor = util::officer();
    let ward = state.wards.add(util::ward("North", 5), &actor).await?.record;

    let mut tasks = Vec::new();
    for _ in 0..9 {
        let state = state.clone();
        let id = ward.id.clone();
        tasks.push(tokio::spawn(async move {
            state.wards.increment_count(&id, &util::officer()).await
        }));
    }
    let mut accepted = 0;
    for task in tasks {
        if task.await?.is_ok() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 5);
    let stored = state.wards.get_by_id(&ward.id).await?.expect("ward");
    assert_eq!(stored.current_count, 5);
    Ok(())
}
