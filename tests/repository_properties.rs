#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;

use ironward_lib::model::{Visit, WantedPerson};
use ironward_lib::repo::UpdateOutcome;
use proptest::prelude::*;
#[path = "util.rs"]
mod util;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("create tokio runtime")
}

fn visit(inmate_id: &str, visitor: &str) -> Visit {
    Visit {
        inmate_id: inmate_id.to_string(),
        visitor_name: visitor.to_string(),
        relation: "Brother".into(),
        visit_date: "2024-05-02".into(),
        ..Visit::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn added_records_come_back_exactly_once(
        names in prop::collection::vec("[A-Za-z][A-Za-z ]{0,23}", 1..12),
    ) {
        runtime().block_on(async move {
            let (_dir, state) = util::memory_state();
            let actor = util::officer();
            let mut saved = Vec::new();
            for name in &names {
                saved.push(state.visits.add(visit("i-1", name), &actor).await.unwrap().record);
            }

            let all = state.visits.get_all().await.unwrap();
            assert_eq!(all.len(), names.len());
            for record in &saved {
                let matches: Vec<_> = all.iter().filter(|r| r.id == record.id).collect();
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0], record);
            }
            let ids: HashSet<_> = all.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids.len(), all.len());
        });
    }

    #[test]
    fn unknown_ids_change_nothing(count in 0usize..6, ghost in "[a-z0-9-]{1,36}") {
        runtime().block_on(async move {
            let (_dir, state) = util::memory_state();
            let actor = util::officer();
            for n in 0..count {
                state.visits.add(visit("i-1", &format!("Visitor {n}")), &actor).await.unwrap();
            }
            let before = state.visits.get_all().await.unwrap();
            let audit_before = state.audit.entries().await.unwrap().len();

            let mut stranger = visit("i-1", "Nobody");
            stranger.id = format!("ghost-{ghost}");
            let outcome = state.visits.update(stranger.clone(), &actor).await.unwrap();
            assert!(matches!(outcome, UpdateOutcome::NotFound));
            let after_delete = state.visits.delete(&stranger.id, &actor).await.unwrap();

            assert_eq!(after_delete, before);
            assert_eq!(state.visits.get_all().await.unwrap(), before);
            assert_eq!(state.audit.entries().await.unwrap().len(), audit_before);
        });
    }

    #[test]
    fn deleting_twice_equals_deleting_once(count in 1usize..6, pick in 0usize..6) {
        runtime().block_on(async move {
            let (_dir, state) = util::memory_state();
            let actor = util::officer();
            for n in 0..count {
                state.visits.add(visit("i-1", &format!("Visitor {n}")), &actor).await.unwrap();
            }
            let all = state.visits.get_all().await.unwrap();
            let id = all[pick % all.len()].id.clone();

            let once = state.visits.delete(&id, &actor).await.unwrap();
            let twice = state.visits.delete(&id, &actor).await.unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.len(), count - 1);
            assert!(once.iter().all(|r| r.id != id));
        });
    }
}

#[tokio::test]
async fn update_replaces_the_whole_record() {
    let (_dir, state) = util::memory_state();
    let actor = util::officer();
    let saved = state.visits.add(visit("i-1", "Aisha"), &actor).await.unwrap();

    let mut edited = saved.record.clone();
    edited.visitor_name = "Aisha K.".into();
    edited.notes = Some("brought documents".into());
    let outcome = state.visits.update(edited.clone(), &actor).await.unwrap();

    match outcome {
        UpdateOutcome::Updated(records) => assert_eq!(records, vec![edited.clone()]),
        UpdateOutcome::NotFound => panic!("record should exist"),
    }
    assert_eq!(state.visits.get_by_id(&edited.id).await.unwrap(), Some(edited));
}

#[tokio::test]
async fn validation_rejects_blank_required_fields() {
    let (_dir, state) = util::memory_state();
    let err = state
        .visits
        .add(visit("", "Aisha"), &util::officer())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ironward_lib::error::VALIDATION_REQUIRED_FIELD);
    assert!(state.visits.get_all().await.unwrap().is_empty());
    assert!(state.audit.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn wanted_search_ignores_case_and_width() {
    let (_dir, state) = util::memory_state();
    let actor = util::officer();
    for name in ["Khalid Nasser", "Omar Said", "ＫＨＡＬＩＤ Omar"] {
        let person = WantedPerson {
            full_name: name.into(),
            national_id: "77".into(),
            case_type: "Fraud".into(),
            ..WantedPerson::default()
        };
        state.wanted.add(person, &actor).await.unwrap();
    }

    let hits = state.wanted.search_by_name("khalid").await.unwrap();
    let names: Vec<_> = hits.iter().map(|p| p.full_name.as_str()).collect();
    assert_eq!(names, vec!["Khalid Nasser", "ＫＨＡＬＩＤ Omar"]);
    assert_eq!(state.wanted.search_by_name("  ").await.unwrap().len(), 3);
}
