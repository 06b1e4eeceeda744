//! Typed repositories over the collection store.
//!
//! A [`Repository<T>`] owns no data. Every call reads the collection, edits it
//! in memory and writes the whole array back under the collection's mutex, then
//! records an audit entry. The returned arrays are owned copies.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::audit::AuditLog;
use crate::collections::CollectionName;
use crate::error::VALIDATION_INVALID_VALUE;
use crate::id::new_record_id;
use crate::model::{
    Actor, AuditAction, Belonging, BehaviorReport, Case, Inmate, InmateStatus,
    InspectionRecord, InvestigationMinute, Movement, User, Visit, WantedPerson, Ward,
};
use crate::store::{CollectionStore, Edit};
use crate::time::now_rfc3339;
use crate::{AppError, AppResult};

/// An entity that lives in exactly one collection and is keyed by `id`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: CollectionName;
    /// Prefix used in audit targets, e.g. `Inmate: <name>`.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    fn validate(&self) -> AppResult<()> {
        Ok(())
    }

    fn label(&self) -> String;

    fn describe(&self) -> String {
        format!("{}: {}", Self::KIND, self.label())
    }

    /// Fill `createdAt` on entities that carry one.
    fn stamp_created(&mut self, _at: &str) {}

    /// What `get_all` yields when the collection is absent or unreadable.
    fn default_records() -> Vec<Self> {
        Vec::new()
    }
}

/// Records hanging off an inmate through `inmateId`.
pub trait OwnedByInmate {
    fn inmate_id(&self) -> &str;
}

macro_rules! owned_by_inmate {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl OwnedByInmate for $ty {
                fn inmate_id(&self) -> &str {
                    &self.inmate_id
                }
            }
        )+
    };
}

owned_by_inmate!(
    InspectionRecord,
    Belonging,
    Case,
    InvestigationMinute,
    Movement,
    Visit,
    BehaviorReport,
);

#[derive(Debug, Clone)]
pub struct Saved<T> {
    pub record: T,
    pub records: Vec<T>,
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome<T> {
    Updated(Vec<T>),
    NotFound,
}

impl<T> UpdateOutcome<T> {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

pub struct Repository<T> {
    store: Arc<CollectionStore>,
    audit: AuditLog,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: self.audit.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: Arc<CollectionStore>, audit: AuditLog) -> Self {
        Self {
            store,
            audit,
            _record: PhantomData,
        }
    }

    pub async fn get_all(&self) -> AppResult<Vec<T>> {
        self.store
            .get_typed(T::COLLECTION, T::default_records())
            .await
    }

    pub async fn get_by_id(&self, id: &str) -> AppResult<Option<T>> {
        Ok(self.get_all().await?.into_iter().find(|r| r.id() == id))
    }

    /// Persist `draft` under a fresh id. Any id already on the draft is ignored.
    pub async fn add(&self, mut draft: T, actor: &Actor) -> AppResult<Saved<T>> {
        draft.validate()?;
        draft.stamp_created(&now_rfc3339());

        let outcome = self
            .store
            .mutate(T::COLLECTION, T::default_records(), |records: &mut Vec<T>| {
                let mut id = new_record_id();
                while records.iter().any(|r| r.id() == id) {
                    id = new_record_id();
                }
                draft.set_id(id);
                records.push(draft.clone());
                Ok(Edit::Changed(draft))
            })
            .await?;

        tracing::debug!(
            target: "ironward",
            event = "record_added",
            collection = %T::COLLECTION,
            id = %outcome.output.id()
        );
        self.audit
            .record(AuditAction::Create, outcome.output.describe(), actor)
            .await;
        Ok(Saved {
            record: outcome.output,
            records: outcome.records,
        })
    }

    /// Replace the stored record carrying `record.id`.
    pub async fn update(&self, record: T, actor: &Actor) -> AppResult<UpdateOutcome<T>> {
        record.validate()?;
        let target = record.describe();
        let id = record.id().to_string();

        let outcome = self
            .store
            .mutate(T::COLLECTION, T::default_records(), |records: &mut Vec<T>| {
                match records.iter_mut().find(|r| r.id() == record.id()) {
                    Some(slot) => {
                        *slot = record;
                        Ok(Edit::Changed(true))
                    }
                    None => Ok(Edit::Unchanged(false)),
                }
            })
            .await?;

        if !outcome.output {
            tracing::debug!(
                target: "ironward",
                event = "record_update_not_found",
                collection = %T::COLLECTION,
                id = %id
            );
            return Ok(UpdateOutcome::NotFound);
        }
        self.audit.record(AuditAction::Update, target, actor).await;
        Ok(UpdateOutcome::Updated(outcome.records))
    }

    /// Edit the record with `id` in place. `None` when no such record exists.
    pub async fn modify<F>(&self, id: &str, actor: &Actor, f: F) -> AppResult<Option<T>>
    where
        F: FnOnce(&mut T) -> AppResult<()>,
    {
        let outcome = self
            .store
            .mutate(T::COLLECTION, T::default_records(), |records: &mut Vec<T>| {
                let Some(slot) = records.iter_mut().find(|r| r.id() == id) else {
                    return Ok(Edit::Unchanged(None));
                };
                let mut edited = slot.clone();
                f(&mut edited)?;
                edited.set_id(id.to_string());
                edited.validate()?;
                *slot = edited.clone();
                Ok(Edit::Changed(Some(edited)))
            })
            .await?;

        if let Some(record) = &outcome.output {
            self.audit
                .record(AuditAction::Update, record.describe(), actor)
                .await;
        }
        Ok(outcome.output)
    }

    /// Remove the record with `id`. Deleting an unknown id writes nothing.
    pub async fn delete(&self, id: &str, actor: &Actor) -> AppResult<Vec<T>> {
        let outcome = self
            .store
            .mutate(T::COLLECTION, T::default_records(), |records: &mut Vec<T>| {
                match records.iter().position(|r| r.id() == id) {
                    Some(index) => {
                        let removed = records.remove(index);
                        records.retain(|r| r.id() != id);
                        Ok(Edit::Changed(Some(removed.describe())))
                    }
                    None => Ok(Edit::Unchanged(None)),
                }
            })
            .await?;

        if let Some(target) = outcome.output {
            self.audit.record(AuditAction::Delete, target, actor).await;
        }
        Ok(outcome.records)
    }
}

impl<T: Record + OwnedByInmate> Repository<T> {
    pub async fn get_by_inmate(&self, inmate_id: &str) -> AppResult<Vec<T>> {
        let mut records = self.get_all().await?;
        records.retain(|r| r.inmate_id() == inmate_id);
        Ok(records)
    }
}

impl Repository<Inmate> {
    pub async fn update_status(
        &self,
        id: &str,
        status: InmateStatus,
        actor: &Actor,
    ) -> AppResult<Option<Inmate>> {
        self.modify(id, actor, |inmate| {
            inmate.status = status;
            Ok(())
        })
        .await
    }
}

impl Repository<Ward> {
    /// Add one occupant; refuses when the ward is already at capacity.
    pub async fn increment_count(&self, id: &str, actor: &Actor) -> AppResult<Option<Ward>> {
        self.modify(id, actor, |ward| {
            if ward.is_full() {
                return Err(AppError::new(VALIDATION_INVALID_VALUE, "Ward is full")
                    .with_context("wardId", ward.id.clone())
                    .with_context("capacity", ward.capacity.to_string()));
            }
            ward.current_count += 1;
            Ok(())
        })
        .await
    }

    /// Remove one occupant; a ward already at zero is left untouched.
    pub async fn decrement_count(&self, id: &str, actor: &Actor) -> AppResult<Option<Ward>> {
        let Some(ward) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        if ward.current_count == 0 {
            return Ok(Some(ward));
        }
        self.modify(id, actor, |ward| {
            ward.current_count = ward.current_count.saturating_sub(1);
            Ok(())
        })
        .await
    }
}

impl Repository<InvestigationMinute> {
    pub async fn get_by_case(&self, case_id: &str) -> AppResult<Vec<InvestigationMinute>> {
        let mut minutes = self.get_all().await?;
        minutes.retain(|m| m.case_id == case_id);
        Ok(minutes)
    }
}

pub(crate) fn fold_name(value: &str) -> String {
    value.trim().nfkc().collect::<String>().to_lowercase()
}

impl Repository<WantedPerson> {
    /// Case-insensitive substring match on the full name or national id.
    pub async fn search_by_name(&self, query: &str) -> AppResult<Vec<WantedPerson>> {
        let needle = fold_name(query);
        let mut people = self.get_all().await?;
        if needle.is_empty() {
            return Ok(people);
        }
        people.retain(|p| fold_name(&p.full_name).contains(&needle) || p.national_id.contains(&needle));
        Ok(people)
    }
}

impl Repository<User> {
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<User>> {
        let wanted = name.trim();
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|u| u.name == wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::model::{seed_admin, CaseStatus};

    fn repos() -> (Arc<CollectionStore>, AuditLog) {
        let store = Arc::new(CollectionStore::new(open_memory_pool().expect("pool")));
        let audit = AuditLog::new(Arc::clone(&store));
        (store, audit)
    }

    fn ward(name: &str, capacity: u32) -> Ward {
        Ward {
            name: name.into(),
            capacity,
            ..Ward::default()
        }
    }

    #[tokio::test]
    async fn add_assigns_fresh_id_and_created_at() {
        let (store, audit) = repos();
        let wards: Repository<Ward> = Repository::new(store, audit);
        let mut draft = ward("A", 10);
        draft.id = "caller-chosen".into();
        let saved = wards.add(draft, &Actor::system()).await.expect("add");
        assert_ne!(saved.record.id, "caller-chosen");
        assert!(saved.record.created_at.is_some());
        assert_eq!(saved.records.len(), 1);
        assert_eq!(
            wards.get_by_id(&saved.record.id).await.expect("get"),
            Some(saved.record)
        );
    }

    #[tokio::test]
    async fn update_and_delete_of_unknown_id_are_noops() {
        let (store, audit) = repos();
        let cases: Repository<Case> = Repository::new(store, audit.clone());
        let actor = Actor::system();
        let saved = cases
            .add(
                Case {
                    inmate_id: "i-1".into(),
                    case_title: "Theft".into(),
                    ..Case::default()
                },
                &actor,
            )
            .await
            .expect("add");

        let mut ghost = saved.record.clone();
        ghost.id = "missing".into();
        ghost.status = CaseStatus::Closed;
        let outcome = cases.update(ghost, &actor).await.expect("update");
        assert!(!outcome.is_updated());

        let after = cases.delete("missing", &actor).await.expect("delete");
        assert_eq!(after, vec![saved.record]);
        assert_eq!(audit.entries().await.expect("entries").len(), 1);
    }

    #[tokio::test]
    async fn users_default_to_seed_admin() {
        let (store, audit) = repos();
        let users: Repository<User> = Repository::new(store, audit);
        let all = users.get_all().await.expect("users");
        assert_eq!(all, vec![seed_admin()]);
        assert!(users.find_by_name(" admin ").await.expect("find").is_some());
        assert!(users.find_by_name("Admin").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn ward_counts_respect_capacity_and_zero() {
        let (store, audit) = repos();
        let wards: Repository<Ward> = Repository::new(store, audit);
        let actor = Actor::system();
        let id = wards.add(ward("B", 1), &actor).await.expect("add").record.id;

        let ward = wards.increment_count(&id, &actor).await.expect("inc");
        assert_eq!(ward.map(|w| w.current_count), Some(1));
        let err = wards.increment_count(&id, &actor).await.unwrap_err();
        assert_eq!(err.code(), VALIDATION_INVALID_VALUE);

        wards.decrement_count(&id, &actor).await.expect("dec");
        let ward = wards.decrement_count(&id, &actor).await.expect("dec at zero");
        assert_eq!(ward.map(|w| w.current_count), Some(0));
        assert!(wards
            .increment_count("nope", &actor)
            .await
            .expect("unknown")
            .is_none());
    }

    #[tokio::test]
    async fn wanted_search_folds_case_and_width() {
        let (store, audit) = repos();
        let wanted: Repository<WantedPerson> = Repository::new(store, audit);
        let actor = Actor::system();
        for name in ["Omar Saleh", "ＯＭＡＲ Haddad", "Khalid Nasser"] {
            wanted
                .add(
                    WantedPerson {
                        full_name: name.into(),
                        ..WantedPerson::default()
                    },
                    &actor,
                )
                .await
                .expect("add");
        }
        let hits = wanted.search_by_name("omar").await.expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(wanted.search_by_name("  ").await.expect("search").len(), 3);
    }
}
