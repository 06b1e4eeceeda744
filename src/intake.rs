//! Intake workflow spanning several collections.
//!
//! Each step is its own collection write; there is no cross-collection
//! transaction. Steps are ordered so an interruption leaves referents in
//! place before anything points at them.

use serde::Serialize;

use crate::attachments::AttachmentRef;
use crate::error::{VALIDATION_INVALID_VALUE, VALIDATION_MISSING_REFERENCE};
use crate::model::{
    Actor, Belonging, BehaviorReport, Case, Inmate, InmateStatus, InspectionRecord,
    InvestigationMinute, Movement, Visit, Ward,
};
use crate::state::AppState;
use crate::{AppError, AppResult};

fn missing(kind: &'static str, id: &str) -> AppError {
    AppError::new(
        VALIDATION_MISSING_REFERENCE,
        format!("{kind} does not exist"),
    )
    .with_context("kind", kind)
    .with_context("id", id.to_string())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionOutcome {
    pub inspection: InspectionRecord,
    pub belongings: Vec<Belonging>,
    pub inmate: Inmate,
}

/// Record a preventive-security inspection and the items taken from the inmate.
///
/// Belongings go to their own collection with `inmateId` and `inspectionId`
/// set; nothing is embedded on the inmate or the inspection.
pub async fn record_inspection(
    state: &AppState,
    inmate_id: &str,
    mut inspection: InspectionRecord,
    belongings: Vec<Belonging>,
    actor: &Actor,
) -> AppResult<InspectionOutcome> {
    let mut inmate = state
        .inmates
        .get_by_id(inmate_id)
        .await?
        .ok_or_else(|| missing("Inmate", inmate_id))?;

    inspection.inmate_id = inmate_id.to_string();
    let inspection = state.inspections.add(inspection, actor).await?.record;

    let mut saved = Vec::with_capacity(belongings.len());
    for mut belonging in belongings {
        belonging.inmate_id = inmate_id.to_string();
        belonging.inspection_id = Some(inspection.id.clone());
        saved.push(state.belongings.add(belonging, actor).await?.record);
    }

    if inmate.status == InmateStatus::Processing {
        if let Some(updated) = state
            .inmates
            .update_status(inmate_id, InmateStatus::Inspected, actor)
            .await?
        {
            inmate = updated;
        }
    }

    tracing::info!(
        target: "ironward",
        event = "inspection_recorded",
        inmate_id = %inmate_id,
        inspection_id = %inspection.id,
        belongings = saved.len()
    );
    Ok(InspectionOutcome {
        inspection,
        belongings: saved,
        inmate,
    })
}

/// House an inmate in `ward_id`, moving occupancy from any previous ward.
pub async fn assign_ward(
    state: &AppState,
    inmate_id: &str,
    ward_id: &str,
    actor: &Actor,
) -> AppResult<Inmate> {
    let inmate = state
        .inmates
        .get_by_id(inmate_id)
        .await?
        .ok_or_else(|| missing("Inmate", inmate_id))?;
    let ward: Ward = state
        .wards
        .get_by_id(ward_id)
        .await?
        .ok_or_else(|| missing("Ward", ward_id))?;

    let previous = inmate.ward_id.clone().filter(|id| !id.is_empty());
    let moving = previous.as_deref() != Some(ward_id);

    if moving {
        if ward.is_full() {
            return Err(AppError::new(VALIDATION_INVALID_VALUE, "Ward is full")
                .with_context("wardId", ward_id.to_string())
                .with_context("capacity", ward.capacity.to_string()));
        }
        state.wards.increment_count(ward_id, actor).await?;
    }

    let housed = state
        .inmates
        .modify(inmate_id, actor, |inmate| {
            inmate.ward_id = Some(ward_id.to_string());
            inmate.status = InmateStatus::Housed;
            Ok(())
        })
        .await
        .and_then(|inmate| inmate.ok_or_else(|| missing("Inmate", inmate_id)));

    let housed = match housed {
        Ok(inmate) => inmate,
        Err(err) => {
            if moving {
                // Give the seat back before reporting the failure.
                if let Err(undo) = state.wards.decrement_count(ward_id, actor).await {
                    undo.log_with_event("ward_count_compensation_failed");
                }
            }
            return Err(err);
        }
    };

    if moving {
        if let Some(previous) = previous {
            // The move is stored; a stale count on the old ward is only logged.
            if let Err(err) = state.wards.decrement_count(&previous, actor).await {
                err.with_context("wardId", previous.clone())
                    .log_with_event("ward_count_compensation_failed");
            }
        }
    }

    tracing::info!(
        target: "ironward",
        event = "inmate_housed",
        inmate_id = %inmate_id,
        ward_id = %ward_id
    );
    Ok(housed)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InmateProfile {
    pub inmate: Inmate,
    pub ward: Option<Ward>,
    pub inspections: Vec<InspectionRecord>,
    pub belongings: Vec<Belonging>,
    pub cases: Vec<Case>,
    pub minutes: Vec<InvestigationMinute>,
    pub movements: Vec<Movement>,
    pub visits: Vec<Visit>,
    pub reports: Vec<BehaviorReport>,
    pub attachments: Vec<AttachmentRef>,
}

/// Everything recorded about one inmate; `None` if the inmate does not exist.
pub async fn inmate_profile(state: &AppState, inmate_id: &str) -> AppResult<Option<InmateProfile>> {
    let Some(inmate) = state.inmates.get_by_id(inmate_id).await? else {
        return Ok(None);
    };
    let ward = match inmate.ward_id.as_deref() {
        Some(ward_id) => state.wards.get_by_id(ward_id).await?,
        None => None,
    };

    Ok(Some(InmateProfile {
        ward,
        inspections: state.inspections.get_by_inmate(inmate_id).await?,
        belongings: state.belongings.get_by_inmate(inmate_id).await?,
        cases: state.cases.get_by_inmate(inmate_id).await?,
        minutes: state.minutes.get_by_inmate(inmate_id).await?,
        movements: state.movements.get_by_inmate(inmate_id).await?,
        visits: state.visits.get_by_inmate(inmate_id).await?,
        reports: state.reports.get_by_inmate(inmate_id).await?,
        attachments: state.attachments.list_for_owner(inmate_id).await?,
        inmate,
    }))
}
