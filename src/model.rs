//! Entity records stored in the collections.
//!
//! Every record keeps attributes it does not know about in `extra`, so a
//! read-modify-write through a repository never drops data written by a newer
//! build or by the raw console.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collections::CollectionName;
use crate::error::{VALIDATION_INVALID_VALUE, VALIDATION_REQUIRED_FIELD};
use crate::repo::Record;
use crate::{AppError, AppResult};

pub type Extra = Map<String, Value>;

/// Who performed an audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// Operations run by the process itself (CLI, recovery).
    pub fn system() -> Self {
        Self::new("system", "system")
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id.clone(), user.name.clone())
    }
}

fn require(collection: CollectionName, field: &'static str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(
            AppError::new(VALIDATION_REQUIRED_FIELD, format!("{field} is required"))
                .with_context("collection", collection.as_str())
                .with_context("field", field),
        );
    }
    Ok(())
}

fn stamp(slot: &mut Option<String>, at: &str) {
    if slot.is_none() {
        *slot = Some(at.to_string());
    }
}

// ---------------------------------------------------------------------------
// Users

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Admin,
    Officer,
    Investigator,
    Security,
    Intel,
    Secretary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Department {
    /// Sees every section.
    #[default]
    GeneralAdmin,
    PrisonAdmin,
    Investigations,
    InfoDept,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub department: Department,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Stored as entered; see DESIGN.md.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

pub const SEED_ADMIN_ID: &str = "admin";
pub const SEED_ADMIN_NAME: &str = "admin";
const SEED_ADMIN_PASSWORD: &str = "123";

/// The account present on a fresh or reset system.
pub fn seed_admin() -> User {
    User {
        id: SEED_ADMIN_ID.to_string(),
        name: SEED_ADMIN_NAME.to_string(),
        role: UserRole::Admin,
        department: Department::GeneralAdmin,
        password: Some(SEED_ADMIN_PASSWORD.to_string()),
        ..User::default()
    }
}

impl Record for User {
    const COLLECTION: CollectionName = CollectionName::Users;
    const KIND: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "name", &self.name)
    }
    fn label(&self) -> String {
        self.name.clone()
    }
    fn default_records() -> Vec<Self> {
        vec![seed_admin()]
    }
}

// ---------------------------------------------------------------------------
// Inmates

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InmateStatus {
    #[default]
    Processing,
    Inspected,
    ReadyForHousing,
    #[serde(alias = "DETAINED")]
    Housed,
    Hospitalized,
    Investigation,
    Released,
    Transferred,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inmate {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub inmate_type: Option<String>,
    #[serde(default)]
    pub national_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default)]
    pub entry_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub status: InmateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governorate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub referring_authority: String,
    #[serde(default)]
    pub primary_charge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for Inmate {
    const COLLECTION: CollectionName = CollectionName::Inmates;
    const KIND: &'static str = "Inmate";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "fullName", &self.full_name)
    }
    fn label(&self) -> String {
        self.full_name.clone()
    }
    fn stamp_created(&mut self, at: &str) {
        stamp(&mut self.created_at, at);
    }
}

// ---------------------------------------------------------------------------
// Preventive security

/// Belongings are not embedded here; they live in `belongings` keyed by inmate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    #[serde(default)]
    pub id: String,
    pub inmate_id: String,
    #[serde(default)]
    pub is_physically_inspected: String,
    #[serde(default)]
    pub physical_notes: String,
    #[serde(default)]
    pub is_belongings_inspected: String,
    #[serde(default)]
    pub is_docs_inspected: String,
    #[serde(default)]
    pub initial_intel: String,
    #[serde(default)]
    pub security_intel: String,
    #[serde(default)]
    pub officer_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for InspectionRecord {
    const COLLECTION: CollectionName = CollectionName::Inspections;
    const KIND: &'static str = "Inspection";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)
    }
    fn label(&self) -> String {
        format!("inmate {}", self.inmate_id)
    }
    fn stamp_created(&mut self, at: &str) {
        stamp(&mut self.created_at, at);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Belonging {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub inmate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_id: Option<String>,
    pub item: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for Belonging {
    const COLLECTION: CollectionName = CollectionName::Belongings;
    const KIND: &'static str = "Belonging";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)?;
        require(Self::COLLECTION, "item", &self.item)
    }
    fn label(&self) -> String {
        self.item.clone()
    }
    fn stamp_created(&mut self, at: &str) {
        stamp(&mut self.created_at, at);
    }
}

// ---------------------------------------------------------------------------
// Prison administration

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ward {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub current_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Ward {
    pub fn is_full(&self) -> bool {
        self.current_count >= self.capacity
    }
}

impl Record for Ward {
    const COLLECTION: CollectionName = CollectionName::Wards;
    const KIND: &'static str = "Ward";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "name", &self.name)?;
        if self.current_count > self.capacity {
            return Err(AppError::new(
                VALIDATION_INVALID_VALUE,
                "Ward occupancy exceeds its capacity",
            )
            .with_context("collection", Self::COLLECTION.as_str())
            .with_context("capacity", self.capacity.to_string())
            .with_context("currentCount", self.current_count.to_string()));
        }
        Ok(())
    }
    fn label(&self) -> String {
        self.name.clone()
    }
    fn stamp_created(&mut self, at: &str) {
        stamp(&mut self.created_at, at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "COURT")]
    Court,
    #[serde(rename = "HOSPITAL")]
    Hospital,
    #[serde(rename = "TRANSFER")]
    Transfer,
    #[serde(rename = "RELEASE")]
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    #[serde(default)]
    pub id: String,
    pub inmate_id: String,
    #[serde(default)]
    pub inmate_name: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub check_out_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub officer_name: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for Movement {
    const COLLECTION: CollectionName = CollectionName::Movements;
    const KIND: &'static str = "Movement";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)
    }
    fn label(&self) -> String {
        format!("{} -> {}", self.inmate_name, self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    #[serde(default)]
    pub id: String,
    pub inmate_id: String,
    pub visitor_name: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub visit_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for Visit {
    const COLLECTION: CollectionName = CollectionName::Visits;
    const KIND: &'static str = "Visit";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)?;
        require(Self::COLLECTION, "visitorName", &self.visitor_name)
    }
    fn label(&self) -> String {
        self.visitor_name.clone()
    }
    fn stamp_created(&mut self, at: &str) {
        stamp(&mut self.created_at, at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorType {
    Violation,
    Reward,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorReport {
    #[serde(default)]
    pub id: String,
    pub inmate_id: String,
    #[serde(rename = "type")]
    pub behavior_type: BehaviorType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub reporting_officer: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for BehaviorReport {
    const COLLECTION: CollectionName = CollectionName::Reports;
    const KIND: &'static str = "Report";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)
    }
    fn label(&self) -> String {
        format!("inmate {}", self.inmate_id)
    }
}

// ---------------------------------------------------------------------------
// Investigations

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    #[serde(default)]
    pub id: String,
    pub inmate_id: String,
    pub case_title: String,
    #[serde(default)]
    pub initial_charge: String,
    #[serde(default)]
    pub status: CaseStatus,
    #[serde(default)]
    pub start_date: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for Case {
    const COLLECTION: CollectionName = CollectionName::Cases;
    const KIND: &'static str = "Case";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "inmateId", &self.inmate_id)?;
        require(Self::COLLECTION, "caseTitle", &self.case_title)
    }
    fn label(&self) -> String {
        self.case_title.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationMinute {
    #[serde(default)]
    pub id: String,
    pub case_id: String,
    pub inmate_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub confirmed_charge: String,
    #[serde(default)]
    pub is_case_closed: bool,
    #[serde(default)]
    pub investigator_name: String,
    /// Id in the attachment store, replacing inline base64 payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for InvestigationMinute {
    const COLLECTION: CollectionName = CollectionName::Minutes;
    const KIND: &'static str = "Minute";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "caseId", &self.case_id)?;
        require(Self::COLLECTION, "inmateId", &self.inmate_id)
    }
    fn label(&self) -> String {
        format!("case {}", self.case_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DangerLevel {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WantedStatus {
    #[default]
    #[serde(rename = "At Large")]
    AtLarge,
    Captured,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WantedPerson {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub national_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub case_type: String,
    #[serde(default)]
    pub danger_level: DangerLevel,
    #[serde(default)]
    pub status: WantedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for WantedPerson {
    const COLLECTION: CollectionName = CollectionName::Wanted;
    const KIND: &'static str = "Wanted";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "fullName", &self.full_name)
    }
    fn label(&self) -> String {
        self.full_name.clone()
    }
}

// ---------------------------------------------------------------------------
// Shell

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    #[serde(default)]
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_view: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Record for FavoriteItem {
    const COLLECTION: CollectionName = CollectionName::Favorites;
    const KIND: &'static str = "Favorite";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn validate(&self) -> AppResult<()> {
        require(Self::COLLECTION, "label", &self.label)
    }
    fn label(&self) -> String {
        self.label.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: AuditAction,
    pub target: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Extra,
}
