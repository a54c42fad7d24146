//! Case types for the repair board.
//!
//! A case is one vehicle repair job. It moves through the board columns in
//! [`CaseStage::ORDER`], carries two independent status tracks (insurance,
//! parts) and owns its notes and photos.
//!
//! Immutable after creation: `id`, `created_at`, and the ids of every note
//! and photo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board column / workflow position.
///
/// The order is advisory: operators may move a case to any stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStage {
    #[default]
    NewIntake,
    DamageAssessment,
    RepairInProgress,
    InsuranceClaim,
    ReadyForDelivery,
    CaseClosed,
}

impl CaseStage {
    /// Workflow order, left to right on the board.
    pub const ORDER: [CaseStage; 6] = [
        CaseStage::NewIntake,
        CaseStage::DamageAssessment,
        CaseStage::RepairInProgress,
        CaseStage::InsuranceClaim,
        CaseStage::ReadyForDelivery,
        CaseStage::CaseClosed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewIntake => "new-intake",
            Self::DamageAssessment => "damage-assessment",
            Self::RepairInProgress => "repair-in-progress",
            Self::InsuranceClaim => "insurance-claim",
            Self::ReadyForDelivery => "ready-for-delivery",
            Self::CaseClosed => "case-closed",
        }
    }

    /// Parse from the serialized (kebab-case) form.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|stage| stage.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NewIntake => "New Intake",
            Self::DamageAssessment => "Damage Assessment",
            Self::RepairInProgress => "Repair In-Progress",
            Self::InsuranceClaim => "Insurance Claim",
            Self::ReadyForDelivery => "Ready for Delivery",
            Self::CaseClosed => "Case Closed",
        }
    }

    /// Position in [`Self::ORDER`].
    pub fn index(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|stage| stage == self)
            .unwrap_or_default()
    }

    /// The stage one step further along, or `None` at the last column.
    pub fn next(&self) -> Option<Self> {
        Self::ORDER.get(self.index() + 1).copied()
    }
}

impl std::fmt::Display for CaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insurance claim track, independent of the stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InsuranceStatus {
    #[default]
    NotApplied,
    Applied,
    InspectorScheduled,
    Inspected,
    UnderReview,
    Approved,
    Rejected,
    NotApplicable,
}

impl InsuranceStatus {
    pub const ALL: [InsuranceStatus; 8] = [
        InsuranceStatus::NotApplied,
        InsuranceStatus::Applied,
        InsuranceStatus::InspectorScheduled,
        InsuranceStatus::Inspected,
        InsuranceStatus::UnderReview,
        InsuranceStatus::Approved,
        InsuranceStatus::Rejected,
        InsuranceStatus::NotApplicable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotApplied => "not-applied",
            Self::Applied => "applied",
            Self::InspectorScheduled => "inspector-scheduled",
            Self::Inspected => "inspected",
            Self::UnderReview => "under-review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NotApplicable => "not-applicable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotApplied => "Not Applied",
            Self::Applied => "Applied",
            Self::InspectorScheduled => "Inspector Scheduled",
            Self::Inspected => "Inspected",
            Self::UnderReview => "Under Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::NotApplicable => "N/A",
        }
    }
}

impl std::fmt::Display for InsuranceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PartsStatus {
    #[default]
    NotOrdered,
    Ordered,
    Arrived,
}

impl PartsStatus {
    pub const ALL: [PartsStatus; 3] = [
        PartsStatus::NotOrdered,
        PartsStatus::Ordered,
        PartsStatus::Arrived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotOrdered => "not-ordered",
            Self::Ordered => "ordered",
            Self::Arrived => "arrived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotOrdered => "Not Ordered",
            Self::Ordered => "Ordered",
            Self::Arrived => "Arrived",
        }
    }
}

impl std::fmt::Display for PartsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display priority. Only affects ordering within a board column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Urgent => "Urgent",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Self::Normal => Self::Urgent,
            Self::Urgent => Self::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseNote {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// One attached image.
///
/// `data_url` is opaque to the core; the codec produces and consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CasePhoto {
    pub id: String,
    #[serde(alias = "encodedImage")]
    pub data_url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

impl CasePhoto {
    pub fn new(data_url: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            data_url,
            timestamp,
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// Unique identifier (immutable).
    pub id: String,

    pub customer_name: String,
    pub customer_phone: String,

    pub vehicle_model: String,
    pub vehicle_color: String,
    /// Always uppercase.
    pub registration_number: String,

    pub damage_description: String,

    pub stage: CaseStage,
    pub insurance_status: InsuranceStatus,
    pub parts_status: PartsStatus,
    pub priority: Priority,

    #[serde(default)]
    pub notes: Vec<CaseNote>,
    #[serde(default)]
    pub photos: Vec<CasePhoto>,

    /// Creation timestamp (immutable).
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation of this case.
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn is_closed(&self) -> bool {
        self.stage == CaseStage::CaseClosed
    }
}

/// Intake form contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCase {
    pub customer_name: String,
    pub customer_phone: String,
    pub vehicle_model: String,
    pub vehicle_color: String,
    pub registration_number: String,
    pub damage_description: String,
    pub priority: Priority,
}

impl NewCase {
    /// Name of the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("customer_name", &self.customer_name),
            ("customer_phone", &self.customer_phone),
            ("vehicle_model", &self.vehicle_model),
            ("registration_number", &self.registration_number),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Partial update; `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseUpdate {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_color: Option<String>,
    pub registration_number: Option<String>,
    pub damage_description: Option<String>,
    pub stage: Option<CaseStage>,
    pub insurance_status: Option<InsuranceStatus>,
    pub parts_status: Option<PartsStatus>,
    pub priority: Option<Priority>,
}

impl CaseUpdate {
    pub fn stage(stage: CaseStage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    /// Merge into `case`. Does not touch `updated_at`.
    pub fn apply_to(self, case: &mut Case) {
        if let Some(v) = self.customer_name {
            case.customer_name = v;
        }
        if let Some(v) = self.customer_phone {
            case.customer_phone = v;
        }
        if let Some(v) = self.vehicle_model {
            case.vehicle_model = v;
        }
        if let Some(v) = self.vehicle_color {
            case.vehicle_color = v;
        }
        if let Some(v) = self.registration_number {
            case.registration_number = normalize_registration(&v);
        }
        if let Some(v) = self.damage_description {
            case.damage_description = v;
        }
        if let Some(v) = self.stage {
            case.stage = v;
        }
        if let Some(v) = self.insurance_status {
            case.insurance_status = v;
        }
        if let Some(v) = self.parts_status {
            case.parts_status = v;
        }
        if let Some(v) = self.priority {
            case.priority = v;
        }
    }
}

/// Registration plates are stored uppercase, without surrounding whitespace.
pub fn normalize_registration(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Fresh identifier for cases, notes and photos.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stage_order_and_next() {
        assert_eq!(CaseStage::NewIntake.next(), Some(CaseStage::DamageAssessment));
        assert_eq!(
            CaseStage::RepairInProgress.next(),
            Some(CaseStage::InsuranceClaim)
        );
        assert_eq!(CaseStage::CaseClosed.next(), None);
        assert_eq!(CaseStage::ReadyForDelivery.index(), 4);
    }

    #[test]
    fn enums_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CaseStage::RepairInProgress).unwrap(),
            r#""repair-in-progress""#
        );
        assert_eq!(
            serde_json::to_string(&InsuranceStatus::InspectorScheduled).unwrap(),
            r#""inspector-scheduled""#
        );
        assert_eq!(
            serde_json::to_string(&PartsStatus::NotOrdered).unwrap(),
            r#""not-ordered""#
        );
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), r#""urgent""#);
    }

    #[test]
    fn parse_matches_as_str() {
        for stage in CaseStage::ORDER {
            assert_eq!(CaseStage::parse(stage.as_str()), Some(stage));
        }
        for status in InsuranceStatus::ALL {
            assert_eq!(InsuranceStatus::parse(status.as_str()), Some(status));
        }
        for status in PartsStatus::ALL {
            assert_eq!(PartsStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CaseStage::parse("archived"), None);
    }

    #[test]
    fn missing_field_reports_first_blank() {
        let intake = NewCase {
            customer_name: "Asha Rao".to_string(),
            customer_phone: "  ".to_string(),
            vehicle_model: String::new(),
            registration_number: "MH12".to_string(),
            ..Default::default()
        };
        assert_eq!(intake.missing_field(), Some("customer_phone"));
    }

    #[test]
    fn update_uppercases_registration() {
        let now = Utc::now();
        let mut case = Case {
            id: new_id(),
            customer_name: "A".to_string(),
            customer_phone: "1".to_string(),
            vehicle_model: "Thar".to_string(),
            vehicle_color: String::new(),
            registration_number: "OLD".to_string(),
            damage_description: String::new(),
            stage: CaseStage::NewIntake,
            insurance_status: InsuranceStatus::NotApplied,
            parts_status: PartsStatus::NotOrdered,
            priority: Priority::Normal,
            notes: vec![],
            photos: vec![],
            created_at: now,
            updated_at: now,
        };
        CaseUpdate {
            registration_number: Some(" ka01x9 ".to_string()),
            parts_status: Some(PartsStatus::Ordered),
            ..Default::default()
        }
        .apply_to(&mut case);
        assert_eq!(case.registration_number, "KA01X9");
        assert_eq!(case.parts_status, PartsStatus::Ordered);
        assert_eq!(case.stage, CaseStage::NewIntake);
    }

    #[test]
    fn photo_accepts_encoded_image_alias() {
        let json = r#"{"id":"p1","encodedImage":"data:image/jpeg;base64,AAAA","timestamp":"2026-01-01T00:00:00Z"}"#;
        let photo: CasePhoto = serde_json::from_str(json).unwrap();
        assert_eq!(photo.data_url, "data:image/jpeg;base64,AAAA");
        assert!(!photo.archived);
    }
}
