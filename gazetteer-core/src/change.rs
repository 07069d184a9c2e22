//! Proposed changes applied by a multi-edit batch

use crate::{identity::today, LogicalStatus, LookupRef, RecordDate, Usrn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with existing rows when a new child record is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeAction {
    /// Append the new row and leave existing rows alone.
    Add,
    /// Same as `Add`; offered when existing rows are expected.
    Keep,
    /// Close open rows from the same source, then append.
    Replace,
    /// Append only if no row from the same source exists.
    Leave,
    /// Close the single open row as deleted, then append.
    Delete,
    /// Close the single open row as historic, then append.
    Historicise,
    /// Rewrite the single open row in place.
    Update,
}

impl fmt::Display for MergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            MergeAction::Add => "Add",
            MergeAction::Keep => "Keep",
            MergeAction::Replace => "Replace",
            MergeAction::Leave => "Leave",
            MergeAction::Delete => "Delete",
            MergeAction::Historicise => "Historicise",
            MergeAction::Update => "Update",
        };
        write!(f, "{}", value)
    }
}

/// Logical-status transitions offered by the multi-edit dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTransition {
    Approve,
    Historicise,
}

impl StatusTransition {
    /// Logical status the properties end up in.
    pub fn target_status(&self) -> LogicalStatus {
        match self {
            StatusTransition::Approve => LogicalStatus::Approved,
            StatusTransition::Historicise => LogicalStatus::Historical,
        }
    }
}

/// New classification for every property in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationChange {
    pub blpu_class: String,
    pub class_scheme: Option<String>,
    pub start_date: Option<RecordDate>,
    pub action: Option<MergeAction>,
}

/// New cross reference for every property in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossRefChange {
    pub source_id: i32,
    pub source: Option<String>,
    pub cross_reference: String,
    pub start_date: Option<RecordDate>,
    pub action: MergeAction,
}

/// Address fields written to every LPI. `None` leaves the field untouched.
///
/// Post town and sub-locality references are English-language references;
/// other languages receive the linked reference for their language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpiPatch {
    pub usrn: Option<Usrn>,
    pub post_town_ref: Option<LookupRef>,
    pub sub_locality_ref: Option<LookupRef>,
    pub postcode_ref: Option<LookupRef>,
    pub official_flag: Option<String>,
    pub postal_address: Option<String>,
    pub postally_addressable: Option<String>,
    pub logical_status: Option<LogicalStatus>,
}

impl LpiPatch {
    /// True when no field would be written.
    pub fn is_empty(&self) -> bool {
        self.usrn.is_none()
            && self.post_town_ref.is_none()
            && self.sub_locality_ref.is_none()
            && self.postcode_ref.is_none()
            && self.official_flag.is_none()
            && self.postal_address.is_none()
            && self.postally_addressable.is_none()
            && self.logical_status.is_none()
    }
}

/// Logical status change, optionally with a new BLPU state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalStatusChange {
    pub transition: StatusTransition,
    pub blpu_state: Option<i16>,
    pub blpu_state_date: Option<RecordDate>,
}

/// One BLPU-level field written to every property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "field", content = "value")]
pub enum BlpuFieldEdit {
    Level(Option<f64>),
    Rpc(i16),
    State {
        state: Option<i16>,
        state_date: Option<RecordDate>,
    },
    ExcludeFromExport(bool),
    SiteVisitRequired(bool),
}

impl BlpuFieldEdit {
    /// Wire name of the edited field, used in error reports.
    pub fn field_name(&self) -> &'static str {
        match self {
            BlpuFieldEdit::Level(_) => "level",
            BlpuFieldEdit::Rpc(_) => "rpc",
            BlpuFieldEdit::State { .. } => "blpuState",
            BlpuFieldEdit::ExcludeFromExport(_) => "excludeFromExport",
            BlpuFieldEdit::SiteVisitRequired(_) => "siteVisitRequired",
        }
    }
}

/// The field group a batch edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChangeKind {
    Classification(ClassificationChange),
    CrossReference(CrossRefChange),
    AddressFields(LpiPatch),
    LogicalStatus(LogicalStatusChange),
    SingleField(BlpuFieldEdit),
}

/// A single proposed change applied to every property in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSpec {
    pub kind: ChangeKind,
    /// Date used to close records and stamp new ones.
    pub reference_date: RecordDate,
    /// Note appended to every property, if any.
    pub note: Option<String>,
    pub is_minor_change: bool,
}

impl ChangeSpec {
    /// Create a change dated today with no note.
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            reference_date: today(),
            note: None,
            is_minor_change: false,
        }
    }

    pub fn with_reference_date(mut self, date: RecordDate) -> Self {
        self.reference_date = date;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn minor(mut self) -> Self {
        self.is_minor_change = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_status_transition_targets() {
        assert_eq!(StatusTransition::Approve.target_status().code(), 1);
        assert_eq!(StatusTransition::Historicise.target_status().code(), 8);
    }

    #[test]
    fn test_lpi_patch_is_empty() {
        assert!(LpiPatch::default().is_empty());
        let patch = LpiPatch {
            postcode_ref: Some(12),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_change_spec_builder() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let spec = ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(2)))
            .with_reference_date(date)
            .with_note("RPC corrected after survey")
            .minor();
        assert_eq!(spec.reference_date, date);
        assert_eq!(spec.note.as_deref(), Some("RPC corrected after survey"));
        assert!(spec.is_minor_change);
    }

    #[test]
    fn test_single_field_wire_shape() {
        let json = serde_json::to_value(BlpuFieldEdit::ExcludeFromExport(true)).unwrap();
        assert_eq!(json["field"], "excludeFromExport");
        assert_eq!(json["value"], true);
    }
}
