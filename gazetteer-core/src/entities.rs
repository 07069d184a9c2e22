//! Property aggregate and its child records

use crate::{ChangeType, Language, LogicalStatus, LookupRef, PkId, RecordDate, Uprn, Usrn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// RECORD TRAITS
// ============================================================================

/// A child row identified by a primary key that may still be provisional.
pub trait KeyedRecord {
    fn pk_id(&self) -> PkId;
}

/// A dated child row that can be inserted, updated or closed by a batch.
pub trait ChildRecord: KeyedRecord + Clone {
    fn set_pk_id(&mut self, pk_id: PkId);

    fn change_type(&self) -> Option<ChangeType>;

    fn set_change_type(&mut self, change_type: ChangeType);

    /// Mark the row as unmodified, as it is once persisted.
    fn clear_change_type(&mut self);

    fn start_date(&self) -> Option<RecordDate>;

    fn end_date(&self) -> Option<RecordDate>;

    fn set_end_date(&mut self, end_date: Option<RecordDate>);

    /// Copy the business payload and both dates from `other`.
    /// Primary key, server key and parent references are kept.
    fn overwrite_payload(&mut self, other: &Self);

    /// An open record is still in effect.
    fn is_open(&self) -> bool {
        self.end_date().is_none()
    }

    /// End the record on `end_date` and tag it for the next save.
    fn close(&mut self, end_date: RecordDate, change_type: ChangeType) {
        self.set_end_date(Some(end_date));
        self.set_change_type(change_type);
    }
}

/// Child records that are partitioned by an external source system.
pub trait SourcedRecord: ChildRecord {
    fn source_id(&self) -> i32;
}

macro_rules! impl_child_record_accessors {
    () => {
        fn set_pk_id(&mut self, pk_id: PkId) {
            self.pk_id = pk_id;
        }

        fn change_type(&self) -> Option<ChangeType> {
            self.change_type
        }

        fn set_change_type(&mut self, change_type: ChangeType) {
            self.change_type = Some(change_type);
        }

        fn clear_change_type(&mut self) {
            self.change_type = None;
        }

        fn start_date(&self) -> Option<RecordDate> {
            self.start_date
        }

        fn end_date(&self) -> Option<RecordDate> {
            self.end_date
        }

        fn set_end_date(&mut self, end_date: Option<RecordDate>) {
            self.end_date = end_date;
        }
    };
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Dated classification of a BLPU (OneScotland authorities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub pk_id: PkId,
    pub class_key: Option<String>,
    pub uprn: Uprn,
    pub blpu_class: String,
    pub class_scheme: String,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for ClassificationRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for ClassificationRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        self.blpu_class = other.blpu_class.clone();
        self.class_scheme = other.class_scheme.clone();
        self.start_date = other.start_date;
        self.end_date = other.end_date;
    }
}

// ============================================================================
// CROSS REFERENCE
// ============================================================================

/// Link from a BLPU to a record in an external system (council tax, NDR, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossRefRecord {
    pub pk_id: PkId,
    pub xref_key: Option<String>,
    pub uprn: Uprn,
    pub source_id: i32,
    pub source: Option<String>,
    pub cross_reference: String,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for CrossRefRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for CrossRefRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        self.source_id = other.source_id;
        self.source = other.source.clone();
        self.cross_reference = other.cross_reference.clone();
        self.start_date = other.start_date;
        self.end_date = other.end_date;
    }
}

impl SourcedRecord for CrossRefRecord {
    fn source_id(&self) -> i32 {
        self.source_id
    }
}

// ============================================================================
// ORGANISATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationRecord {
    pub pk_id: PkId,
    pub org_key: Option<String>,
    pub uprn: Uprn,
    pub organisation: String,
    pub legal_name: Option<String>,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for OrganisationRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for OrganisationRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        self.organisation = other.organisation.clone();
        self.legal_name = other.legal_name.clone();
        self.start_date = other.start_date;
        self.end_date = other.end_date;
    }
}

// ============================================================================
// SUCCESSOR CROSS REFERENCE
// ============================================================================

/// Link from a retired BLPU to the record(s) that replaced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessorCrossRefRecord {
    pub pk_id: PkId,
    pub succ_key: Option<String>,
    pub predecessor: Uprn,
    pub successor: Uprn,
    pub successor_type: i16,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for SuccessorCrossRefRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for SuccessorCrossRefRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        self.successor = other.successor;
        self.successor_type = other.successor_type;
        self.start_date = other.start_date;
        self.end_date = other.end_date;
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    pub pk_id: PkId,
    pub prov_key: Option<String>,
    pub uprn: Uprn,
    pub provenance_code: String,
    pub annotation: Option<String>,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for ProvenanceRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for ProvenanceRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        self.provenance_code = other.provenance_code.clone();
        self.annotation = other.annotation.clone();
        self.start_date = other.start_date;
        self.end_date = other.end_date;
    }
}

// ============================================================================
// NOTE
// ============================================================================

/// Free-text note attached to a BLPU. Notes are never closed, only appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub pk_id: PkId,
    pub uprn: Uprn,
    pub seq_num: i32,
    pub note: String,
    pub last_user: Option<String>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for NoteRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

// ============================================================================
// LPI
// ============================================================================

/// Land and Property Identifier: one descriptive address per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpiRecord {
    pub pk_id: PkId,
    pub lpi_key: Option<String>,
    pub uprn: Uprn,
    pub language: Language,
    pub logical_status: LogicalStatus,
    pub usrn: Usrn,
    pub sao_text: Option<String>,
    pub pao_text: Option<String>,
    pub pao_start_number: Option<i32>,
    pub post_town_ref: Option<LookupRef>,
    pub sub_locality_ref: Option<LookupRef>,
    pub postcode_ref: Option<LookupRef>,
    pub official_flag: Option<String>,
    pub postal_address: Option<String>,
    pub postally_addressable: Option<String>,
    /// Rendered single-line address, read-only.
    pub address: String,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,
}

impl KeyedRecord for LpiRecord {
    fn pk_id(&self) -> PkId {
        self.pk_id
    }
}

impl ChildRecord for LpiRecord {
    impl_child_record_accessors!();

    fn overwrite_payload(&mut self, other: &Self) {
        let (pk_id, lpi_key, uprn) = (self.pk_id, self.lpi_key.clone(), self.uprn);
        *self = other.clone();
        self.pk_id = pk_id;
        self.lpi_key = lpi_key;
        self.uprn = uprn;
    }
}

// ============================================================================
// PROPERTY AGGREGATE
// ============================================================================

/// Basic Land and Property Unit with all of its child collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub uprn: Uprn,
    pub logical_status: LogicalStatus,
    pub blpu_state: Option<i16>,
    pub blpu_state_date: Option<RecordDate>,
    /// Classification code held on the BLPU (GeoPlace authorities).
    pub blpu_class: Option<String>,
    pub rpc: i16,
    pub x_coordinate: f64,
    pub y_coordinate: f64,
    pub parent_uprn: Option<Uprn>,
    pub local_custodian_code: Option<i32>,
    pub level: Option<f64>,
    pub exclude_from_export: bool,
    pub site_visit_required: bool,
    pub start_date: Option<RecordDate>,
    pub end_date: Option<RecordDate>,
    pub change_type: Option<ChangeType>,

    #[serde(default)]
    pub classifications: Vec<ClassificationRecord>,
    #[serde(default, rename = "blpuAppCrossRefs")]
    pub cross_refs: Vec<CrossRefRecord>,
    #[serde(default, rename = "blpuNotes")]
    pub notes: Vec<NoteRecord>,
    #[serde(default)]
    pub organisations: Vec<OrganisationRecord>,
    #[serde(default)]
    pub successor_cross_refs: Vec<SuccessorCrossRefRecord>,
    #[serde(default, rename = "blpuProvenances")]
    pub provenances: Vec<ProvenanceRecord>,
    #[serde(default)]
    pub lpis: Vec<LpiRecord>,
}

impl Property {
    /// Create an approved BLPU with no child records.
    pub fn new(uprn: Uprn, x_coordinate: f64, y_coordinate: f64) -> Self {
        Self {
            uprn,
            logical_status: LogicalStatus::Approved,
            blpu_state: None,
            blpu_state_date: None,
            blpu_class: None,
            rpc: 1,
            x_coordinate,
            y_coordinate,
            parent_uprn: None,
            local_custodian_code: None,
            level: None,
            exclude_from_export: false,
            site_visit_required: false,
            start_date: None,
            end_date: None,
            change_type: None,
            classifications: Vec::new(),
            cross_refs: Vec::new(),
            notes: Vec::new(),
            organisations: Vec::new(),
            successor_cross_refs: Vec::new(),
            provenances: Vec::new(),
            lpis: Vec::new(),
        }
    }

    /// First LPI in the given language.
    pub fn lpi_for(&self, language: Language) -> Option<&LpiRecord> {
        self.lpis.iter().find(|l| l.language == language)
    }

    /// Address shown to the user when reporting on this property.
    pub fn display_address(&self) -> String {
        self.lpi_for(Language::English)
            .or_else(|| self.lpis.first())
            .map(|l| l.address.clone())
            .unwrap_or_else(|| format!("UPRN {}", self.uprn))
    }

    /// Number of LPIs held for each language.
    pub fn lpi_counts_by_language(&self) -> BTreeMap<Language, usize> {
        let mut counts = BTreeMap::new();
        for lpi in &self.lpis {
            *counts.entry(lpi.language).or_insert(0) += 1;
        }
        counts
    }
}
