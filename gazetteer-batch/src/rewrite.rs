//! Per-property rewrite: apply one proposed change to a fetched aggregate.
//!
//! Every change kind goes through the same steps: patch or merge the targeted
//! field group, append the batch note if one was given, tag the BLPU for
//! update. Nothing here performs I/O.

use crate::allocator::{allocate_child_key, allocate_note_sequence};
use crate::merge::{merge_records, merge_sourced, CollectionFamily, PreconditionViolation};
use crate::patch::{apply_field_edit, apply_status_transition, patch_lpis};
use gazetteer_core::{
    AuthorityVariant, ChangeKind, ChangeSpec, ChangeType, ClassificationChange,
    ClassificationRecord, CrossRefChange, CrossRefRecord, Language, LinkedLookup, NoteRecord,
    Property, PropertyFieldError, RecordDate,
};
use thiserror::Error;

/// Why a property could not be rewritten. No save is issued for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    #[error("Property refused the change with {} field error(s)", .0.len())]
    Refused(Vec<PropertyFieldError>),
}

impl From<PropertyFieldError> for RewriteError {
    fn from(error: PropertyFieldError) -> Self {
        RewriteError::Refused(vec![error])
    }
}

/// Collaborators a rewrite needs besides the change itself.
#[derive(Clone, Copy)]
pub struct RewriteContext<'a> {
    pub variant: AuthorityVariant,
    pub lookup: &'a dyn LinkedLookup,
    /// Languages the authority maintains LPIs in.
    pub languages: &'a [Language],
    /// Recorded as the author of appended notes.
    pub user: Option<&'a str>,
}

/// Produce the aggregate to submit for `current`.
pub fn rewrite_property(
    current: &Property,
    change: &ChangeSpec,
    ctx: RewriteContext<'_>,
) -> Result<Property, RewriteError> {
    let mut property = current.clone();
    let reference_date = change.reference_date;

    match &change.kind {
        ChangeKind::Classification(classification) => {
            apply_classification(&mut property, classification, reference_date, ctx.variant)?
        }
        ChangeKind::CrossReference(xref) => {
            apply_cross_reference(&mut property, xref, reference_date)?
        }
        ChangeKind::AddressFields(patch) => {
            property.lpis = patch_lpis(&property.lpis, patch, ctx.lookup, ctx.languages);
        }
        ChangeKind::LogicalStatus(status) => {
            apply_status_transition(&mut property, status, reference_date)?
        }
        ChangeKind::SingleField(edit) => apply_field_edit(&mut property, edit, reference_date),
    }

    if let Some(text) = change.note.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        append_note(&mut property, text, ctx.user);
    }

    property.change_type = Some(ChangeType::Update);
    Ok(property)
}

fn apply_classification(
    property: &mut Property,
    change: &ClassificationChange,
    reference_date: RecordDate,
    variant: AuthorityVariant,
) -> Result<(), PreconditionViolation> {
    if !variant.uses_classification_history() {
        property.blpu_class = Some(change.blpu_class.clone());
        return Ok(());
    }

    let new_record = ClassificationRecord {
        pk_id: 0,
        class_key: None,
        uprn: property.uprn,
        blpu_class: change.blpu_class.clone(),
        class_scheme: change.class_scheme.clone().unwrap_or_default(),
        start_date: Some(change.start_date.unwrap_or(reference_date)),
        end_date: None,
        change_type: None,
    };
    property.classifications = merge_records(
        CollectionFamily::Classification,
        &property.classifications,
        new_record,
        change.action,
        reference_date,
    )?;
    Ok(())
}

fn apply_cross_reference(
    property: &mut Property,
    change: &CrossRefChange,
    reference_date: RecordDate,
) -> Result<(), PreconditionViolation> {
    let new_record = CrossRefRecord {
        pk_id: 0,
        xref_key: None,
        uprn: property.uprn,
        source_id: change.source_id,
        source: change.source.clone(),
        cross_reference: change.cross_reference.clone(),
        start_date: Some(change.start_date.unwrap_or(reference_date)),
        end_date: None,
        change_type: None,
    };
    property.cross_refs = merge_sourced(
        CollectionFamily::CrossReference,
        &property.cross_refs,
        new_record,
        change.action,
        reference_date,
    )?;
    Ok(())
}

fn append_note(property: &mut Property, text: &str, user: Option<&str>) {
    let note = NoteRecord {
        pk_id: allocate_child_key(&property.notes),
        uprn: property.uprn,
        seq_num: allocate_note_sequence(&property.notes),
        note: text.to_string(),
        last_user: user.map(str::to_string),
        change_type: Some(ChangeType::Insert),
    };
    property.notes.push(note);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gazetteer_core::{
        BlpuFieldEdit, ErrorCategory, Language, LogicalStatusChange, LpiPatch, MergeAction,
        NoLinkedLookup, StatusTransition,
    };

    fn date(y: i32, m: u32, d: u32) -> RecordDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx(variant: AuthorityVariant) -> RewriteContext<'static> {
        RewriteContext {
            variant,
            lookup: &NoLinkedLookup,
            languages: &[Language::English],
            user: Some("editor"),
        }
    }

    fn open_classification(pk_id: i64, class: &str) -> ClassificationRecord {
        ClassificationRecord {
            pk_id,
            class_key: Some(format!("K{}", pk_id)),
            uprn: 7,
            blpu_class: class.to_string(),
            class_scheme: "OS".to_string(),
            start_date: Some(date(2018, 1, 1)),
            end_date: None,
            change_type: None,
        }
    }

    fn classification_change(action: Option<MergeAction>) -> ChangeSpec {
        ChangeSpec::new(ChangeKind::Classification(ClassificationChange {
            blpu_class: "CO01".to_string(),
            class_scheme: Some("OS".to_string()),
            start_date: Some(date(2024, 3, 1)),
            action,
        }))
        .with_reference_date(date(2024, 6, 1))
    }

    #[test]
    fn test_geoplace_classification_writes_blpu_class() {
        let mut current = Property::new(7, 0.0, 0.0);
        current.blpu_class = Some("RD04".to_string());
        let updated =
            rewrite_property(&current, &classification_change(None), ctx(AuthorityVariant::GeoPlace))
                .unwrap();
        assert_eq!(updated.blpu_class.as_deref(), Some("CO01"));
        assert!(updated.classifications.is_empty());
        assert_eq!(updated.change_type, Some(ChangeType::Update));
    }

    #[test]
    fn test_scottish_classification_update_in_place() {
        let mut current = Property::new(7, 0.0, 0.0);
        current.classifications.push(open_classification(12, "RD04"));
        let updated = rewrite_property(
            &current,
            &classification_change(Some(MergeAction::Update)),
            ctx(AuthorityVariant::OneScotland),
        )
        .unwrap();
        assert_eq!(updated.classifications.len(), 1);
        let row = &updated.classifications[0];
        assert_eq!(row.pk_id, 12);
        assert_eq!(row.class_key.as_deref(), Some("K12"));
        assert_eq!(row.blpu_class, "CO01");
        assert_eq!(row.start_date, Some(date(2024, 3, 1)));
        assert_eq!(row.end_date, None);
    }

    #[test]
    fn test_scottish_classification_delete_with_two_open_rows() {
        let mut current = Property::new(7, 0.0, 0.0);
        current.classifications.push(open_classification(12, "RD04"));
        current.classifications.push(open_classification(13, "RD02"));
        let err = rewrite_property(
            &current,
            &classification_change(Some(MergeAction::Delete)),
            ctx(AuthorityVariant::OneScotland),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Delete can only be used when there is only 1 previous open classification."
        );
    }

    #[test]
    fn test_cross_reference_defaults_start_date() {
        let current = Property::new(7, 0.0, 0.0);
        let change = ChangeSpec::new(ChangeKind::CrossReference(CrossRefChange {
            source_id: 3,
            source: Some("CTAX".to_string()),
            cross_reference: "A1".to_string(),
            start_date: None,
            action: MergeAction::Add,
        }))
        .with_reference_date(date(2024, 6, 1));
        let updated = rewrite_property(&current, &change, ctx(AuthorityVariant::GeoPlace)).unwrap();
        assert_eq!(updated.cross_refs.len(), 1);
        assert_eq!(updated.cross_refs[0].start_date, Some(date(2024, 6, 1)));
        assert_eq!(updated.cross_refs[0].pk_id, -10);
        assert_eq!(updated.cross_refs[0].uprn, 7);
    }

    #[test]
    fn test_note_appended_with_next_key_and_sequence() {
        let mut current = Property::new(7, 0.0, 0.0);
        current.notes.push(NoteRecord {
            pk_id: -10,
            uprn: 7,
            seq_num: 3,
            note: "earlier".to_string(),
            last_user: None,
            change_type: Some(ChangeType::Insert),
        });
        let change = ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(2)))
            .with_note("  Checked on site  ");
        let updated = rewrite_property(&current, &change, ctx(AuthorityVariant::GeoPlace)).unwrap();
        assert_eq!(updated.notes.len(), 2);
        let note = &updated.notes[1];
        assert_eq!(note.pk_id, -11);
        assert_eq!(note.seq_num, 4);
        assert_eq!(note.note, "Checked on site");
        assert_eq!(note.last_user.as_deref(), Some("editor"));
        assert_eq!(note.change_type, Some(ChangeType::Insert));
    }

    #[test]
    fn test_blank_note_not_appended() {
        let current = Property::new(7, 0.0, 0.0);
        let change = ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(2))).with_note("   ");
        let updated = rewrite_property(&current, &change, ctx(AuthorityVariant::GeoPlace)).unwrap();
        assert!(updated.notes.is_empty());
    }

    #[test]
    fn test_address_fields_patch_every_lpi() {
        let mut current = Property::new(7, 0.0, 0.0);
        for (pk_id, language) in [(1, Language::English), (2, Language::Welsh)] {
            current.lpis.push(gazetteer_core::LpiRecord {
                pk_id,
                lpi_key: None,
                uprn: 7,
                language,
                logical_status: gazetteer_core::LogicalStatus::Approved,
                usrn: 1,
                sao_text: None,
                pao_text: None,
                pao_start_number: None,
                post_town_ref: None,
                sub_locality_ref: None,
                postcode_ref: None,
                official_flag: None,
                postal_address: None,
                postally_addressable: None,
                address: String::new(),
                start_date: None,
                end_date: None,
                change_type: None,
            });
        }
        let change = ChangeSpec::new(ChangeKind::AddressFields(LpiPatch {
            usrn: Some(99),
            ..LpiPatch::default()
        }));
        let updated = rewrite_property(&current, &change, ctx(AuthorityVariant::GeoPlace)).unwrap();
        assert!(updated.lpis.iter().all(|l| l.usrn == 99));
        assert!(updated.lpis.iter().all(|l| l.change_type == Some(ChangeType::Update)));
    }

    #[test]
    fn test_approve_refusal_is_categorised() {
        let mut current = Property::new(7, 0.0, 0.0);
        let lpi = gazetteer_core::LpiRecord {
            pk_id: 1,
            lpi_key: None,
            uprn: 7,
            language: Language::English,
            logical_status: gazetteer_core::LogicalStatus::Provisional,
            usrn: 1,
            sao_text: None,
            pao_text: None,
            pao_start_number: None,
            post_town_ref: None,
            sub_locality_ref: None,
            postcode_ref: None,
            official_flag: None,
            postal_address: None,
            postally_addressable: None,
            address: String::new(),
            start_date: None,
            end_date: None,
            change_type: None,
        };
        current.lpis.push(lpi.clone());
        current.lpis.push(gazetteer_core::LpiRecord { pk_id: 2, ..lpi });
        let change = ChangeSpec::new(ChangeKind::LogicalStatus(LogicalStatusChange {
            transition: StatusTransition::Approve,
            blpu_state: None,
            blpu_state_date: None,
        }));
        match rewrite_property(&current, &change, ctx(AuthorityVariant::GeoPlace)) {
            Err(RewriteError::Refused(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].category, ErrorCategory::Lpi);
            }
            other => panic!("expected refusal, got {:?}", other),
        }
    }
}
