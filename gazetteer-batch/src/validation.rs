//! Baseline validation of a proposed change.
//!
//! Checks what can be checked without reference data: required fields per
//! change kind, code-list values and the rules that differ by authority
//! variant. Deployments with lookup tables wrap or replace this validator.

use gazetteer_core::{
    AuthorityVariant, BlpuFieldEdit, ChangeKind, ChangeSpec, ChangeValidator, FieldError,
    LogicalStatusChange, LpiPatch, MergeAction, ValidationError,
};

/// Longest note accepted on a BLPU.
pub const MAX_NOTE_LENGTH: usize = 4000;

const YES_NO: [&str; 2] = ["Y", "N"];
const POSTAL_ADDRESS_CODES: [&str; 4] = ["Y", "N", "A", "L"];
const RPC_RANGE: std::ops::RangeInclusive<i16> = 1..=5;

/// Validator that enforces required fields and code-list values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldValidator;

impl ChangeValidator for RequiredFieldValidator {
    fn validate(&self, change: &ChangeSpec, variant: AuthorityVariant) -> Vec<FieldError> {
        let mut errors = Vec::new();

        match &change.kind {
            ChangeKind::Classification(classification) => {
                if classification.blpu_class.trim().is_empty() {
                    errors.push(required("blpuClass"));
                }
                if variant.uses_classification_history() {
                    if classification
                        .class_scheme
                        .as_deref()
                        .map_or(true, |s| s.trim().is_empty())
                    {
                        errors.push(required("classScheme"));
                    }
                    if matches!(
                        classification.action,
                        Some(MergeAction::Replace | MergeAction::Leave)
                    ) {
                        errors.push(invalid("action", "This option is not available for classifications."));
                    }
                }
                if classification
                    .start_date
                    .is_some_and(|start| start > change.reference_date)
                {
                    errors.push(invalid("startDate", "Start date cannot be in the future."));
                }
            }
            ChangeKind::CrossReference(xref) => {
                if xref.source_id <= 0 {
                    errors.push(required("sourceId"));
                }
                if xref.cross_reference.trim().is_empty() {
                    errors.push(required("crossReference"));
                }
                if !matches!(
                    xref.action,
                    MergeAction::Add | MergeAction::Keep | MergeAction::Replace | MergeAction::Leave
                ) {
                    errors.push(invalid("action", "This option is not available for cross references."));
                }
                if xref.start_date.is_some_and(|start| start > change.reference_date) {
                    errors.push(invalid("startDate", "Start date cannot be in the future."));
                }
            }
            ChangeKind::AddressFields(patch) => validate_lpi_patch(patch, &mut errors),
            ChangeKind::LogicalStatus(status) => validate_status(status, &mut errors),
            ChangeKind::SingleField(edit) => validate_field_edit(edit, &mut errors),
        }

        if let Some(note) = &change.note {
            if note.trim().is_empty() {
                errors.push(invalid("note", "Note cannot be blank."));
            } else if note.chars().count() > MAX_NOTE_LENGTH {
                errors.push(invalid(
                    "note",
                    &format!("Note cannot be longer than {} characters.", MAX_NOTE_LENGTH),
                ));
            }
        }

        group_by_field(errors)
    }
}

fn validate_lpi_patch(patch: &LpiPatch, errors: &mut Vec<ValidationError>) {
    if patch.is_empty() {
        errors.push(invalid("lpi", "At least one address field must be supplied."));
    }
    if patch.usrn.is_some_and(|usrn| usrn <= 0) {
        errors.push(invalid("usrn", "Select a valid street."));
    }
    if let Some(flag) = &patch.official_flag {
        if !YES_NO.contains(&flag.as_str()) {
            errors.push(invalid("officialFlag", "Official flag must be Y or N."));
        }
    }
    if let Some(postal) = &patch.postal_address {
        if !POSTAL_ADDRESS_CODES.contains(&postal.as_str()) {
            errors.push(invalid("postalAddress", "Postal address must be Y, N, A or L."));
        }
    }
    if let Some(addressable) = &patch.postally_addressable {
        if !POSTAL_ADDRESS_CODES.contains(&addressable.as_str()) {
            errors.push(invalid(
                "postallyAddressable",
                "Postally addressable must be Y, N, A or L.",
            ));
        }
    }
}

fn validate_status(status: &LogicalStatusChange, errors: &mut Vec<ValidationError>) {
    if status.blpu_state_date.is_some() && status.blpu_state.is_none() {
        errors.push(invalid("blpuStateDate", "A state date needs a state."));
    }
}

fn validate_field_edit(edit: &BlpuFieldEdit, errors: &mut Vec<ValidationError>) {
    let reason = match edit {
        BlpuFieldEdit::Rpc(rpc) if !RPC_RANGE.contains(rpc) => {
            "Representative point code must be between 1 and 5."
        }
        BlpuFieldEdit::Level(Some(level)) if !level.is_finite() => "Level must be a number.",
        BlpuFieldEdit::State {
            state: None,
            state_date: Some(_),
        } => "A state date needs a state.",
        _ => return,
    };
    errors.push(invalid(edit.field_name(), reason));
}

fn required(field: &str) -> ValidationError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// One `FieldError` per field, in the order fields were first reported.
fn group_by_field(errors: Vec<ValidationError>) -> Vec<FieldError> {
    let mut grouped: Vec<FieldError> = Vec::new();
    for error in errors {
        let FieldError { field, errors } = FieldError::from(error);
        match grouped.iter_mut().find(|g| g.field == field) {
            Some(existing) => {
                for message in errors {
                    if !existing.errors.contains(&message) {
                        existing.errors.push(message);
                    }
                }
            }
            None => grouped.push(FieldError { field, errors }),
        }
    }
    grouped
}
