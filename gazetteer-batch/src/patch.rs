//! Field patches applied to a property aggregate.
//!
//! Address-field, logical-status and single-field edits do not add rows; they
//! overwrite fields on the BLPU or on every LPI and tag what they touch.

use gazetteer_core::{
    BlpuFieldEdit, ChangeType, ChildRecord, ErrorCategory, Language, LinkedLookup,
    LogicalStatusChange, LookupKind, LookupRef, LpiPatch, LpiRecord, Property,
    PropertyFieldError, RecordDate, StatusTransition,
};

// ============================================================================
// LPI PATCH
// ============================================================================

/// Write the supplied address fields to every LPI.
///
/// Post town and sub-locality references in `patch` are English references.
/// LPIs in one of the authority's other `languages` get the linked reference
/// for their language, or keep their current value when nothing is linked.
/// LPIs in a language the authority does not maintain keep their references.
pub fn patch_lpis(
    lpis: &[LpiRecord],
    patch: &LpiPatch,
    lookup: &dyn LinkedLookup,
    languages: &[Language],
) -> Vec<LpiRecord> {
    lpis.iter()
        .map(|lpi| {
            let mut lpi = lpi.clone();
            lpi.set_change_type(ChangeType::Update);

            if let Some(usrn) = patch.usrn {
                lpi.usrn = usrn;
            }
            if let Some(post_town) = patch.post_town_ref {
                if let Some(value) =
                    localised_ref(lookup, languages, LookupKind::PostTown, post_town, lpi.language)
                {
                    lpi.post_town_ref = Some(value);
                }
            }
            if let Some(sub_locality) = patch.sub_locality_ref {
                if let Some(value) =
                    localised_ref(lookup, languages, LookupKind::SubLocality, sub_locality, lpi.language)
                {
                    lpi.sub_locality_ref = Some(value);
                }
            }
            if let Some(postcode) = patch.postcode_ref {
                lpi.postcode_ref = Some(postcode);
            }
            if let Some(flag) = &patch.official_flag {
                lpi.official_flag = Some(flag.clone());
            }
            if let Some(postal) = &patch.postal_address {
                lpi.postal_address = Some(postal.clone());
            }
            if let Some(addressable) = &patch.postally_addressable {
                lpi.postally_addressable = Some(addressable.clone());
            }
            if let Some(status) = patch.logical_status {
                lpi.logical_status = status;
            }
            lpi
        })
        .collect()
}

fn localised_ref(
    lookup: &dyn LinkedLookup,
    languages: &[Language],
    kind: LookupKind,
    english_ref: LookupRef,
    language: Language,
) -> Option<LookupRef> {
    match language {
        Language::English => Some(english_ref),
        other if languages.contains(&other) => lookup.resolve(kind, english_ref, other),
        _ => None,
    }
}

// ============================================================================
// LOGICAL STATUS
// ============================================================================

/// Move the BLPU and its LPIs to the transition's logical status.
///
/// Approval is refused when any language holds more than one LPI, since only
/// one of them could become the approved address. Historicising ends every
/// open record on `reference_date`.
pub fn apply_status_transition(
    property: &mut Property,
    change: &LogicalStatusChange,
    reference_date: RecordDate,
) -> Result<(), PropertyFieldError> {
    if change.transition == StatusTransition::Approve {
        if let Some((language, count)) = property
            .lpi_counts_by_language()
            .into_iter()
            .find(|(_, count)| *count > 1)
        {
            return Err(PropertyFieldError::new(
                ErrorCategory::Lpi,
                "logicalStatus",
                format!(
                    "Cannot approve: there are {} {} LPIs and only one can be approved.",
                    count, language
                ),
            ));
        }
    }

    let status = change.transition.target_status();
    property.logical_status = status;
    if let Some(state) = change.blpu_state {
        property.blpu_state = Some(state);
        property.blpu_state_date = change.blpu_state_date.or(Some(reference_date));
    }

    for lpi in &mut property.lpis {
        lpi.logical_status = status;
        lpi.set_change_type(ChangeType::Update);
    }

    if change.transition == StatusTransition::Historicise {
        stamp_historic(property, reference_date);
    }
    Ok(())
}

/// End the BLPU and every open child record on `end_date`.
fn stamp_historic(property: &mut Property, end_date: RecordDate) {
    if property.end_date.is_none() {
        property.end_date = Some(end_date);
    }
    close_open(&mut property.lpis, end_date);
    close_open(&mut property.cross_refs, end_date);
    close_open(&mut property.provenances, end_date);
    close_open(&mut property.classifications, end_date);
    close_open(&mut property.organisations, end_date);
    close_open(&mut property.successor_cross_refs, end_date);
}

fn close_open<T: ChildRecord>(records: &mut [T], end_date: RecordDate) {
    records
        .iter_mut()
        .filter(|r| r.is_open())
        .for_each(|r| r.close(end_date, ChangeType::Update));
}

// ============================================================================
// SINGLE FIELD
// ============================================================================

/// Overwrite one BLPU-level field.
pub fn apply_field_edit(property: &mut Property, edit: &BlpuFieldEdit, reference_date: RecordDate) {
    match edit {
        BlpuFieldEdit::Level(level) => property.level = *level,
        BlpuFieldEdit::Rpc(rpc) => property.rpc = *rpc,
        BlpuFieldEdit::State { state, state_date } => {
            property.blpu_state = *state;
            property.blpu_state_date = match state {
                Some(_) => state_date.or(Some(reference_date)),
                None => None,
            };
        }
        BlpuFieldEdit::ExcludeFromExport(value) => property.exclude_from_export = *value,
        BlpuFieldEdit::SiteVisitRequired(value) => property.site_visit_required = *value,
    }
}
