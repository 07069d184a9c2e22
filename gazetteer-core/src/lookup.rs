//! External collaborator traits: reference lookups and change validation

use crate::{AuthorityVariant, ChangeSpec, FieldError, Language, LookupRef};
use serde::{Deserialize, Serialize};

/// Lookup tables whose entries are linked across languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupKind {
    PostTown,
    SubLocality,
}

/// Resolves the entry linked to `ref_value` in another language.
///
/// Implementations sit on top of the lookup cache and return `None` when no
/// linked entry exists.
pub trait LinkedLookup: Send + Sync {
    fn resolve(
        &self,
        kind: LookupKind,
        ref_value: LookupRef,
        target_language: Language,
    ) -> Option<LookupRef>;
}

/// Lookup with no linked entries, for single-language authorities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinkedLookup;

impl LinkedLookup for NoLinkedLookup {
    fn resolve(&self, _: LookupKind, _: LookupRef, _: Language) -> Option<LookupRef> {
        None
    }
}

/// Field-level validation of a proposed change, independent of any property.
///
/// Implementations own whatever reference data they check against.
pub trait ChangeValidator: Send + Sync {
    fn validate(&self, change: &ChangeSpec, variant: AuthorityVariant) -> Vec<FieldError>;
}
