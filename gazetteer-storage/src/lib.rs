//! Gazetteer Storage - Repository Trait and In-Memory Implementation
//!
//! Defines the repository abstraction the batch engine fetches and saves
//! property aggregates through. Production implementations talk to the
//! gazetteer API; `InMemoryPropertyStore` backs tests and local tooling.

pub mod repository;

pub use repository::{PropertyRepository, SaveResult};

use ::async_trait::async_trait;
use gazetteer_core::{
    is_provisional_key, AuthorityVariant, ChangeType, ChildRecord, ErrorCategory,
    GazetteerError, GazetteerResult, Property, PropertyFieldError, SaveFailure, StorageError,
    Uprn,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// First real key handed out by a fresh store.
const FIRST_REAL_KEY: i64 = 1_000;

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory property store.
///
/// Saves follow the repository contract: provisional keys are replaced by
/// real keys, rows tagged `D` are dropped, and every persisted row comes back
/// untagged. Individual UPRNs can be made unreachable or rejecting to drive
/// failure paths.
#[derive(Debug)]
pub struct InMemoryPropertyStore {
    properties: Arc<RwLock<HashMap<Uprn, Property>>>,
    submitted: Arc<RwLock<Vec<Property>>>,
    rejections: Arc<RwLock<HashMap<Uprn, Vec<PropertyFieldError>>>>,
    unreachable: Arc<RwLock<HashSet<Uprn>>>,
    next_key: AtomicI64,
}

impl Default for InMemoryPropertyStore {
    fn default() -> Self {
        Self {
            properties: Arc::default(),
            submitted: Arc::default(),
            rejections: Arc::default(),
            unreachable: Arc::default(),
            next_key: AtomicI64::new(FIRST_REAL_KEY),
        }
    }
}

impl InMemoryPropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given properties.
    pub fn with_properties(properties: impl IntoIterator<Item = Property>) -> Self {
        let store = Self::new();
        for property in properties {
            store.insert(property);
        }
        store
    }

    /// Insert or replace a property.
    pub fn insert(&self, property: Property) {
        if let Ok(mut properties) = self.properties.write() {
            properties.insert(property.uprn, property);
        }
    }

    /// Current stored state of a property.
    pub fn get(&self, uprn: Uprn) -> Option<Property> {
        self.properties
            .read()
            .ok()
            .and_then(|properties| properties.get(&uprn).cloned())
    }

    /// Make every save of `uprn` fail with the given field errors.
    pub fn reject_saves(&self, uprn: Uprn, errors: Vec<PropertyFieldError>) {
        if let Ok(mut rejections) = self.rejections.write() {
            rejections.insert(uprn, errors);
        }
    }

    /// Make every fetch of `uprn` fail.
    pub fn make_unreachable(&self, uprn: Uprn) {
        if let Ok(mut unreachable) = self.unreachable.write() {
            unreachable.insert(uprn);
        }
    }

    /// Aggregates exactly as they were submitted to `save_property`, in arrival order.
    pub fn submitted(&self) -> Vec<Property> {
        self.submitted
            .read()
            .map(|submitted| submitted.clone())
            .unwrap_or_default()
    }

    /// Number of stored properties.
    pub fn property_count(&self) -> usize {
        self.properties.read().map(|p| p.len()).unwrap_or(0)
    }

    fn allocate_real_key(&self) -> i64 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    fn persist_rows<T: ChildRecord>(&self, rows: &[T]) -> Vec<T> {
        rows.iter()
            .filter(|row| row.change_type() != Some(ChangeType::Delete))
            .map(|row| {
                let mut row = row.clone();
                if is_provisional_key(row.pk_id()) {
                    row.set_pk_id(self.allocate_real_key());
                }
                row.clear_change_type();
                row
            })
            .collect()
    }

    fn persist(&self, submitted: &Property) -> Property {
        let mut stored = submitted.clone();
        stored.change_type = None;
        stored.classifications = self.persist_rows(&submitted.classifications);
        stored.cross_refs = self.persist_rows(&submitted.cross_refs);
        stored.organisations = self.persist_rows(&submitted.organisations);
        stored.successor_cross_refs = self.persist_rows(&submitted.successor_cross_refs);
        stored.provenances = self.persist_rows(&submitted.provenances);
        stored.lpis = self.persist_rows(&submitted.lpis);
        stored.notes = submitted
            .notes
            .iter()
            .map(|note| {
                let mut note = note.clone();
                if is_provisional_key(note.pk_id) {
                    note.pk_id = self.allocate_real_key();
                }
                note.change_type = None;
                note
            })
            .collect();
        stored
    }
}

/// Provisional rows must be tagged as inserts, or the server cannot know to create them.
fn untagged_provisional_rows(property: &Property) -> Vec<PropertyFieldError> {
    fn check<T: ChildRecord>(
        rows: &[T],
        category: ErrorCategory,
        errors: &mut Vec<PropertyFieldError>,
    ) {
        if rows
            .iter()
            .any(|r| is_provisional_key(r.pk_id()) && r.change_type() != Some(ChangeType::Insert))
        {
            errors.push(PropertyFieldError::new(
                category,
                "pkId",
                "Provisional key without an insert change type.",
            ));
        }
    }

    let mut errors = Vec::new();
    check(&property.classifications, ErrorCategory::Classification, &mut errors);
    check(&property.cross_refs, ErrorCategory::CrossRef, &mut errors);
    check(&property.organisations, ErrorCategory::Organisation, &mut errors);
    check(
        &property.successor_cross_refs,
        ErrorCategory::SuccessorCrossRef,
        &mut errors,
    );
    check(&property.provenances, ErrorCategory::Provenance, &mut errors);
    check(&property.lpis, ErrorCategory::Lpi, &mut errors);
    if property
        .notes
        .iter()
        .any(|n| is_provisional_key(n.pk_id) && n.change_type != Some(ChangeType::Insert))
    {
        errors.push(PropertyFieldError::new(
            ErrorCategory::Note,
            "pkId",
            "Provisional key without an insert change type.",
        ));
    }
    errors
}

#[async_trait]
impl PropertyRepository for InMemoryPropertyStore {
    async fn fetch_property(&self, uprn: Uprn) -> GazetteerResult<Option<Property>> {
        let unreachable = self
            .unreachable
            .read()
            .map_err(|_| GazetteerError::Storage(StorageError::LockPoisoned))?;
        if unreachable.contains(&uprn) {
            return Err(GazetteerError::Storage(StorageError::FetchFailed {
                uprn,
                reason: "property service unavailable".to_string(),
            }));
        }
        drop(unreachable);

        let properties = self
            .properties
            .read()
            .map_err(|_| GazetteerError::Storage(StorageError::LockPoisoned))?;
        Ok(properties.get(&uprn).cloned())
    }

    async fn save_property(
        &self,
        property: &Property,
        _is_minor_change: bool,
        _variant: AuthorityVariant,
    ) -> SaveResult {
        let uprn = property.uprn;
        let lock_failure = || SaveFailure::Transport {
            uprn,
            reason: StorageError::LockPoisoned.to_string(),
        };

        self.submitted
            .write()
            .map_err(|_| lock_failure())?
            .push(property.clone());

        if let Some(errors) = self.rejections.read().map_err(|_| lock_failure())?.get(&uprn) {
            return Err(SaveFailure::Rejected {
                uprn,
                errors: errors.clone(),
            });
        }

        let errors = untagged_provisional_rows(property);
        if !errors.is_empty() {
            return Err(SaveFailure::Rejected { uprn, errors });
        }

        let mut properties = self.properties.write().map_err(|_| lock_failure())?;
        if !properties.contains_key(&uprn) {
            return Err(SaveFailure::Transport {
                uprn,
                reason: StorageError::NotFound { uprn }.to_string(),
            });
        }
        let stored = self.persist(property);
        properties.insert(uprn, stored.clone());
        Ok(stored)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gazetteer_core::{CrossRefRecord, NoteRecord};

    fn cross_ref(pk_id: i64, change_type: Option<ChangeType>) -> CrossRefRecord {
        CrossRefRecord {
            pk_id,
            xref_key: None,
            uprn: 1,
            source_id: 3,
            source: None,
            cross_reference: format!("REF{}", pk_id),
            start_date: None,
            end_date: None,
            change_type,
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_returns_none() {
        let store = InMemoryPropertyStore::new();
        assert!(store.fetch_property(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_fails() {
        let store = InMemoryPropertyStore::with_properties([Property::new(1, 0.0, 0.0)]);
        store.make_unreachable(1);
        let result = store.fetch_property(1).await;
        assert!(matches!(
            result,
            Err(GazetteerError::Storage(StorageError::FetchFailed { uprn: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_save_assigns_real_keys_and_clears_tags() {
        let store = InMemoryPropertyStore::with_properties([Property::new(1, 0.0, 0.0)]);
        let mut property = Property::new(1, 0.0, 0.0);
        property.change_type = Some(ChangeType::Update);
        property.cross_refs.push(cross_ref(5, None));
        property.cross_refs.push(cross_ref(-10, Some(ChangeType::Insert)));
        property.notes.push(NoteRecord {
            pk_id: -10,
            uprn: 1,
            seq_num: 1,
            note: "Surveyed".to_string(),
            last_user: None,
            change_type: Some(ChangeType::Insert),
        });

        let stored = store
            .save_property(&property, false, AuthorityVariant::GeoPlace)
            .await
            .unwrap();

        assert_eq!(stored.change_type, None);
        assert_eq!(stored.cross_refs.len(), 2);
        assert_eq!(stored.cross_refs[0].pk_id, 5);
        assert!(stored.cross_refs[1].pk_id >= FIRST_REAL_KEY);
        assert!(stored.cross_refs.iter().all(|r| r.change_type.is_none()));
        assert!(stored.notes[0].pk_id >= FIRST_REAL_KEY);
        assert_eq!(store.get(1), Some(stored));
        assert_eq!(store.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_save_drops_deleted_rows() {
        let store = InMemoryPropertyStore::with_properties([Property::new(1, 0.0, 0.0)]);
        let mut property = Property::new(1, 0.0, 0.0);
        property.cross_refs.push(cross_ref(5, Some(ChangeType::Delete)));
        property.cross_refs.push(cross_ref(6, None));

        let stored = store
            .save_property(&property, false, AuthorityVariant::GeoPlace)
            .await
            .unwrap();
        assert_eq!(stored.cross_refs.len(), 1);
        assert_eq!(stored.cross_refs[0].pk_id, 6);
    }

    #[tokio::test]
    async fn test_save_rejects_untagged_provisional_rows() {
        let store = InMemoryPropertyStore::with_properties([Property::new(1, 0.0, 0.0)]);
        let mut property = Property::new(1, 0.0, 0.0);
        property.cross_refs.push(cross_ref(-10, None));

        let result = store
            .save_property(&property, false, AuthorityVariant::GeoPlace)
            .await;
        match result {
            Err(SaveFailure::Rejected { uprn, errors }) => {
                assert_eq!(uprn, 1);
                assert_eq!(errors[0].category, ErrorCategory::CrossRef);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configured_rejection_is_returned() {
        let store = InMemoryPropertyStore::with_properties([Property::new(1, 0.0, 0.0)]);
        store.reject_saves(
            1,
            vec![PropertyFieldError::new(ErrorCategory::Blpu, "rpc", "Invalid RPC.")],
        );
        let result = store
            .save_property(&Property::new(1, 0.0, 0.0), true, AuthorityVariant::GeoPlace)
            .await;
        assert!(matches!(result, Err(SaveFailure::Rejected { uprn: 1, .. })));
        assert_eq!(store.get(1).map(|p| p.rpc), Some(1));
    }

    #[tokio::test]
    async fn test_save_unknown_property_is_transport_failure() {
        let store = InMemoryPropertyStore::new();
        let result = store
            .save_property(&Property::new(9, 0.0, 0.0), false, AuthorityVariant::GeoPlace)
            .await;
        assert!(matches!(result, Err(SaveFailure::Transport { uprn: 9, .. })));
    }
}
