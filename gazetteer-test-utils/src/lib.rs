//! Gazetteer Test Utilities
//!
//! Shared test infrastructure for the gazetteer workspace:
//! - A scripted repository with per-property save delays and call logs
//! - A map-backed linked lookup for bilingual authorities
//! - Proptest generators for records and aggregates
//! - Fixtures for common property shapes
//! - Assertions for batch outcomes

pub use gazetteer_storage::{InMemoryPropertyStore, PropertyRepository, SaveResult};

pub use gazetteer_core::{
    AuthorityVariant, BatchConfig, ChangeKind, ChangeSpec, ChangeType, ClassificationRecord,
    CrossRefRecord, ErrorCategory, FieldError, GazetteerResult, Language, LinkedLookup,
    LogicalStatus, LookupKind, LookupRef, LpiRecord, NoteRecord, OrganisationRecord, Property,
    PropertyFieldError, RecordDate, Uprn,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber filtered by `RUST_LOG`. Safe to call from every test.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gazetteer_batch=debug,warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// SCRIPTED REPOSITORY
// ============================================================================

/// Repository wrapping an in-memory store with scripted timing.
///
/// Records the order properties are fetched in and the peak number of saves
/// running at once. Saves for a UPRN can be delayed to force out-of-order
/// completion.
#[derive(Debug, Default)]
pub struct ScriptedRepository {
    store: InMemoryPropertyStore,
    save_delays: RwLock<HashMap<Uprn, Duration>>,
    fetch_log: Mutex<Vec<Uprn>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedRepository {
    pub fn new(store: InMemoryPropertyStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn with_properties(properties: impl IntoIterator<Item = Property>) -> Self {
        Self::new(InMemoryPropertyStore::with_properties(properties))
    }

    /// Hold the save of `uprn` for `delay` before it reaches the store.
    pub fn delay_save(&self, uprn: Uprn, delay: Duration) {
        self.save_delays
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uprn, delay);
    }

    pub fn store(&self) -> &InMemoryPropertyStore {
        &self.store
    }

    /// UPRNs in the order they were fetched.
    pub fn fetch_log(&self) -> Vec<Uprn> {
        self.fetch_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Highest number of saves that were running at the same time.
    pub fn peak_in_flight_saves(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropertyRepository for ScriptedRepository {
    async fn fetch_property(&self, uprn: Uprn) -> GazetteerResult<Option<Property>> {
        self.fetch_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(uprn);
        self.store.fetch_property(uprn).await
    }

    async fn save_property(
        &self,
        property: &Property,
        is_minor_change: bool,
        variant: AuthorityVariant,
    ) -> SaveResult {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self
            .save_delays
            .read()
            .ok()
            .and_then(|delays| delays.get(&property.uprn).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .store
            .save_property(property, is_minor_change, variant)
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// LINKED LOOKUP
// ============================================================================

/// Linked lookup backed by a map of `(kind, english ref, language)` entries.
#[derive(Debug, Clone, Default)]
pub struct MapLinkedLookup {
    links: HashMap<(LookupKind, LookupRef, Language), LookupRef>,
}

impl MapLinkedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, kind: LookupKind, english_ref: LookupRef, language: Language, linked: LookupRef) -> Self {
        self.links.insert((kind, english_ref, language), linked);
        self
    }
}

impl LinkedLookup for MapLinkedLookup {
    fn resolve(&self, kind: LookupKind, ref_value: LookupRef, target_language: Language) -> Option<LookupRef> {
        self.links.get(&(kind, ref_value, target_language)).copied()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for gazetteer records and aggregates.

    use super::fixtures::LpiFixture;
    use super::*;
    use proptest::prelude::*;

    /// Generate a UPRN in the usual 12-digit range.
    pub fn arb_uprn() -> impl Strategy<Value = Uprn> {
        1_000_000_000i64..100_000_000_000_000
    }

    /// Generate a date between 2000 and 2030.
    pub fn arb_date() -> impl Strategy<Value = RecordDate> {
        (0i64..11_000).prop_map(|offset| fixtures::date(2000, 1, 1) + chrono::Duration::days(offset))
    }

    /// Generate a persisted or provisional key.
    pub fn arb_pk_id() -> impl Strategy<Value = i64> {
        prop_oneof![1i64..100_000, -50i64..-9]
    }

    pub fn arb_language() -> impl Strategy<Value = Language> {
        prop_oneof![
            Just(Language::English),
            Just(Language::Welsh),
            Just(Language::Gaelic),
        ]
    }

    pub fn arb_logical_status() -> impl Strategy<Value = LogicalStatus> {
        prop_oneof![
            Just(LogicalStatus::Approved),
            Just(LogicalStatus::Alternative),
            Just(LogicalStatus::Provisional),
            Just(LogicalStatus::Historical),
        ]
    }

    /// Generate a classification row, open or closed.
    pub fn arb_classification(uprn: Uprn) -> impl Strategy<Value = ClassificationRecord> {
        (arb_pk_id(), "[A-Z]{2}[0-9]{2}", arb_date(), prop::option::of(arb_date())).prop_map(
            move |(pk_id, blpu_class, start_date, end_date)| ClassificationRecord {
                pk_id,
                class_key: Some(format!("CL{}", pk_id)),
                uprn,
                blpu_class,
                class_scheme: "OS Classification Scheme".to_string(),
                start_date: Some(start_date),
                end_date,
                change_type: None,
            },
        )
    }

    /// Generate a cross reference row from one of a few sources.
    pub fn arb_cross_ref(uprn: Uprn) -> impl Strategy<Value = CrossRefRecord> {
        (arb_pk_id(), 1i32..5, "[A-Z0-9]{6,10}", prop::option::of(arb_date())).prop_map(
            move |(pk_id, source_id, cross_reference, end_date)| CrossRefRecord {
                pk_id,
                xref_key: None,
                uprn,
                source_id,
                source: Some(format!("SRC{}", source_id)),
                cross_reference,
                start_date: None,
                end_date,
                change_type: None,
            },
        )
    }

    pub fn arb_note(uprn: Uprn) -> impl Strategy<Value = NoteRecord> {
        (arb_pk_id(), 1i32..50, "[a-z ]{1,40}").prop_map(move |(pk_id, seq_num, note)| NoteRecord {
            pk_id,
            uprn,
            seq_num,
            note,
            last_user: None,
            change_type: None,
        })
    }

    pub fn arb_lpi(uprn: Uprn) -> impl Strategy<Value = LpiRecord> {
        (arb_pk_id(), arb_language(), arb_logical_status(), 1i64..50_000, 1i32..200).prop_map(
            move |(pk_id, language, logical_status, usrn, number)| {
                fixtures::lpi(uprn, language, &format!("{} High Street", number))
                    .with_key(pk_id)
                    .with_status(logical_status)
                    .with_usrn(usrn)
            },
        )
    }

    /// Generate a property with a handful of child rows in every collection.
    pub fn arb_property() -> impl Strategy<Value = Property> {
        arb_uprn().prop_flat_map(|uprn| {
            (
                prop::collection::vec(arb_classification(uprn), 0..4),
                prop::collection::vec(arb_cross_ref(uprn), 0..4),
                prop::collection::vec(arb_note(uprn), 0..3),
                prop::collection::vec(arb_lpi(uprn), 0..3),
            )
                .prop_map(move |(classifications, cross_refs, notes, lpis)| {
                    let mut property = Property::new(uprn, 350_000.0, 450_000.0);
                    property.classifications = classifications;
                    property.cross_refs = cross_refs;
                    property.notes = notes;
                    property.lpis = lpis;
                    property
                })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built properties and records for common scenarios.

    use super::*;
    use chrono::NaiveDate;

    /// Builder-style helpers for LPI fixtures.
    pub trait LpiFixture {
        fn with_key(self, pk_id: i64) -> Self;
        fn with_status(self, status: LogicalStatus) -> Self;
        fn with_usrn(self, usrn: i64) -> Self;
    }

    impl LpiFixture for LpiRecord {
        fn with_key(mut self, pk_id: i64) -> Self {
            self.pk_id = pk_id;
            self
        }

        fn with_status(mut self, status: LogicalStatus) -> Self {
            self.logical_status = status;
            self
        }

        fn with_usrn(mut self, usrn: i64) -> Self {
            self.usrn = usrn;
            self
        }
    }

    /// A fixed date for tests that should not depend on today.
    pub fn date(year: i32, month: u32, day: u32) -> RecordDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("fixture date is valid")
    }

    /// Reference date used throughout the scenario tests.
    pub fn reference_date() -> RecordDate {
        date(2024, 6, 1)
    }

    /// An approved LPI with the given address.
    pub fn lpi(uprn: Uprn, language: Language, address: &str) -> LpiRecord {
        LpiRecord {
            pk_id: 1,
            lpi_key: Some(format!("LPI{}{}", uprn, language)),
            uprn,
            language,
            logical_status: LogicalStatus::Approved,
            usrn: 12_000_001,
            sao_text: None,
            pao_text: None,
            pao_start_number: None,
            post_town_ref: Some(10),
            sub_locality_ref: None,
            postcode_ref: Some(30),
            official_flag: Some("Y".to_string()),
            postal_address: Some("Y".to_string()),
            postally_addressable: Some("Y".to_string()),
            address: address.to_string(),
            start_date: Some(date(2015, 4, 1)),
            end_date: None,
            change_type: None,
        }
    }

    /// An open classification row.
    pub fn open_classification(uprn: Uprn, pk_id: i64, blpu_class: &str) -> ClassificationRecord {
        ClassificationRecord {
            pk_id,
            class_key: Some(format!("CL{}", pk_id)),
            uprn,
            blpu_class: blpu_class.to_string(),
            class_scheme: "OS Classification Scheme".to_string(),
            start_date: Some(date(2015, 4, 1)),
            end_date: None,
            change_type: None,
        }
    }

    /// An open cross reference row.
    pub fn open_cross_ref(uprn: Uprn, pk_id: i64, source_id: i32, value: &str) -> CrossRefRecord {
        CrossRefRecord {
            pk_id,
            xref_key: None,
            uprn,
            source_id,
            source: Some(format!("SRC{}", source_id)),
            cross_reference: value.to_string(),
            start_date: Some(date(2015, 4, 1)),
            end_date: None,
            change_type: None,
        }
    }

    /// A note row.
    pub fn note(uprn: Uprn, pk_id: i64, seq_num: i32) -> NoteRecord {
        NoteRecord {
            pk_id,
            uprn,
            seq_num,
            note: format!("Note {}", seq_num),
            last_user: None,
            change_type: None,
        }
    }

    /// An approved residential property with one English LPI.
    pub fn residential_property(uprn: Uprn, address: &str) -> Property {
        let mut property = Property::new(uprn, 350_000.0, 450_000.0);
        property.blpu_class = Some("RD04".to_string());
        property.start_date = Some(date(2015, 4, 1));
        property.lpis.push(lpi(uprn, Language::English, address).with_key(uprn * 10));
        property
    }

    /// A property with one English and one Welsh LPI.
    pub fn bilingual_property(uprn: Uprn, english: &str, welsh: &str) -> Property {
        let mut property = residential_property(uprn, english);
        property
            .lpis
            .push(lpi(uprn, Language::Welsh, welsh).with_key(uprn * 10 + 1));
        property
    }

    /// A property with the given open classifications.
    pub fn classified_property(uprn: Uprn, address: &str, classes: &[&str]) -> Property {
        let mut property = residential_property(uprn, address);
        for (i, class) in classes.iter().enumerate() {
            property
                .classifications
                .push(open_classification(uprn, uprn * 100 + i as i64, class));
        }
        property
    }

    /// Configuration for a Scottish authority.
    pub fn scottish_config() -> BatchConfig {
        BatchConfig::scottish(false)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for batch outcomes.

    use super::*;

    /// Assert that every row of every collection carries a real key and no change type.
    #[track_caller]
    pub fn assert_persisted(property: &Property) {
        assert!(property.change_type.is_none(), "BLPU still tagged: {:?}", property.change_type);
        let keys = property
            .classifications
            .iter()
            .map(|r| (r.pk_id, r.change_type))
            .chain(property.cross_refs.iter().map(|r| (r.pk_id, r.change_type)))
            .chain(property.notes.iter().map(|r| (r.pk_id, r.change_type)))
            .chain(property.lpis.iter().map(|r| (r.pk_id, r.change_type)));
        for (pk_id, change_type) in keys {
            assert!(pk_id > 0, "row kept provisional key {}", pk_id);
            assert!(change_type.is_none(), "row {} still tagged {:?}", pk_id, change_type);
        }
    }

    /// Assert that a field error list names exactly `fields`, in order.
    #[track_caller]
    pub fn assert_fields(errors: &[FieldError], fields: &[&str]) {
        let actual: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(actual, fields);
    }
}
