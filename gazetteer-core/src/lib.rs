//! Gazetteer Core - Entity Types
//!
//! Data model for BLPU/LPI property aggregates, the change specification a
//! multi-edit batch applies, the error taxonomy, and configuration.
//! All other crates depend on this one.

pub mod change;
pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod lookup;

pub use change::{
    BlpuFieldEdit, ChangeKind, ChangeSpec, ClassificationChange, CrossRefChange,
    LogicalStatusChange, LpiPatch, MergeAction, StatusTransition,
};
pub use config::{BatchConfig, DEFAULT_MAX_IN_FLIGHT_SAVES};
pub use entities::{
    ChildRecord, ClassificationRecord, CrossRefRecord, KeyedRecord, LpiRecord, NoteRecord,
    OrganisationRecord, Property, ProvenanceRecord, SourcedRecord, SuccessorCrossRefRecord,
};
pub use enums::{
    AuthorityVariant, ChangeType, ChangeTypeParseError, ErrorCategory, Language, LogicalStatus,
    LogicalStatusParseError,
};
pub use error::{
    BatchError, ConfigError, FieldError, GazetteerError, GazetteerResult, PropertyFieldError,
    SaveFailure, StorageError, ValidationError,
};
pub use identity::{
    is_provisional_key, today, BatchId, LookupRef, PkId, RecordDate, Uprn, Usrn,
};
pub use lookup::{ChangeValidator, LinkedLookup, LookupKind, NoLinkedLookup};
