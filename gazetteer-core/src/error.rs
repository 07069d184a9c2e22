//! Error types for gazetteer batch operations

use crate::{ErrorCategory, Uprn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// FIELD-LEVEL ERROR PAYLOADS
// ============================================================================

/// Errors reported against one field of a proposed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub errors: Vec<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            errors: vec![error.into()],
        }
    }
}

/// Field error reported against one section of a property aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFieldError {
    pub category: ErrorCategory,
    pub field: String,
    pub errors: Vec<String>,
}

impl PropertyFieldError {
    pub fn new(category: ErrorCategory, field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            category,
            field: field.into(),
            errors: vec![error.into()],
        }
    }
}

// ============================================================================
// ERROR ENUMS
// ============================================================================

/// Repository errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Property not found: {uprn}")]
    NotFound { uprn: Uprn },

    #[error("Fetch failed for property {uprn}: {reason}")]
    FetchFailed { uprn: Uprn, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// A save that did not persist. Always tagged with the property it belongs to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveFailure {
    #[error("Save rejected for property {uprn} with {} field error(s)", .errors.len())]
    Rejected {
        uprn: Uprn,
        errors: Vec<PropertyFieldError>,
    },

    #[error("Save failed for property {uprn}: {reason}")]
    Transport { uprn: Uprn, reason: String },
}

impl SaveFailure {
    pub fn uprn(&self) -> Uprn {
        match self {
            SaveFailure::Rejected { uprn, .. } | SaveFailure::Transport { uprn, .. } => *uprn,
        }
    }
}

/// Validation errors for a proposed change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. } => field,
        }
    }
}

impl From<ValidationError> for FieldError {
    fn from(err: ValidationError) -> Self {
        let message = match &err {
            ValidationError::RequiredFieldMissing { .. } => "This field is required.".to_string(),
            ValidationError::InvalidValue { reason, .. } => reason.clone(),
        };
        FieldError::new(err.field(), message)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Errors that stop a batch as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Proposed change is invalid: {} field error(s)", .errors.len())]
    InvalidChange { errors: Vec<FieldError> },

    #[error("Batch aborted: {reason}")]
    Aborted { reason: String },
}

/// Master error type for all gazetteer errors.
#[derive(Debug, Clone, Error)]
pub enum GazetteerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

/// Result type alias for gazetteer operations.
pub type GazetteerResult<T> = Result<T, GazetteerError>;

// =============================================================================
// TESTS
// =============================================================================
