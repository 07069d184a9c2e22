//! Identity types for gazetteer records

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique Property Reference Number, the external identifier of a BLPU.
pub type Uprn = i64;

/// Primary key of a child row. Positive once persisted, negative while provisional.
pub type PkId = i64;

/// Unique Street Reference Number.
pub type Usrn = i64;

/// Reference into a lookup table (post town, sub-locality, postcode).
pub type LookupRef = i64;

/// Calendar date used for record start/end dates.
pub type RecordDate = NaiveDate;

/// Today's date in UTC, the default reference date for a batch.
pub fn today() -> RecordDate {
    Utc::now().date_naive()
}

/// Returns true when the key was allocated locally and has not been persisted.
pub fn is_provisional_key(pk_id: PkId) -> bool {
    pk_id < 0
}

/// Identifier of a single batch run (UUIDv7, timestamp-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Generate a new batch id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
