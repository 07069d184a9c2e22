//! Async repository trait for property aggregates.
//!
//! The batch engine fetches and saves whole BLPU aggregates; it never
//! touches child rows through separate endpoints.

use ::async_trait::async_trait;
use gazetteer_core::{AuthorityVariant, GazetteerResult, Property, SaveFailure, Uprn};

/// Outcome of a single save, tagged with the property it belongs to.
pub type SaveResult = Result<Property, SaveFailure>;

/// Fetch-by-id and save operations for a property aggregate.
#[async_trait]
pub trait PropertyRepository: Send + Sync {
    /// Get a property aggregate by UPRN. `Ok(None)` when it does not exist.
    async fn fetch_property(&self, uprn: Uprn) -> GazetteerResult<Option<Property>>;

    /// Persist an updated aggregate.
    ///
    /// Rows tagged `I` receive real keys, rows tagged `U` or `D` are written,
    /// untagged rows are left as they are. Returns the aggregate as stored.
    async fn save_property(
        &self,
        property: &Property,
        is_minor_change: bool,
        variant: AuthorityVariant,
    ) -> SaveResult;
}
