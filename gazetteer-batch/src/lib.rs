//! Gazetteer Batch - Multi-Edit Engine
//!
//! Applies one proposed change to many property aggregates. Properties are
//! fetched one at a time, rewritten through the merge policy or a field patch,
//! and saved concurrently; outcomes are aggregated into a single report of
//! successes and categorised failures.

pub mod aggregator;
pub mod allocator;
pub mod merge;
pub mod orchestrator;
pub mod patch;
pub mod rewrite;
pub mod validation;

pub use aggregator::{
    format_property_errors, BatchProgress, BatchState, BatchSummary, FailedProperty,
    FailureReason, ResultAggregator, FETCH_FAILURE, GENERIC_SAVE_FAILURE,
};
pub use allocator::{allocate_child_key, allocate_note_sequence, FIRST_PROVISIONAL_KEY};
pub use merge::{merge_records, merge_sourced, CollectionFamily, PreconditionViolation};
pub use orchestrator::{BatchHandle, BatchOrchestrator};
pub use patch::{apply_field_edit, apply_status_transition, patch_lpis};
pub use rewrite::{rewrite_property, RewriteContext, RewriteError};
pub use validation::{RequiredFieldValidator, MAX_NOTE_LENGTH};
