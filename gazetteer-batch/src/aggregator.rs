//! Batch result aggregation and failure reporting.
//!
//! The aggregator counts each property of a batch exactly once, whatever
//! order the outcomes arrive in, and renders failures as the categorised text
//! shown to the user.

use crate::rewrite::RewriteError;
use gazetteer_core::{ErrorCategory, Property, PropertyFieldError, SaveFailure, Uprn};
use serde::Serialize;
use std::collections::HashSet;

/// Shown when a save failed without field errors.
pub const GENERIC_SAVE_FAILURE: &str = "Failed to save property.";

/// Shown when a property could not be fetched.
pub const FETCH_FAILURE: &str = "Property could not be retrieved.";

// ============================================================================
// STATE AND PROGRESS
// ============================================================================

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BatchState {
    Idle,
    Validating,
    Running,
    Completed,
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Cancelled)
    }
}

/// Snapshot published after every recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub state: BatchState,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn idle(total: usize) -> Self {
        Self {
            state: BatchState::Idle,
            succeeded: 0,
            failed: 0,
            total,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

// ============================================================================
// FAILURES
// ============================================================================

/// Why one property of the batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The change could not be applied; nothing was submitted.
    Rewrite(RewriteError),
    /// The repository refused or lost the save.
    Save(SaveFailure),
    /// The property could not be fetched.
    NotRetrieved,
}

impl FailureReason {
    /// Text reported against the property.
    pub fn render(&self) -> String {
        match self {
            FailureReason::Rewrite(RewriteError::Precondition(violation)) => violation.to_string(),
            FailureReason::Rewrite(RewriteError::Refused(errors))
            | FailureReason::Save(SaveFailure::Rejected { errors, .. }) => {
                let text = format_property_errors(errors);
                if text.is_empty() {
                    GENERIC_SAVE_FAILURE.to_string()
                } else {
                    text
                }
            }
            FailureReason::Save(SaveFailure::Transport { .. }) => GENERIC_SAVE_FAILURE.to_string(),
            FailureReason::NotRetrieved => FETCH_FAILURE.to_string(),
        }
    }
}

impl From<RewriteError> for FailureReason {
    fn from(error: RewriteError) -> Self {
        FailureReason::Rewrite(error)
    }
}

impl From<SaveFailure> for FailureReason {
    fn from(failure: SaveFailure) -> Self {
        FailureReason::Save(failure)
    }
}

/// Render field errors grouped by category in report order.
///
/// Each line reads `<Category> [<field>]: <errors>` with the distinct errors
/// of that field joined by `", "`. Repeated lines are dropped.
pub fn format_property_errors(errors: &[PropertyFieldError]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for category in ErrorCategory::ALL {
        let mut fields: Vec<&str> = Vec::new();
        for error in errors.iter().filter(|e| e.category == category) {
            if !fields.contains(&error.field.as_str()) {
                fields.push(error.field.as_str());
            }
        }

        for field in fields {
            let mut messages: Vec<&str> = Vec::new();
            for error in errors
                .iter()
                .filter(|e| e.category == category && e.field == field)
            {
                for message in &error.errors {
                    if !message.is_empty() && !messages.contains(&message.as_str()) {
                        messages.push(message.as_str());
                    }
                }
            }
            if messages.is_empty() {
                continue;
            }

            let line = format!("{} [{}]: {}", category.label(), field, messages.join(", "));
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
    }
    lines.join("\n")
}

/// One failed property in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedProperty {
    pub uprn: Uprn,
    pub address: String,
    pub errors: String,
}

/// Final report of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub total: usize,
    pub failed_details: Vec<FailedProperty>,
    /// Aggregates as returned by the repository.
    pub saved: Vec<Property>,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Counts outcomes for the properties of one batch.
///
/// An outcome for a property that is not part of the batch, or that was
/// already counted, is ignored. Once every property is counted the totals
/// are frozen.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    expected: HashSet<Uprn>,
    processed: HashSet<Uprn>,
    succeeded: usize,
    failed: usize,
    failures: Vec<FailedProperty>,
    saved: Vec<Property>,
}

impl ResultAggregator {
    pub fn new(uprns: &[Uprn]) -> Self {
        Self {
            expected: uprns.iter().copied().collect(),
            processed: HashSet::new(),
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            saved: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.expected.len()
    }

    /// Count a saved property. Returns false if the outcome was ignored.
    pub fn record_success(&mut self, uprn: Uprn, property: Property) -> bool {
        if !self.admit(uprn) {
            return false;
        }
        self.succeeded += 1;
        self.saved.push(property);
        true
    }

    /// Count a failed property. Returns false if the outcome was ignored.
    pub fn record_failure(&mut self, uprn: Uprn, address: String, reason: &FailureReason) -> bool {
        if !self.admit(uprn) {
            return false;
        }
        self.failed += 1;
        self.failures.push(FailedProperty {
            uprn,
            address,
            errors: reason.render(),
        });
        true
    }

    fn admit(&mut self, uprn: Uprn) -> bool {
        !self.is_complete() && self.expected.contains(&uprn) && self.processed.insert(uprn)
    }

    /// Every property of a non-empty batch has been counted.
    pub fn is_complete(&self) -> bool {
        self.total() > 0 && self.succeeded + self.failed == self.total()
    }

    pub fn progress(&self, state: BatchState) -> BatchProgress {
        BatchProgress {
            state,
            succeeded: self.succeeded,
            failed: self.failed,
            total: self.total(),
        }
    }

    /// Snapshot of the report so far.
    pub fn summary(&self) -> BatchSummary {
        self.clone().into_summary()
    }

    /// Consume the aggregator into its final report.
    pub fn into_summary(self) -> BatchSummary {
        BatchSummary {
            succeeded_count: self.succeeded,
            failed_count: self.failed,
            total: self.total(),
            failed_details: self.failures,
            saved: self.saved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{CollectionFamily, PreconditionViolation};
    use gazetteer_core::MergeAction;

    fn failure(category: ErrorCategory, field: &str, errors: &[&str]) -> PropertyFieldError {
        PropertyFieldError {
            category,
            field: field.to_string(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_format_orders_by_category() {
        let errors = vec![
            failure(ErrorCategory::Note, "note", &["Too long."]),
            failure(ErrorCategory::Blpu, "rpc", &["Invalid."]),
            failure(ErrorCategory::CrossRef, "source", &["Required."]),
        ];
        assert_eq!(
            format_property_errors(&errors),
            "BLPU [rpc]: Invalid.\nCross reference [source]: Required.\nNote [note]: Too long."
        );
    }

    #[test]
    fn test_format_merges_duplicate_errors() {
        let errors = vec![
            failure(ErrorCategory::Lpi, "usrn", &["Street not found.", "Street closed."]),
            failure(ErrorCategory::Lpi, "usrn", &["Street not found."]),
            failure(ErrorCategory::Lpi, "postcode", &["Invalid postcode."]),
        ];
        assert_eq!(
            format_property_errors(&errors),
            "LPI [usrn]: Street not found., Street closed.\nLPI [postcode]: Invalid postcode."
        );
    }

    #[test]
    fn test_render_falls_back_to_generic_marker() {
        let transport = FailureReason::Save(SaveFailure::Transport {
            uprn: 1,
            reason: "connection reset".to_string(),
        });
        assert_eq!(transport.render(), GENERIC_SAVE_FAILURE);

        let empty = FailureReason::Save(SaveFailure::Rejected { uprn: 1, errors: vec![] });
        assert_eq!(empty.render(), GENERIC_SAVE_FAILURE);

        assert_eq!(FailureReason::NotRetrieved.render(), FETCH_FAILURE);
    }

    #[test]
    fn test_render_precondition() {
        let reason = FailureReason::from(RewriteError::from(PreconditionViolation::ActionRequired {
            family: CollectionFamily::Classification,
        }));
        assert_eq!(reason.render(), "Select what should be done with the existing classification.");
        let reason = FailureReason::from(RewriteError::from(
            PreconditionViolation::MultipleOpenRecords {
                action: MergeAction::Update,
                family: CollectionFamily::SuccessorCrossRef,
            },
        ));
        assert_eq!(
            reason.render(),
            "Update can only be used when there is only 1 previous open successor cross reference."
        );
    }

    #[test]
    fn test_aggregator_ignores_duplicates() {
        let mut aggregator = ResultAggregator::new(&[1, 2]);
        assert!(aggregator.record_failure(1, "1 High St".to_string(), &FailureReason::NotRetrieved));
        assert!(!aggregator.record_failure(1, "1 High St".to_string(), &FailureReason::NotRetrieved));
        assert!(!aggregator.record_success(1, Property::new(1, 0.0, 0.0)));
        let progress = aggregator.progress(BatchState::Running);
        assert_eq!((progress.succeeded, progress.failed), (0, 1));
        assert!(!aggregator.is_complete());
    }

    #[test]
    fn test_aggregator_ignores_foreign_properties() {
        let mut aggregator = ResultAggregator::new(&[1]);
        assert!(!aggregator.record_success(9, Property::new(9, 0.0, 0.0)));
        assert_eq!(aggregator.progress(BatchState::Running).processed(), 0);
    }

    #[test]
    fn test_aggregator_completes() {
        let mut aggregator = ResultAggregator::new(&[1, 2]);
        aggregator.record_success(2, Property::new(2, 0.0, 0.0));
        aggregator.record_failure(1, "1 High St".to_string(), &FailureReason::NotRetrieved);
        assert!(aggregator.is_complete());

        let summary = aggregator.into_summary();
        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.failed_details[0].uprn, 1);
        assert_eq!(summary.failed_details[0].errors, FETCH_FAILURE);
        assert_eq!(summary.saved[0].uprn, 2);
    }

    #[test]
    fn test_summary_wire_names() {
        let mut aggregator = ResultAggregator::new(&[4]);
        aggregator.record_failure(4, "4 High St".to_string(), &FailureReason::NotRetrieved);
        let json = serde_json::to_value(aggregator.summary()).unwrap();
        assert_eq!(json["succeededCount"], 0);
        assert_eq!(json["failedCount"], 1);
        assert_eq!(json["failedDetails"][0]["uprn"], 4);
        assert_eq!(json["failedDetails"][0]["errors"], FETCH_FAILURE);

        let progress = serde_json::to_value(aggregator.progress(BatchState::Completed)).unwrap();
        assert_eq!(progress["state"], "Completed");
        assert_eq!(progress["total"], 1);
    }

    #[test]
    fn test_summary_snapshot_matches_final_report() {
        let mut aggregator = ResultAggregator::new(&[1, 2]);
        aggregator.record_success(1, Property::new(1, 0.0, 0.0));

        let snapshot = aggregator.summary();
        assert_eq!(snapshot.succeeded_count, 1);
        assert_eq!(snapshot.total, 2);

        aggregator.record_failure(2, "2 High St".to_string(), &FailureReason::NotRetrieved);
        let snapshot = aggregator.summary();
        assert_eq!(snapshot, aggregator.into_summary());
    }

    #[test]
    fn test_empty_batch_never_completes() {
        let aggregator = ResultAggregator::new(&[]);
        assert!(!aggregator.is_complete());
        assert_eq!(aggregator.summary().total, 0);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// However outcomes arrive, each property is counted once and the
        /// counts add up to the batch size.
        #[test]
        fn prop_each_property_counted_once(
            uprns in prop::collection::hash_set(1i64..1000, 1..30),
            outcomes in prop::collection::vec((0usize..40, any::<bool>()), 0..120),
        ) {
            let uprns: Vec<Uprn> = uprns.into_iter().collect();
            let mut aggregator = ResultAggregator::new(&uprns);
            for (index, success) in outcomes {
                let uprn = uprns[index % uprns.len()];
                if success {
                    aggregator.record_success(uprn, Property::new(uprn, 0.0, 0.0));
                } else {
                    aggregator.record_failure(uprn, String::new(), &FailureReason::NotRetrieved);
                }
            }
            for uprn in &uprns {
                aggregator.record_failure(*uprn, String::new(), &FailureReason::NotRetrieved);
            }
            let summary = aggregator.summary();
            prop_assert_eq!(summary.succeeded_count + summary.failed_count, uprns.len());
            prop_assert_eq!(summary.saved.len(), summary.succeeded_count);
            prop_assert_eq!(summary.failed_details.len(), summary.failed_count);
            prop_assert!(aggregator.is_complete());
        }
    }
}
