//! Batch orchestration.
//!
//! A batch applies one proposed change to a list of properties. Two tasks
//! run per batch:
//!
//! - the driver fetches properties one at a time, rewrites each and spawns
//!   its save without waiting for it
//! - the aggregator owns the counters; every outcome reaches it as a message
//!   tagged with the property's UPRN, so out-of-order saves are counted once
//!
//! Progress is published on a `watch` channel. Cancelling stops the driver
//! before its next fetch; saves already dispatched finish and are counted.

use crate::aggregator::{BatchProgress, BatchState, BatchSummary, FailureReason, ResultAggregator};
use crate::rewrite::{rewrite_property, RewriteContext};
use gazetteer_core::{
    BatchConfig, BatchError, BatchId, ChangeSpec, ChangeValidator, GazetteerResult, LinkedLookup,
    Property, SaveFailure, Uprn,
};
use gazetteer_storage::PropertyRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Outcome of one property, sent from the driver or a save task.
#[derive(Debug)]
enum Outcome {
    Saved {
        uprn: Uprn,
        address: String,
        result: Result<Property, SaveFailure>,
    },
    Failed {
        uprn: Uprn,
        address: String,
        reason: FailureReason,
    },
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Starts batches against a repository.
pub struct BatchOrchestrator<R, V, L> {
    repository: Arc<R>,
    validator: Arc<V>,
    lookup: Arc<L>,
    config: BatchConfig,
    user: Option<String>,
}

impl<R, V, L> BatchOrchestrator<R, V, L>
where
    R: PropertyRepository + 'static,
    V: ChangeValidator + 'static,
    L: LinkedLookup + 'static,
{
    /// Create an orchestrator. Fails if `config` is invalid.
    pub fn new(
        repository: Arc<R>,
        validator: Arc<V>,
        lookup: Arc<L>,
        config: BatchConfig,
    ) -> GazetteerResult<Self> {
        config.validate()?;
        Ok(Self {
            repository,
            validator,
            lookup,
            config,
            user: None,
        })
    }

    /// Record `user` as the author of notes appended by batches.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Validate `change` and start applying it to `uprns`.
    ///
    /// Nothing is fetched when validation fails. A UPRN listed more than once
    /// is processed once. Must be called from within a tokio runtime.
    pub fn start(&self, uprns: Vec<Uprn>, change: ChangeSpec) -> Result<BatchHandle, BatchError> {
        let batch_id = BatchId::new();
        let uprns = distinct(uprns);
        let (progress_tx, progress_rx) = watch::channel(BatchProgress::idle(uprns.len()));

        progress_tx.send_modify(|p| p.state = BatchState::Validating);
        let errors = self.validator.validate(&change, self.config.authority_variant);
        if !errors.is_empty() {
            tracing::warn!(
                batch_id = %batch_id,
                field_errors = errors.len(),
                "Proposed change failed validation, batch not started"
            );
            return Err(BatchError::InvalidChange { errors });
        }

        let aggregator = ResultAggregator::new(&uprns);
        progress_tx.send_replace(aggregator.progress(BatchState::Running));

        tracing::info!(
            batch_id = %batch_id,
            total = uprns.len(),
            variant = %self.config.authority_variant,
            minor_change = change.is_minor_change,
            "Batch started"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("batch", batch_id = %batch_id);

        let summary = tokio::spawn(
            aggregate(aggregator, outcome_rx, progress_tx, cancel_rx.clone()).instrument(span.clone()),
        );

        let driver = BatchDriver {
            repository: Arc::clone(&self.repository),
            lookup: Arc::clone(&self.lookup),
            config: self.config.clone(),
            user: self.user.clone(),
            change,
            saves: Arc::new(Semaphore::new(self.config.max_in_flight_saves)),
        };
        let driver = tokio::spawn(driver.run(uprns, outcome_tx, cancel_rx).instrument(span));

        Ok(BatchHandle {
            id: batch_id,
            progress: progress_rx,
            cancel: cancel_tx,
            driver,
            summary,
        })
    }
}

/// Drop repeated UPRNs, keeping the first occurrence.
fn distinct(uprns: Vec<Uprn>) -> Vec<Uprn> {
    let mut seen = HashSet::with_capacity(uprns.len());
    let before = uprns.len();
    let unique: Vec<Uprn> = uprns.into_iter().filter(|u| seen.insert(*u)).collect();
    if unique.len() != before {
        tracing::debug!(
            requested = before,
            distinct = unique.len(),
            "Repeated properties removed from batch"
        );
    }
    unique
}

// ============================================================================
// HANDLE
// ============================================================================

/// Handle to a running batch.
///
/// Dropping the handle does not stop the batch.
#[derive(Debug)]
pub struct BatchHandle {
    id: BatchId,
    progress: watch::Receiver<BatchProgress>,
    cancel: watch::Sender<bool>,
    driver: JoinHandle<()>,
    summary: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Latest published progress.
    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    pub fn state(&self) -> BatchState {
        self.progress.borrow().state
    }

    /// Receiver notified on every progress change.
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    /// Stop fetching further properties. Saves already dispatched still finish
    /// and are counted; nothing is rolled back.
    ///
    /// A property fetched before the call is still saved, even if its save
    /// was waiting for a free slot.
    pub fn cancel(&self) {
        tracing::info!(batch_id = %self.id, "Batch cancellation requested");
        self.cancel.send_replace(true);
    }

    /// Wait until every dispatched save has reported and return the summary.
    pub async fn wait(self) -> Result<BatchSummary, BatchError> {
        self.driver.await.map_err(|e| BatchError::Aborted {
            reason: format!("batch driver failed: {}", e),
        })?;
        self.summary.await.map_err(|e| BatchError::Aborted {
            reason: format!("batch aggregator failed: {}", e),
        })
    }
}

// ============================================================================
// DRIVER
// ============================================================================

struct BatchDriver<R, L> {
    repository: Arc<R>,
    lookup: Arc<L>,
    config: BatchConfig,
    user: Option<String>,
    change: ChangeSpec,
    saves: Arc<Semaphore>,
}

impl<R, L> BatchDriver<R, L>
where
    R: PropertyRepository + 'static,
    L: LinkedLookup + 'static,
{
    async fn run(
        self,
        uprns: Vec<Uprn>,
        outcomes: mpsc::UnboundedSender<Outcome>,
        cancel: watch::Receiver<bool>,
    ) {
        for uprn in uprns {
            let cancelled = *cancel.borrow();
            if cancelled {
                tracing::info!("Batch cancelled, remaining properties not fetched");
                break;
            }

            let current = match self.repository.fetch_property(uprn).await {
                Ok(Some(property)) => property,
                Ok(None) => {
                    self.report_fetch_failure(uprn, "not found", &outcomes);
                    continue;
                }
                Err(e) => {
                    self.report_fetch_failure(uprn, &e.to_string(), &outcomes);
                    continue;
                }
            };

            let address = current.display_address();
            let ctx = RewriteContext {
                variant: self.config.authority_variant,
                lookup: self.lookup.as_ref(),
                languages: &self.config.languages,
                user: self.user.as_deref(),
            };
            let updated = match rewrite_property(&current, &self.change, ctx) {
                Ok(updated) => updated,
                Err(error) => {
                    tracing::warn!(uprn, error = %error, "Change could not be applied to property");
                    let _ = outcomes.send(Outcome::Failed {
                        uprn,
                        address,
                        reason: error.into(),
                    });
                    continue;
                }
            };

            let permit = match Arc::clone(&self.saves).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let repository = Arc::clone(&self.repository);
            let outcomes = outcomes.clone();
            let is_minor_change = self.change.is_minor_change;
            let variant = self.config.authority_variant;

            tracing::debug!(uprn, "Property save dispatched");
            tokio::spawn(
                async move {
                    let result = repository
                        .save_property(&updated, is_minor_change, variant)
                        .await;
                    drop(permit);
                    let _ = outcomes.send(Outcome::Saved {
                        uprn,
                        address,
                        result,
                    });
                }
                .in_current_span(),
            );
        }
    }

    fn report_fetch_failure(
        &self,
        uprn: Uprn,
        reason: &str,
        outcomes: &mpsc::UnboundedSender<Outcome>,
    ) {
        if self.config.count_fetch_failures {
            tracing::warn!(uprn, reason, "Property could not be retrieved");
            let _ = outcomes.send(Outcome::Failed {
                uprn,
                address: format!("UPRN {}", uprn),
                reason: FailureReason::NotRetrieved,
            });
        } else {
            tracing::debug!(uprn, reason, "Property could not be retrieved, skipped");
        }
    }
}

// ============================================================================
// AGGREGATOR TASK
// ============================================================================

async fn aggregate(
    mut aggregator: ResultAggregator,
    mut outcomes: mpsc::UnboundedReceiver<Outcome>,
    progress: watch::Sender<BatchProgress>,
    mut cancel: watch::Receiver<bool>,
) -> BatchSummary {
    let mut state = BatchState::Running;
    let mut cancel_open = true;

    loop {
        tokio::select! {
            outcome = outcomes.recv() => {
                let Some(outcome) = outcome else {
                    break;
                };
                record(&mut aggregator, outcome);
                if state == BatchState::Running && aggregator.is_complete() {
                    state = BatchState::Completed;
                    tracing::info!("Batch completed");
                }
                progress.send_replace(aggregator.progress(state));
            }
            changed = cancel.changed(), if cancel_open => {
                if changed.is_err() {
                    cancel_open = false;
                    continue;
                }
                let cancelled = *cancel.borrow();
                if cancelled && !state.is_terminal() {
                    state = BatchState::Cancelled;
                    progress.send_replace(aggregator.progress(state));
                }
            }
        }
    }

    let summary = aggregator.into_summary();
    tracing::info!(
        succeeded = summary.succeeded_count,
        failed = summary.failed_count,
        total = summary.total,
        state = ?state,
        "Batch finished"
    );
    summary
}

fn record(aggregator: &mut ResultAggregator, outcome: Outcome) {
    let (uprn, counted) = match outcome {
        Outcome::Saved {
            uprn,
            result: Ok(property),
            ..
        } => {
            tracing::debug!(uprn, "Property saved");
            (uprn, aggregator.record_success(uprn, property))
        }
        Outcome::Saved {
            uprn,
            address,
            result: Err(failure),
        } => {
            tracing::warn!(uprn, error = %failure, "Property save failed");
            let reason = FailureReason::from(failure);
            (uprn, aggregator.record_failure(uprn, address, &reason))
        }
        Outcome::Failed {
            uprn,
            address,
            reason,
        } => (uprn, aggregator.record_failure(uprn, address, &reason)),
    };
    if !counted {
        tracing::debug!(uprn, "Outcome ignored, property already counted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RequiredFieldValidator;
    use gazetteer_core::{BlpuFieldEdit, ChangeKind, NoLinkedLookup};
    use gazetteer_storage::InMemoryPropertyStore;

    fn orchestrator(
        store: InMemoryPropertyStore,
    ) -> BatchOrchestrator<InMemoryPropertyStore, RequiredFieldValidator, NoLinkedLookup> {
        BatchOrchestrator::new(
            Arc::new(store),
            Arc::new(RequiredFieldValidator),
            Arc::new(NoLinkedLookup),
            BatchConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        assert_eq!(distinct(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BatchConfig {
            max_in_flight_saves: 0,
            ..BatchConfig::default()
        };
        let result = BatchOrchestrator::new(
            Arc::new(InMemoryPropertyStore::new()),
            Arc::new(RequiredFieldValidator),
            Arc::new(NoLinkedLookup),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rpc_edit_saves_every_property() {
        let store = InMemoryPropertyStore::with_properties(vec![
            Property::new(1, 0.0, 0.0),
            Property::new(2, 0.0, 0.0),
        ]);
        let orchestrator = orchestrator(store);
        let handle = orchestrator
            .start(vec![1, 2], ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(4))))
            .unwrap();
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.succeeded_count, 2);
        assert_eq!(summary.failed_count, 0);
        assert!(summary.saved.iter().all(|p| p.rpc == 4));
    }

    #[tokio::test]
    async fn test_invalid_change_not_started() {
        let orchestrator = orchestrator(InMemoryPropertyStore::new());
        let err = orchestrator
            .start(vec![1], ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(0))))
            .unwrap_err();
        match err {
            BatchError::InvalidChange { errors } => assert_eq!(errors[0].field, "rpc"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_stays_running() {
        let orchestrator = orchestrator(InMemoryPropertyStore::new());
        let handle = orchestrator
            .start(vec![], ChangeSpec::new(ChangeKind::SingleField(BlpuFieldEdit::Rpc(2))))
            .unwrap();
        let progress = handle.subscribe();
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(progress.borrow().state, BatchState::Running);
    }
}
