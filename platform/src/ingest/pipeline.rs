//! Batch processing for build log events

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::deploy::classifier::Classifier;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::PlatformError;
use crate::models::log_event::{LogEvent, StreamPayload};
use crate::store::LogStore;
use crate::stream::{Batch, StreamRecord};

/// Outcome counts of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Archived, and classified when a signal applied
    pub processed: usize,

    /// Permanently failed; logged and dropped
    pub skipped: usize,

    /// Hit a transient failure or queued behind one; needs redelivery
    pub deferred: usize,
}

impl BatchReport {
    /// Safe to advance the checkpoint past this batch
    pub fn is_committable(&self) -> bool {
        self.deferred == 0
    }

    fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
    }
}

enum Outcome {
    Processed,
    Skipped,
    Deferred,
}

/// Archives every event, then turns classified lines into status transitions
pub struct IngestionPipeline {
    registry: Arc<DeploymentRegistry>,
    log_store: Arc<dyn LogStore>,
    classifier: Arc<dyn Classifier>,
}

impl IngestionPipeline {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        log_store: Arc<dyn LogStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            registry,
            log_store,
            classifier,
        }
    }

    /// Process a batch.
    ///
    /// Deployments are handled concurrently, the events of one deployment
    /// strictly in stream order. A transient failure stops that deployment's
    /// sequence so the redelivered batch replays it from the failed event.
    pub async fn process_batch(&self, batch: &Batch) -> BatchReport {
        let mut report = BatchReport::default();
        let mut groups: Vec<(String, Vec<LogEvent>)> = Vec::new();

        for record in &batch.records {
            let event = match decode(record) {
                Ok(event) => event,
                Err(e) => {
                    error!(
                        "Dropping malformed event at {}-{} (key {}): {}",
                        record.partition, record.offset, record.key, e
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            match groups.iter_mut().find(|(id, _)| *id == event.deployment_id) {
                Some((_, events)) => events.push(event),
                None => groups.push((event.deployment_id.clone(), vec![event])),
            }
        }

        let reports = join_all(
            groups
                .iter()
                .map(|(_, events)| self.process_sequence(events)),
        )
        .await;
        for group_report in reports {
            report.merge(group_report);
        }

        debug!(
            "Batch on partition {}: {} processed, {} skipped, {} deferred",
            batch.partition, report.processed, report.skipped, report.deferred
        );
        report
    }

    async fn process_sequence(&self, events: &[LogEvent]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, event) in events.iter().enumerate() {
            match self.process_event(event).await {
                Outcome::Processed => report.processed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Deferred => {
                    report.deferred += events.len() - index;
                    break;
                }
            }
        }
        report
    }

    async fn process_event(&self, event: &LogEvent) -> Outcome {
        if let Err(e) = self.log_store.append(event).await {
            if e.is_transient() {
                warn!(
                    "Log store unavailable for event {} of deployment {}: {}",
                    event.event_id, event.deployment_id, e
                );
                return Outcome::Deferred;
            }
            error!(
                "Failed to archive event {} of deployment {}: {}",
                event.event_id, event.deployment_id, e
            );
            return Outcome::Skipped;
        }

        let Some(status) = self.classifier.classify(&event.log) else {
            return Outcome::Processed;
        };

        match self.registry.transition(&event.deployment_id, status).await {
            Ok(_) => Outcome::Processed,
            Err(e) if e.is_transient() => {
                warn!(
                    "Transition to {} for deployment {} deferred: {}",
                    status, event.deployment_id, e
                );
                Outcome::Deferred
            }
            Err(PlatformError::NotFound(_)) => {
                warn!(
                    "Event {} references unknown deployment {}",
                    event.event_id, event.deployment_id
                );
                Outcome::Skipped
            }
            Err(e) => {
                error!(
                    "Transition to {} for deployment {} failed: {}",
                    status, event.deployment_id, e
                );
                Outcome::Skipped
            }
        }
    }
}

/// Decode a stream record into a log event.
///
/// A missing event ID becomes `<partition>-<offset>`, which stays stable
/// across redelivery; a missing timestamp becomes the append time.
pub fn decode(record: &StreamRecord) -> Result<LogEvent, PlatformError> {
    let payload: StreamPayload = serde_json::from_slice(&record.payload)?;
    if payload.deployment_id.trim().is_empty() {
        return Err(PlatformError::ValidationError(
            "event has no deployment ID".to_string(),
        ));
    }
    if payload.deployment_id != record.key {
        warn!(
            "Event at {}-{} keyed {} but names deployment {}",
            record.partition, record.offset, record.key, payload.deployment_id
        );
    }

    Ok(LogEvent {
        event_id: payload
            .event_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}-{}", record.partition, record.offset)),
        deployment_id: payload.deployment_id,
        log: payload.log,
        timestamp: payload.timestamp.unwrap_or(record.appended_at),
    })
}
