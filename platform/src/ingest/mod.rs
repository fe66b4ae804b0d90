//! Build log ingestion
//!
//! Build workers push log lines in through [`publish`]; the ingester worker
//! drains the stream through an [`IngestionPipeline`].

pub mod pipeline;

use chrono::Utc;
use openapi_server::models::PublishLogRequest;
use tracing::debug;

use crate::errors::PlatformError;
use crate::models::log_event::StreamPayload;
use crate::stream::EventPublisher;
use crate::utils::generate_uuid;

pub use pipeline::{BatchReport, IngestionPipeline};

/// Publish log lines onto the stream keyed by deployment ID.
///
/// Each line gets its event ID here so redelivery never mints a new one.
/// Returns the assigned IDs in input order.
pub async fn publish(
    publisher: &dyn EventPublisher,
    lines: Vec<PublishLogRequest>,
) -> Result<Vec<String>, PlatformError> {
    if let Some(line) = lines.iter().find(|l| l.deployment_id.trim().is_empty()) {
        return Err(PlatformError::ValidationError(format!(
            "log line without deployment ID: {:?}",
            line.log
        )));
    }

    let mut event_ids = Vec::with_capacity(lines.len());
    for line in lines {
        let payload = StreamPayload {
            event_id: Some(generate_uuid()),
            deployment_id: line.deployment_id,
            log: line.log,
            timestamp: Some(line.timestamp.unwrap_or_else(Utc::now)),
        };
        let bytes = serde_json::to_vec(&payload)?;
        let position = publisher.publish(&payload.deployment_id, bytes).await?;
        debug!(
            "Published event for deployment {} at {}-{}",
            payload.deployment_id, position.partition, position.offset
        );
        event_ids.extend(payload.event_id);
    }
    Ok(event_ids)
}
