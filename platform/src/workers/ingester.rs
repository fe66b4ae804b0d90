//! Ingestion worker draining the build log stream

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::errors::PlatformError;
use crate::ingest::{BatchReport, IngestionPipeline};
use crate::stream::{Batch, EventStream};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Ingester worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum records per batch
    pub batch_size: usize,

    /// Wait between polls while the stream is idle
    pub poll_interval: Duration,

    /// Heartbeat period, kept up while a batch is being processed
    pub heartbeat_interval: Duration,

    /// Backoff before redelivering a batch that hit a transient failure
    pub backoff: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(3),
            backoff: CooldownOptions {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
            },
        }
    }
}

/// What one poll of the stream did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to consume
    Idle,

    /// Batch fully handled and committed
    Committed(BatchReport),

    /// Batch left uncommitted for redelivery
    Retry(BatchReport),
}

/// Run the ingester worker
pub async fn run<S, F>(
    options: &Options,
    stream: &dyn EventStream,
    pipeline: &IngestionPipeline,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Ingester worker starting...");

    let mut delay = Duration::ZERO;
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Ingester worker shutting down...");
                return;
            }
            _ = sleep_fn(delay) => {}
        }

        delay = match poll_once(options, stream, pipeline).await {
            Ok(PollOutcome::Idle) => {
                failures = 0;
                options.poll_interval
            }
            Ok(PollOutcome::Committed(_)) => {
                failures = 0;
                Duration::ZERO
            }
            Ok(PollOutcome::Retry(report)) => {
                let backoff = calc_exp_backoff(&options.backoff, failures);
                failures = failures.saturating_add(1);
                warn!(
                    "{} events deferred, redelivering batch in {:?}",
                    report.deferred, backoff
                );
                backoff
            }
            Err(e) => {
                let backoff = calc_exp_backoff(&options.backoff, failures);
                failures = failures.saturating_add(1);
                error!("Ingestion poll failed: {}, retrying in {:?}", e, backoff);
                backoff
            }
        };
    }
}

/// Fetch one batch, process it and commit it when nothing needs redelivery
pub async fn poll_once(
    options: &Options,
    stream: &dyn EventStream,
    pipeline: &IngestionPipeline,
) -> Result<PollOutcome, PlatformError> {
    if let Err(e) = stream.heartbeat().await {
        warn!("Heartbeat failed: {}", e);
    }

    let Some(batch) = stream.next_batch(options.batch_size).await? else {
        return Ok(PollOutcome::Idle);
    };

    let report = process_with_heartbeat(stream, pipeline, &batch, options.heartbeat_interval).await;
    if !report.is_committable() {
        return Ok(PollOutcome::Retry(report));
    }

    if let Some(checkpoint) = batch.checkpoint() {
        stream.commit(checkpoint).await?;
        debug!(
            "Committed partition {} up to offset {}",
            checkpoint.partition, checkpoint.next_offset
        );
    }
    Ok(PollOutcome::Committed(report))
}

/// Process a batch while heartbeating every `interval`
pub async fn process_with_heartbeat(
    stream: &dyn EventStream,
    pipeline: &IngestionPipeline,
    batch: &Batch,
    interval: Duration,
) -> BatchReport {
    let processing = pipeline.process_batch(batch);
    tokio::pin!(processing);

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    // the first tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            report = &mut processing => return report,
            _ = ticker.tick() => {
                if let Err(e) = stream.heartbeat().await {
                    warn!("Heartbeat during batch failed: {}", e);
                }
            }
        }
    }
}
