//! Partitioned, at-least-once event stream
//!
//! Records are appended to a partition chosen by a stable hash of their key,
//! so every event of one deployment lands on the same partition in order.
//! A consumer reads batches from its committed offset and advances that offset
//! only by committing a batch checkpoint; anything uncommitted is redelivered.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::errors::PlatformError;

pub use memory::{MemoryStream, StreamConsumer};

/// One record as stored on a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub appended_at: DateTime<Utc>,
}

/// Position of an appended record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPosition {
    pub partition: u32,
    pub offset: u64,
}

/// Commit point: everything on `partition` before `next_offset` is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub partition: u32,
    pub next_offset: u64,
}

/// Contiguous records of a single partition, in offset order
#[derive(Debug, Clone)]
pub struct Batch {
    pub partition: u32,
    pub records: Vec<StreamRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Checkpoint that marks the whole batch as consumed
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.records.last().map(|record| Checkpoint {
            partition: self.partition,
            next_offset: record.offset + 1,
        })
    }
}

/// Consumer side of the stream
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Up to `max` uncommitted records of one assigned partition, or `None` when idle
    async fn next_batch(&self, max: usize) -> Result<Option<Batch>, PlatformError>;

    async fn commit(&self, checkpoint: Checkpoint) -> Result<(), PlatformError>;

    /// Tell the broker this consumer is alive
    async fn heartbeat(&self) -> Result<(), PlatformError>;
}

/// Producer side of the stream
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<StreamPosition, PlatformError>;
}

/// Stable key to partition mapping
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(partitions)) as u32
}
