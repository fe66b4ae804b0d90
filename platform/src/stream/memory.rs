//! In-process stream broker

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::PlatformError;
use crate::stream::{
    partition_for, Batch, Checkpoint, EventPublisher, EventStream, StreamPosition, StreamRecord,
};

#[derive(Debug, Default)]
struct StreamState {
    /// Uncommitted records; the front of each queue sits at its committed offset
    logs: Vec<VecDeque<StreamRecord>>,
    committed: Vec<u64>,
    heartbeats: HashMap<String, DateTime<Utc>>,
}

impl StreamState {
    fn end_offset(&self, partition: usize) -> u64 {
        self.committed[partition] + self.logs[partition].len() as u64
    }
}

/// Broker holding every uncommitted record in memory
#[derive(Debug)]
pub struct MemoryStream {
    partitions: u32,
    state: Mutex<StreamState>,
}

impl MemoryStream {
    pub fn new(partitions: u32) -> Self {
        let partitions = partitions.max(1);
        Self {
            partitions,
            state: Mutex::new(StreamState {
                logs: vec![VecDeque::new(); partitions as usize],
                committed: vec![0; partitions as usize],
                heartbeats: HashMap::new(),
            }),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    fn lock(&self) -> Result<MutexGuard<'_, StreamState>, PlatformError> {
        self.state
            .lock()
            .map_err(|_| PlatformError::Internal("stream lock poisoned".to_string()))
    }

    /// Append a record to the partition owning `key`
    pub fn append(&self, key: &str, payload: Vec<u8>) -> Result<StreamPosition, PlatformError> {
        let partition = partition_for(key, self.partitions);
        let mut state = self.lock()?;
        let offset = state.end_offset(partition as usize);
        state.logs[partition as usize].push_back(StreamRecord {
            partition,
            offset,
            key: key.to_string(),
            payload,
            appended_at: Utc::now(),
        });
        Ok(StreamPosition { partition, offset })
    }

    /// Committed offset of a partition
    pub fn committed(&self, partition: u32) -> u64 {
        self.lock()
            .ok()
            .and_then(|state| state.committed.get(partition as usize).copied())
            .unwrap_or(0)
    }

    /// Records appended but not yet committed, across all partitions.
    /// Committed records are released, so this is also what the broker holds.
    pub fn lag(&self) -> u64 {
        self.lock()
            .map(|state| state.logs.iter().map(|log| log.len() as u64).sum())
            .unwrap_or(0)
    }

    /// Last heartbeat recorded by a consumer
    pub fn last_heartbeat(&self, consumer_id: &str) -> Option<DateTime<Utc>> {
        self.lock()
            .ok()
            .and_then(|state| state.heartbeats.get(consumer_id).copied())
    }

    /// A consumer reading the given partitions
    pub fn consumer(self: &Arc<Self>, id: impl Into<String>, partitions: Vec<u32>) -> StreamConsumer {
        StreamConsumer {
            id: id.into(),
            stream: Arc::clone(self),
            partitions,
            cursor: AtomicUsize::new(0),
        }
    }

    /// `count` consumers with disjoint partition assignments covering every partition
    pub fn consumers(self: &Arc<Self>, count: usize) -> Vec<StreamConsumer> {
        let count = count.clamp(1, self.partitions as usize);
        (0..count)
            .map(|index| {
                let assigned = (0..self.partitions)
                    .filter(|partition| *partition as usize % count == index)
                    .collect();
                self.consumer(format!("consumer-{}", index), assigned)
            })
            .collect()
    }

    fn fetch(&self, partition: u32, max: usize) -> Result<Vec<StreamRecord>, PlatformError> {
        let state = self.lock()?;
        Ok(state.logs[partition as usize]
            .iter()
            .take(max)
            .cloned()
            .collect())
    }

    fn commit_offset(&self, checkpoint: Checkpoint) -> Result<(), PlatformError> {
        let mut state = self.lock()?;
        let index = checkpoint.partition as usize;
        if checkpoint.next_offset > state.end_offset(index) {
            return Err(PlatformError::InvalidState(format!(
                "commit past the end of partition {}",
                checkpoint.partition
            )));
        }
        let committed = state.committed[index];
        if checkpoint.next_offset > committed {
            let released = (checkpoint.next_offset - committed) as usize;
            state.logs[index].drain(..released);
            state.committed[index] = checkpoint.next_offset;
        }
        Ok(())
    }

    fn beat(&self, consumer_id: &str) -> Result<(), PlatformError> {
        let mut state = self.lock()?;
        state.heartbeats.insert(consumer_id.to_string(), Utc::now());
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MemoryStream {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<StreamPosition, PlatformError> {
        self.append(key, payload)
    }
}

/// Consumer bound to a fixed set of partitions
#[derive(Debug)]
pub struct StreamConsumer {
    id: String,
    stream: Arc<MemoryStream>,
    partitions: Vec<u32>,
    cursor: AtomicUsize,
}

impl StreamConsumer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn partitions(&self) -> &[u32] {
        &self.partitions
    }
}

#[async_trait]
impl EventStream for StreamConsumer {
    async fn next_batch(&self, max: usize) -> Result<Option<Batch>, PlatformError> {
        if self.partitions.is_empty() || max == 0 {
            return Ok(None);
        }

        // Round-robin so a busy partition cannot starve the others
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for step in 0..self.partitions.len() {
            let partition = self.partitions[(start + step) % self.partitions.len()];
            let records = self.stream.fetch(partition, max)?;
            if !records.is_empty() {
                debug!(
                    "{} fetched {} records from partition {}",
                    self.id,
                    records.len(),
                    partition
                );
                return Ok(Some(Batch { partition, records }));
            }
        }
        Ok(None)
    }

    async fn commit(&self, checkpoint: Checkpoint) -> Result<(), PlatformError> {
        if !self.partitions.contains(&checkpoint.partition) {
            return Err(PlatformError::InvalidState(format!(
                "{} does not own partition {}",
                self.id, checkpoint.partition
            )));
        }
        self.stream.commit_offset(checkpoint)
    }

    async fn heartbeat(&self) -> Result<(), PlatformError> {
        self.stream.beat(&self.id)
    }
}
