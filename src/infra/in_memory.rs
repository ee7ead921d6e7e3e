//! In-memory adapters for tests and `--dry-run`

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::ports::{AcceptedSinkPort, BatchSourcePort, QuarantineSinkPort};
use crate::config::WriteMode;
use crate::domain::{EnrichedBatch, RawBatch, RunId};
use crate::pipeline::{QuarantineBatch, QuarantinePartition};

/// Serves batches keyed by their `source`
#[derive(Default)]
pub struct InMemoryBatchSource {
    partitions: HashMap<String, RawBatch>,
}

impl InMemoryBatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, batch: RawBatch) -> Self {
        self.partitions.insert(batch.source.clone(), batch);
        self
    }
}

#[async_trait]
impl BatchSourcePort for InMemoryBatchSource {
    async fn read_partition(&self, path: &str) -> Result<RawBatch> {
        self.partitions
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no partition named '{}'", path))
    }
}

/// Keeps every accepted batch it is handed
#[derive(Default)]
pub struct InMemoryAcceptedSink {
    batches: Mutex<Vec<(String, EnrichedBatch)>>,
}

impl InMemoryAcceptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_calls(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// (run_id, batch) pairs in call order
    pub fn batches(&self) -> Vec<(String, EnrichedBatch)> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AcceptedSinkPort for InMemoryAcceptedSink {
    async fn write_accepted(&self, batch: &EnrichedBatch, run_id: &RunId) -> Result<String> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| anyhow!("accepted sink lock poisoned"))?;
        batches.push((run_id.to_string(), batch.clone()));
        Ok(format!("memory://accepted/{}", run_id))
    }
}

/// Keeps quarantine writes and enforces write-once per partition
#[derive(Default)]
pub struct InMemoryQuarantineSink {
    writes: Mutex<Vec<(QuarantinePartition, QuarantineBatch)>>,
}

impl InMemoryQuarantineSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_calls(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(QuarantinePartition, QuarantineBatch)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuarantineSinkPort for InMemoryQuarantineSink {
    async fn write_quarantine(
        &self,
        partition: &QuarantinePartition,
        batch: &QuarantineBatch,
        mode: WriteMode,
    ) -> Result<String> {
        let mut writes = self
            .writes
            .lock()
            .map_err(|_| anyhow!("quarantine sink lock poisoned"))?;

        let existing = writes.iter().position(|(p, _)| p == partition);
        match (existing, mode) {
            (Some(_), WriteMode::ErrorIfExists) => {
                bail!("quarantine partition {} already exists", partition)
            }
            (Some(index), WriteMode::Overwrite) => {
                writes[index] = (partition.clone(), batch.clone());
            }
            (None, _) => writes.push((partition.clone(), batch.clone())),
        }
        Ok(format!("memory://quarantine/{}", partition))
    }
}

/// Quarantine sink whose storage is always unavailable
#[cfg(test)]
pub struct FailingQuarantineSink;

#[cfg(test)]
#[async_trait]
impl QuarantineSinkPort for FailingQuarantineSink {
    async fn write_quarantine(
        &self,
        partition: &QuarantinePartition,
        _batch: &QuarantineBatch,
        _mode: WriteMode,
    ) -> Result<String> {
        bail!("quarantine storage unavailable for {}", partition)
    }
}

/// Accepted sink whose storage is always unavailable
#[cfg(test)]
pub struct FailingAcceptedSink;

#[cfg(test)]
#[async_trait]
impl AcceptedSinkPort for FailingAcceptedSink {
    async fn write_accepted(&self, _batch: &EnrichedBatch, run_id: &RunId) -> Result<String> {
        bail!("accepted storage unavailable for run {}", run_id)
    }
}
