use anyhow::Result;
use async_trait::async_trait;

use crate::config::WriteMode;
use crate::domain::{EnrichedBatch, RawBatch, RunId};
use crate::pipeline::{QuarantineBatch, QuarantinePartition};

/// Reads one storage partition into a batch
#[async_trait]
pub trait BatchSourcePort: Send + Sync {
    async fn read_partition(&self, path: &str) -> Result<RawBatch>;
}

/// Receives a run's accepted records, exactly once per run.
///
/// Implementations partition by the record's own pickup time and return a
/// human-readable location.
#[async_trait]
pub trait AcceptedSinkPort: Send + Sync {
    async fn write_accepted(&self, batch: &EnrichedBatch, run_id: &RunId) -> Result<String>;
}

/// Persists a run's rejected records.
///
/// A write is all-or-nothing. With `WriteMode::ErrorIfExists` an existing
/// destination is an error, never a merge.
#[async_trait]
pub trait QuarantineSinkPort: Send + Sync {
    async fn write_quarantine(
        &self,
        partition: &QuarantinePartition,
        batch: &QuarantineBatch,
        mode: WriteMode,
    ) -> Result<String>;
}
