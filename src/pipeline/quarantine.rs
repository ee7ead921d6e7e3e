use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::ports::QuarantineSinkPort;
use crate::config::WriteMode;
use crate::domain::{Batch, QuarantineEntry, RejectedBatch, RuleId, RunId};
use crate::error::{PipelineError, Result};

pub type QuarantineBatch = Batch<QuarantineEntry>;

/// Destination of one run's quarantine write, derived from wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinePartition {
    pub year: i32,
    pub month: u32,
    pub run_id: String,
}

impl QuarantinePartition {
    pub fn new(run_id: &RunId, now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
            run_id: run_id.to_string(),
        }
    }

    /// `year=YYYY/month=MM/run_id=<id>`, relative to the quarantine root
    pub fn relative_path(&self) -> String {
        format!(
            "year={:04}/month={:02}/run_id={}",
            self.year, self.month, self.run_id
        )
    }
}

impl fmt::Display for QuarantinePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineWriteOutcome {
    NotRequired,
    Written { location: String, records: usize },
}

/// Hands one run's rejected records to the quarantine sink in a single write
pub struct QuarantineWriter {
    sink: Arc<dyn QuarantineSinkPort>,
    mode: WriteMode,
}

impl QuarantineWriter {
    pub fn new(sink: Arc<dyn QuarantineSinkPort>, mode: WriteMode) -> Self {
        Self { sink, mode }
    }

    /// Union the rejected batches and write them once.
    ///
    /// Nothing reaches the sink when every batch is empty.
    pub async fn write(
        &self,
        invalid_batches: Vec<RejectedBatch>,
        run_id: &RunId,
        now: DateTime<Utc>,
    ) -> Result<QuarantineWriteOutcome> {
        if invalid_batches.iter().all(|b| b.is_empty()) {
            debug!(run_id = %run_id, "No rejected records; skipping quarantine write");
            return Ok(QuarantineWriteOutcome::NotRequired);
        }

        let source = invalid_batches
            .first()
            .map(|b| b.source.clone())
            .unwrap_or_default();
        let batch = stamp(RejectedBatch::union_by_name(source, invalid_batches), run_id);
        let partition = QuarantinePartition::new(run_id, now);
        let records = batch.len();

        let location = self
            .sink
            .write_quarantine(&partition, &batch, self.mode)
            .await
            .map_err(|e| PipelineError::QuarantineWrite {
                run_id: run_id.to_string(),
                message: format!("{:#}", e),
            })?;

        info!(
            run_id = %run_id,
            records,
            location = %location,
            "Quarantined {} rejected records",
            records
        );
        Ok(QuarantineWriteOutcome::Written { location, records })
    }
}

fn stamp(batch: RejectedBatch, run_id: &RunId) -> QuarantineBatch {
    let Batch {
        source,
        columns,
        records,
    } = batch;
    let entries = records
        .into_iter()
        .map(|rejected| QuarantineEntry {
            rejected,
            run_id: run_id.to_string(),
        })
        .collect();
    Batch::new(source, columns, entries)
}

/// Rejections per rule within a quarantine batch
pub fn counts_by_rule(batch: &QuarantineBatch) -> BTreeMap<RuleId, usize> {
    let mut counts = BTreeMap::new();
    for entry in &batch.records {
        *counts.entry(entry.rejected.failure_reason).or_insert(0) += 1;
    }
    counts
}
