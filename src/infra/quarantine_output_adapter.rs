use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::ports::QuarantineSinkPort;
use crate::config::WriteMode;
use crate::domain::RuleId;
use crate::pipeline::quarantine::counts_by_rule;
use crate::pipeline::{QuarantineBatch, QuarantinePartition};

pub const DATA_FILE: &str = "part-00000.ndjson";
pub const MANIFEST_FILE: &str = "_manifest.json";

/// Columns every quarantine entry carries on top of the record's own
const TAG_COLUMNS: [&str; 3] = ["failure_reason", "failed_at", "run_id"];

/// Describes one quarantine write; sits next to the data file
#[derive(Debug, Serialize)]
pub struct QuarantineManifest {
    pub run_id: String,
    pub source: String,
    pub partition: String,
    pub columns: Vec<String>,
    pub records: usize,
    pub rejected_by_rule: BTreeMap<RuleId, usize>,
    pub sha256: String,
    pub written_at: DateTime<Utc>,
}

/// File-based implementation of QuarantineSinkPort.
///
/// Each run lands in `<root>/year=YYYY/month=MM/run_id=<id>/`. Files are
/// staged in a hidden sibling directory and renamed into place, so a
/// partition is either complete or absent.
pub struct FileQuarantineOutputAdapter {
    root: PathBuf,
}

impl FileQuarantineOutputAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn partition_dir(&self, partition: &QuarantinePartition) -> PathBuf {
        self.root.join(partition.relative_path())
    }

    fn stage(staging: &Path, partition: &QuarantinePartition, batch: &QuarantineBatch) -> Result<()> {
        fs::create_dir_all(staging).with_context(|| format!("creating {}", staging.display()))?;

        let mut data = Vec::new();
        for entry in &batch.records {
            serde_json::to_writer(&mut data, entry)?;
            data.push(b'\n');
        }
        let digest = hex::encode(Sha256::digest(&data));

        let mut file = fs::File::create(staging.join(DATA_FILE))?;
        file.write_all(&data)?;
        file.sync_all()?;

        let mut columns: Vec<String> = batch.columns.iter().map(|f| f.as_str().to_string()).collect();
        columns.extend(TAG_COLUMNS.iter().map(|c| c.to_string()));

        let manifest = QuarantineManifest {
            run_id: partition.run_id.clone(),
            source: batch.source.clone(),
            partition: partition.relative_path(),
            columns,
            records: batch.len(),
            rejected_by_rule: counts_by_rule(batch),
            sha256: digest,
            written_at: Utc::now(),
        };
        fs::write(staging.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }
}

/// Replace `dest` with `staging`, keeping the old partition aside as
/// `backup` until the new one is in place. On failure `dest` holds its
/// previous contents again and `staging` is gone.
fn swap_into_place(staging: &Path, dest: &Path, backup: &Path) -> Result<()> {
    if let Err(e) = fs::rename(dest, backup) {
        let _ = fs::remove_dir_all(staging);
        return Err(e).with_context(|| format!("moving aside {}", dest.display()));
    }

    if let Err(e) = fs::rename(staging, dest) {
        let _ = fs::remove_dir_all(staging);
        if let Err(restore) = fs::rename(backup, dest) {
            warn!(
                "Could not restore {} from {}: {}",
                dest.display(),
                backup.display(),
                restore
            );
        }
        return Err(e).with_context(|| format!("publishing quarantine to {}", dest.display()));
    }

    if let Err(e) = fs::remove_dir_all(backup) {
        warn!("Replaced quarantine kept at {}: {}", backup.display(), e);
    }
    Ok(())
}

#[async_trait]
impl QuarantineSinkPort for FileQuarantineOutputAdapter {
    async fn write_quarantine(
        &self,
        partition: &QuarantinePartition,
        batch: &QuarantineBatch,
        mode: WriteMode,
    ) -> Result<String> {
        let dest = self.partition_dir(partition);
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        if dest.exists() && mode == WriteMode::ErrorIfExists {
            bail!(
                "quarantine partition {} already exists; refusing to merge",
                dest.display()
            );
        }

        let staging = parent.join(format!(
            ".staging-{}-{}",
            partition.run_id,
            Uuid::new_v4().simple()
        ));

        if let Err(e) = Self::stage(&staging, partition, batch) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.context(format!("staging quarantine for run {}", partition.run_id)));
        }

        if dest.exists() && mode == WriteMode::Overwrite {
            warn!(run_id = %partition.run_id, "Overwriting existing quarantine partition {}", dest.display());
            let backup = parent.join(format!(
                ".replaced-{}-{}",
                partition.run_id,
                Uuid::new_v4().simple()
            ));
            swap_into_place(&staging, &dest, &backup)?;
        } else if let Err(e) = fs::rename(&staging, &dest) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e).with_context(|| format!("publishing quarantine to {}", dest.display()));
        }

        info!(
            run_id = %partition.run_id,
            records = batch.len(),
            "Quarantine partition written to {}",
            dest.display()
        );
        Ok(dest.display().to_string())
    }
}
