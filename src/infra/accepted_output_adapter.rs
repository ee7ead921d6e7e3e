use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::ports::AcceptedSinkPort;
use crate::domain::{EnrichedBatch, EnrichedRecord, RunId};

/// Directory for records whose event time is unknown
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// `year=YYYY/month=MM` from the event's own pickup time
pub fn event_partition_key(pickup: Option<NaiveDateTime>) -> String {
    match pickup {
        Some(ts) => format!("year={:04}/month={:02}", ts.year(), ts.month()),
        None => DEFAULT_PARTITION.to_string(),
    }
}

/// File-based implementation of AcceptedSinkPort.
/// Writes accepted records as NDJSON, partitioned by pickup year and month.
///
/// Every partition file is first written as a hidden `.tmp` sibling; only
/// once all of them are on disk are they renamed into place. A failure at
/// any point removes what this call staged, published, or created, so an
/// aborted run leaves no accepted output behind.
pub struct FileAcceptedOutputAdapter {
    root: PathBuf,
}

/// Files and directories one write has put on disk so far
#[derive(Default)]
struct StagedWrite {
    created_dirs: Vec<PathBuf>,
    staged: Vec<(PathBuf, PathBuf)>,
    published: Vec<PathBuf>,
}

impl StagedWrite {
    /// `create_dir_all`, remembering which levels did not exist before
    fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(dir);
        while let Some(level) = cursor {
            if level.exists() {
                break;
            }
            missing.push(level.to_path_buf());
            cursor = level.parent();
        }
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        // deepest first, which is the order they can be removed in
        self.created_dirs.extend(missing);
        Ok(())
    }

    fn stage(&mut self, dir: &Path, file_name: &str, records: &[&EnrichedRecord]) -> Result<()> {
        self.ensure_dir(dir)?;

        let target = dir.join(file_name);
        let tmp = dir.join(format!(".{}.tmp", file_name));
        self.staged.push((tmp.clone(), target));

        let mut writer = BufWriter::new(
            File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?,
        );
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()
            .with_context(|| format!("syncing {}", tmp.display()))?;
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        for (tmp, target) in &self.staged {
            fs::rename(tmp, target).with_context(|| format!("publishing {}", target.display()))?;
            self.published.push(target.clone());
        }
        Ok(())
    }

    /// Best effort; the original error is what the caller reports.
    fn roll_back(self) {
        for path in self.published {
            let _ = fs::remove_file(path);
        }
        for (tmp, _) in self.staged {
            let _ = fs::remove_file(tmp);
        }
        for dir in self.created_dirs {
            let _ = fs::remove_dir(dir);
        }
    }
}

impl FileAcceptedOutputAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_partitions(
        &self,
        partitions: &BTreeMap<String, Vec<&EnrichedRecord>>,
        run_id: &RunId,
        write: &mut StagedWrite,
    ) -> Result<()> {
        write.ensure_dir(&self.root)?;

        let file_name = format!("part-{}.ndjson", run_id);
        for (key, records) in partitions {
            write.stage(&self.root.join(key), &file_name, records)?;
        }
        write.publish()
    }
}

#[async_trait]
impl AcceptedSinkPort for FileAcceptedOutputAdapter {
    async fn write_accepted(&self, batch: &EnrichedBatch, run_id: &RunId) -> Result<String> {
        let mut partitions: BTreeMap<String, Vec<&EnrichedRecord>> = BTreeMap::new();
        for record in &batch.records {
            partitions
                .entry(event_partition_key(record.trip.pickup_datetime))
                .or_default()
                .push(record);
        }

        let mut write = StagedWrite::default();
        if let Err(e) = self.write_partitions(&partitions, run_id, &mut write) {
            warn!(run_id = %run_id, "Accepted write failed, removing partial output: {:#}", e);
            write.roll_back();
            return Err(e);
        }

        for (key, records) in &partitions {
            info!(run_id = %run_id, partition = %key, records = records.len(), "Wrote accepted partition");
        }
        Ok(self.root.display().to_string())
    }
}
