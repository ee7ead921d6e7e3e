use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app::ports::BatchSourcePort;
use crate::domain::{Batch, Field, RawBatch, TripRecord};

const PARTITION_FILE_EXTENSIONS: [&str; 3] = ["ndjson", "jsonl", "json"];

/// Reads trip partitions stored as newline-delimited JSON.
///
/// A partition is either one file or a directory of part files, read in
/// name order. The schema is the set of known source columns seen on any
/// line.
#[derive(Debug, Clone, Default)]
pub struct NdjsonBatchSource;

impl NdjsonBatchSource {
    pub fn new() -> Self {
        Self
    }

    fn part_files(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.is_dir() {
            bail!("partition {} does not exist", path.display());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).with_context(|| format!("listing {}", path.display()))? {
            let file = entry?.path();
            let hidden = file
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.') || n.starts_with('_'));
            let known_extension = file
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| PARTITION_FILE_EXTENSIONS.contains(&e));
            if file.is_file() && !hidden && known_extension {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Decode NDJSON text into records plus the columns it carries
pub fn parse_ndjson(content: &str, origin: &str) -> Result<(BTreeSet<Field>, Vec<TripRecord>)> {
    let mut columns = BTreeSet::new();
    let mut unknown = BTreeSet::new();
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let object: Map<String, Value> = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed record", origin, index + 1))?;

        for key in object.keys() {
            match key.parse::<Field>() {
                Ok(field) if !field.is_derived() => {
                    columns.insert(field);
                }
                _ => {
                    unknown.insert(key.clone());
                }
            }
        }

        let record: TripRecord = serde_json::from_value(Value::Object(object))
            .with_context(|| format!("{}:{}: record does not match trip schema", origin, index + 1))?;
        records.push(record);
    }

    if !unknown.is_empty() {
        debug!("{}: ignoring unknown columns {:?}", origin, unknown);
    }
    Ok((columns, records))
}

#[async_trait]
impl BatchSourcePort for NdjsonBatchSource {
    async fn read_partition(&self, path: &str) -> Result<RawBatch> {
        let mut columns = BTreeSet::new();
        let mut records = Vec::new();

        for file in Self::part_files(Path::new(path))? {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let (file_columns, file_records) = parse_ndjson(&content, &file.display().to_string())?;
            columns.extend(file_columns);
            records.extend(file_records);
        }

        if records.is_empty() && columns.is_empty() {
            // nothing to infer a schema from
            columns.extend(Field::SOURCE);
        }

        info!(partition = %path, records = records.len(), columns = columns.len(), "Read partition");
        Ok(Batch::new(path, columns, records))
    }
}
