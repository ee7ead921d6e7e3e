use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const CONFIG_ENV_VAR: &str = "TRIP_QUARANTINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "trip_quarantine.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rules: RuleConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineSettings,
}

/// Inclusive numeric bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Rule parameters as written in the config file.
///
/// Field names stay strings here; they are checked against the known
/// columns when the rule engine is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub required_fields: Vec<String>,
    /// Replaces the default table wholesale when present
    pub numeric_ranges: BTreeMap<String, Bounds>,
    pub trip_duration_minutes: Bounds,
    pub tip_percentage: Bounds,
}

impl Default for RuleConfig {
    fn default() -> Self {
        let numeric_ranges = [
            ("passenger_count", Bounds::new(1.0, 6.0)),
            ("trip_distance", Bounds::new(0.1, 100.0)),
            ("fare_amount", Bounds::new(0.01, 500.0)),
            ("total_amount", Bounds::new(0.01, 1000.0)),
            ("tip_amount", Bounds::new(0.0, 200.0)),
            ("tolls_amount", Bounds::new(0.0, 100.0)),
            ("extra", Bounds::new(0.0, 10.0)),
            ("mta_tax", Bounds::new(0.0, 1.0)),
        ]
        .into_iter()
        .map(|(name, bounds)| (name.to_string(), bounds))
        .collect();

        Self {
            required_fields: [
                "tpep_pickup_datetime",
                "tpep_dropoff_datetime",
                "passenger_count",
                "trip_distance",
                "fare_amount",
                "total_amount",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            numeric_ranges,
            trip_duration_minutes: Bounds::new(1.0, 300.0),
            tip_percentage: Bounds::new(0.0, 100.0),
        }
    }
}

/// How the quarantine sink treats a destination that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    ErrorIfExists,
    Overwrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub accepted_root: PathBuf,
    pub quarantine_root: PathBuf,
    pub quarantine_write_mode: WriteMode,
    pub summary_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            accepted_root: PathBuf::from("data/processed/taxi"),
            quarantine_root: PathBuf::from("data/dead-letter-queue/taxi"),
            quarantine_write_mode: WriteMode::ErrorIfExists,
            summary_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_parallel_partitions: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_parallel_partitions: 4,
        }
    }
}

impl Config {
    /// Load from an explicit path, the `TRIP_QUARANTINE_CONFIG` variable, or
    /// `trip_quarantine.toml` in the working directory. A missing default
    /// file yields the built-in configuration; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        match explicit {
            Some(path) => Self::from_file(&path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.pipeline.max_parallel_partitions == 0 {
            return Err(PipelineError::Config(
                "pipeline.max_parallel_partitions must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}
