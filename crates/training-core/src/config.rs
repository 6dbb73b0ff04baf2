//! Training pipeline configuration types

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration consumed by the checkpoint and dataset crates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Directory receiving checkpoint blobs and the pointer file
    pub output_dir: PathBuf,

    /// Dataset layout settings
    pub dataset: DatasetConfig,
}

impl TrainingConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

/// Dataset layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Shard path template with two `{}` placeholders.
    ///
    /// The packed dataset fills them with `(partition, lod)`; the record
    /// dataset with `(lod, shard_index)`.
    pub path: String,

    /// Number of shards the full dataset is split into
    pub part_count: usize,

    /// Total number of samples across all shards
    pub size: u64,

    /// Exclusive upper bound on precomputed resolution levels
    pub max_resolution_level: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: "./data/part-{}-{}.bin".to_string(),
            part_count: 1,
            size: 0,
            max_resolution_level: 9,
        }
    }
}

impl DatasetConfig {
    /// Resolve the shard path template with two values, in order
    pub fn shard_path(&self, first: usize, second: usize) -> PathBuf {
        PathBuf::from(fill_template(&self.path, &[first, second]))
    }
}

/// Substitute successive `{}` placeholders with the given values
fn fill_template(template: &str, values: &[usize]) -> String {
    let mut out = template.to_string();
    for v in values {
        out = out.replacen("{}", &v.to_string(), 1);
    }
    out
}
