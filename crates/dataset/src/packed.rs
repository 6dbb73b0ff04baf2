//! Flat in-memory dataset loaded from packed shard files
//!
//! One shard file holds every training sample for a `(partition, lod)`
//! pair. The whole shard is materialized in memory and indexed directly.

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use training_core::{DatasetConfig, Error, Lod, PixelSample, Rank, Result, SAMPLE_CHANNELS};

/// On-disk layout of a packed shard: raw u8 sample buffers plus side length
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackedShard {
    /// Image side length of every sample in the shard
    pub side: usize,

    /// Raw `[3, side, side]` pixel buffers
    pub samples: Vec<Vec<u8>>,
}

impl PackedShard {
    /// Pack samples for writing; all samples must share the same side length
    pub fn from_samples(samples: &[PixelSample]) -> Result<Self> {
        let side = samples.first().map(|s| s.shape()[1]).unwrap_or(0);
        let buffers = samples
            .iter()
            .map(|sample| {
                if sample.shape() != [SAMPLE_CHANNELS, side, side] {
                    return Err(Error::InvalidBatch {
                        message: format!(
                            "sample shape {:?} does not match [{}, {}, {}]",
                            sample.shape(),
                            SAMPLE_CHANNELS,
                            side,
                            side
                        ),
                    });
                }
                Ok(sample.iter().copied().collect())
            })
            .collect::<Result<Vec<Vec<u8>>>>()?;

        Ok(Self {
            side,
            samples: buffers,
        })
    }

    /// Serialize the shard to a file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes =
            bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Reads one packed shard into sample arrays.
///
/// A seam for tests and alternative storage layouts; the default reads the
/// bincode [`PackedShard`] format.
pub trait ShardSource {
    /// Load every sample from the shard at `path`
    fn read(&self, path: &Path) -> Result<Vec<PixelSample>>;
}

/// Default source reading bincode-encoded [`PackedShard`] files
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeShardSource;

impl ShardSource for BincodeShardSource {
    fn read(&self, path: &Path) -> Result<Vec<PixelSample>> {
        let bytes = std::fs::read(path)?;
        let shard: PackedShard =
            bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;

        shard
            .samples
            .into_iter()
            .map(|buffer| {
                Array3::from_shape_vec((SAMPLE_CHANNELS, shard.side, shard.side), buffer)
                    .map_err(|e| Error::MalformedRecord {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

/// In-memory sample array keyed by `(partition, lod)`.
///
/// The sample count is always a multiple of 4; anything beyond the last
/// full group of 4 is dropped after every fold switch.
pub struct PackedDataset<S: ShardSource = BincodeShardSource> {
    config: DatasetConfig,
    source: S,
    last_path: Option<PathBuf>,
    samples: Vec<PixelSample>,
}

impl PackedDataset<BincodeShardSource> {
    /// Create a dataset and immediately load fold `(rank 0, lod 0)`
    pub fn new(config: DatasetConfig) -> Result<Self> {
        Self::with_source(config, BincodeShardSource)
    }

    /// Create a dataset around pre-loaded samples; nothing is read from disk
    pub fn from_samples(config: DatasetConfig, samples: Vec<PixelSample>) -> Self {
        let mut dataset = Self {
            config,
            source: BincodeShardSource,
            last_path: None,
            samples,
        };
        dataset.truncate_to_group();
        dataset
    }
}

impl<S: ShardSource> PackedDataset<S> {
    /// Create a dataset with a custom shard source and load fold `(0, 0)`
    pub fn with_source(config: DatasetConfig, source: S) -> Result<Self> {
        let mut dataset = Self {
            config,
            source,
            last_path: None,
            samples: Vec::new(),
        };
        dataset.switch_fold(0, 0)?;
        Ok(dataset)
    }

    /// Point the dataset at the shard for `(rank mod part_count, lod)`.
    ///
    /// The shard is reloaded only when the resolved path differs from the
    /// one already loaded. An unreadable path is a hard failure.
    pub fn switch_fold(&mut self, rank: Rank, lod: Lod) -> Result<()> {
        let path = self
            .config
            .shard_path(rank % self.config.part_count, lod);

        if self.last_path.as_deref() != Some(path.as_path()) {
            info!(path = %path.display(), "Switching data fold");
            self.samples = self.source.read(&path)?;
            self.last_path = Some(path);
        }

        info!(samples = self.samples.len(), "Train set size");
        self.truncate_to_group();
        Ok(())
    }

    /// One raw sample by index
    pub fn get(&self, index: usize) -> Option<&PixelSample> {
        self.samples.get(index)
    }

    /// Number of usable samples (always a multiple of 4)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the current fold holds no usable samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples of the current fold
    pub fn samples(&self) -> &[PixelSample] {
        &self.samples
    }

    fn truncate_to_group(&mut self) {
        let truncated = 4 * (self.samples.len() / 4);
        self.samples.truncate(truncated);
    }
}
