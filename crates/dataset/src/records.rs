//! Rank-partitioned record shard dataset
//!
//! Shard ownership is fixed at construction: every precomputed resolution
//! level maps to the contiguous run of shard indices owned by this rank's
//! local partition. `reset` rebuilds the batched iterator for one level;
//! shuffling, retries, and epoch bookkeeping are the iterator's business,
//! not this type's.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};
use training_core::{DatasetConfig, Error, Lod, PixelBatch, Rank, Result};

use crate::reader::{BatchIteratorFactory, FeatureShape, RecordFileReader};

/// Default buffering budget handed to the batch iterator, in megabytes
pub const DEFAULT_BUFFER_MB: usize = 200;

/// Default batch size before the first `reset`
const DEFAULT_BATCH_SIZE: usize = 512;

/// Lowest resolution level shards exist for
const MIN_RESOLUTION_LEVEL: Lod = 2;

/// Serves image batches from record shard files, partitioned by rank.
///
/// For rank `r` with `local = part_count / world_size`, the owned shard
/// indices are `[local * r, local * (r + 1))` at every precomputed level.
pub struct RecordShardDataset<F: BatchIteratorFactory = RecordFileReader> {
    factory: F,
    part_size: u64,
    part_count_local: usize,
    filenames: BTreeMap<Lod, Vec<PathBuf>>,
    batch_size: usize,
    buffer_bytes: usize,
    iterator: Option<F::Iter>,
}

impl RecordShardDataset<RecordFileReader> {
    /// Create a dataset reading local record shard files
    pub fn new(config: &DatasetConfig, rank: Rank, world_size: usize) -> Result<Self> {
        Self::with_factory(config, rank, world_size, DEFAULT_BUFFER_MB, RecordFileReader)
    }
}

impl<F: BatchIteratorFactory> RecordShardDataset<F> {
    /// Create a dataset with an explicit buffering budget and iterator factory.
    ///
    /// Fails unless `part_count` divides evenly across `world_size`.
    pub fn with_factory(
        config: &DatasetConfig,
        rank: Rank,
        world_size: usize,
        buffer_size_mb: usize,
        factory: F,
    ) -> Result<Self> {
        if world_size == 0 || config.part_count % world_size != 0 {
            return Err(Error::InvalidPartitionLayout {
                message: format!(
                    "part_count {} is not divisible by world_size {}",
                    config.part_count, world_size
                ),
            });
        }

        let part_count_local = config.part_count / world_size;
        let mut filenames = BTreeMap::new();
        for lod in MIN_RESOLUTION_LEVEL..config.max_resolution_level {
            let files: Vec<PathBuf> = (part_count_local * rank..part_count_local * (rank + 1))
                .map(|shard| config.shard_path(lod, shard))
                .collect();
            filenames.insert(lod, files);
        }

        info!(
            rank,
            world_size,
            shards_per_level = part_count_local,
            levels = filenames.len(),
            "Prepared record shard lists"
        );

        Ok(Self {
            factory,
            part_size: config.size / config.part_count as u64,
            part_count_local,
            filenames,
            batch_size: DEFAULT_BATCH_SIZE,
            buffer_bytes: buffer_size_mb * 1024 * 1024,
            iterator: None,
        })
    }

    /// Rebuild the batched iterator for one resolution level.
    ///
    /// The buffering budget is converted into samples by dividing the byte
    /// budget by the per-sample footprint `3 * (2^lod)^2`. Any previous
    /// iterator is discarded.
    pub fn reset(&mut self, lod: Lod, batch_size: usize) -> Result<()> {
        let files = self
            .filenames
            .get(&lod)
            .ok_or(Error::UnknownResolutionLevel { lod })?;
        self.batch_size = batch_size;

        let shape = FeatureShape::for_lod(lod);
        let buffer_samples = self.buffer_bytes / shape.bytes_per_sample();
        debug!(lod, batch_size, buffer_samples, "Resetting record iterator");

        self.iterator = Some(self.factory.open(files, shape, batch_size, buffer_samples)?);
        Ok(())
    }

    /// Shard files owned by this rank for one level, if precomputed
    pub fn shard_files(&self, lod: Lod) -> Option<&[PathBuf]> {
        self.filenames.get(&lod).map(Vec::as_slice)
    }

    /// Resolution levels shard lists were precomputed for
    pub fn resolution_levels(&self) -> impl Iterator<Item = Lod> + '_ {
        self.filenames.keys().copied()
    }

    /// Batch size set by the last `reset`
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rough per-epoch sample count for this rank.
    ///
    /// `local_shards * (total_size / part_count)` — a constant hint that
    /// ignores the active lod and actual shard contents.
    pub fn approx_len(&self) -> u64 {
        self.part_count_local as u64 * self.part_size
    }
}

impl<F: BatchIteratorFactory> Iterator for RecordShardDataset<F> {
    type Item = Result<PixelBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iterator.as_mut()?.next()
    }
}
