//! Data loading for resolution-progressive image training
//!
//! This crate provides:
//! - **PackedDataset** for whole-shard in-memory sample arrays with
//!   index-based access
//! - **RecordShardDataset** for rank-partitioned record shard files served
//!   through a batched iterator
//! - **BatchCollator** turning raw pixel batches into training tensors
//!
//! # Example
//!
//! ```no_run
//! use dataset::{BatchCollator, RecordShardDataset};
//! use training_core::{DatasetConfig, Device};
//!
//! # fn example() -> training_core::Result<()> {
//! let config = DatasetConfig {
//!     path: "/data/r{}/shard-{}.rec".to_string(),
//!     part_count: 16,
//!     size: 60_000,
//!     max_resolution_level: 8,
//! };
//!
//! let mut dataset = RecordShardDataset::new(&config, 0, 4)?;
//! dataset.reset(4, 64)?;
//!
//! let collator = BatchCollator::new(Device::Cpu);
//! for batch in &mut dataset {
//!     let tensor = collator.collate(&[batch?])?;
//!     // feed tensor to the training step
//!     let _ = tensor;
//! }
//! # Ok(())
//! # }
//! ```

mod collate;
mod packed;
mod reader;
mod records;

pub use collate::BatchCollator;
pub use packed::{BincodeShardSource, PackedDataset, PackedShard, ShardSource};
pub use reader::{
    write_record_file, BatchIteratorFactory, FeatureShape, RecordBatchIterator, RecordFileReader,
};
pub use records::{RecordShardDataset, DEFAULT_BUFFER_MB};

// Re-export the shared sample/batch types for convenience
pub use training_core::{Lod, PixelBatch, PixelSample, Rank};
