//! End-to-end training loop simulation
//!
//! Drives the full surface the way a training loop would: record shards on
//! disk, per-rank datasets, resolution switches, batch collation, periodic
//! checkpoint saves, and a resume from the pointer file.

use anyhow::Result;
use checkpoint::Checkpointer;
use dataset::{write_record_file, BatchCollator, PackedDataset, PackedShard, RecordShardDataset};
use integration_tests::{init_logging, shared, StubModule};
use ndarray::Array3;
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;
use training_core::{DatasetConfig, Device, TrainingConfig, SAMPLE_CHANNELS};

const WORLD_SIZE: usize = 2;
const PART_COUNT: usize = 4;
const SAMPLES_PER_SHARD: usize = 8;

fn sample(side: usize, fill: u8) -> Array3<u8> {
    Array3::from_elem((SAMPLE_CHANNELS, side, side), fill)
}

/// Write record shards for lods 2 and 3, all partitions
fn prepare_record_shards(dir: &TempDir) -> Result<DatasetConfig> {
    let template = dir
        .path()
        .join("records/r{}-shard{}.rec")
        .to_string_lossy()
        .to_string();

    for lod in 2..4usize {
        let side = 1 << lod;
        for shard in 0..PART_COUNT {
            let samples: Vec<_> = (0..SAMPLES_PER_SHARD)
                .map(|i| sample(side, (shard * SAMPLES_PER_SHARD + i) as u8))
                .collect();
            write_record_file(
                dir.path().join(format!("records/r{}-shard{}.rec", lod, shard)),
                &samples,
            )?;
        }
    }

    Ok(DatasetConfig {
        path: template,
        part_count: PART_COUNT,
        size: (PART_COUNT * SAMPLES_PER_SHARD) as u64,
        max_resolution_level: 4,
    })
}

#[tokio::test]
async fn test_training_loop_with_resume() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let dataset_config = prepare_record_shards(&dir)?;
    let config = TrainingConfig {
        output_dir: dir.path().join("output"),
        dataset: dataset_config.clone(),
    };

    // Every rank owns a disjoint contiguous run of shards
    let mut owned = Vec::new();
    for rank in 0..WORLD_SIZE {
        let ds = RecordShardDataset::new(&dataset_config, rank, WORLD_SIZE)?;
        owned.extend(ds.shard_files(2).unwrap().to_vec());
    }
    owned.sort();
    owned.dedup();
    assert_eq!(owned.len(), PART_COUNT);

    // Rank 0 trains: iterate lod 2, then grow to lod 3
    let model = shared(StubModule::new("g", &[("w", vec![0.0])]));
    let mut checkpointer = Checkpointer::new(&config, true);
    checkpointer.register_model("g", model.clone());

    let collator = BatchCollator::new(Device::Cpu);
    let mut dataset = RecordShardDataset::new(&dataset_config, 0, WORLD_SIZE)?;
    let mut step = 0u64;

    for lod in 2..4usize {
        dataset.reset(lod, 4)?;
        let side = 1 << lod;
        for batch in &mut dataset {
            let tensor = collator.collate(&[batch?])?;
            assert_eq!(&tensor.shape()[1..], &[3, side, side]);
            assert!(tensor.requires_grad);
            step += 1;
        }
        checkpointer.save(
            &format!("lod-{}", lod),
            HashMap::from([("step".to_string(), json!(step))]),
        )?;
    }
    checkpointer.wait_pending().await;

    // Two shards of 8 samples each per rank, batches of 4, two lods
    assert_eq!(step, 8);

    // Resume resolves the newest tag through the pointer
    let resumed = shared(StubModule::new("g", &[("w", vec![-1.0])]));
    let mut loader = Checkpointer::new(&config, true);
    loader.register_model("g", resumed.clone());
    let extras = loader.load(false, None).await?;
    assert_eq!(extras["step"], json!(8));
    assert_eq!(
        resumed.lock().param("w").unwrap(),
        model.lock().param("w").unwrap()
    );

    Ok(())
}

#[tokio::test]
async fn test_packed_fold_switching_in_loop() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let template = dir
        .path()
        .join("packed/fold{}-lod{}.bin")
        .to_string_lossy()
        .to_string();

    for part in 0..2usize {
        for lod in 0..2usize {
            let side = 1 << lod;
            let samples: Vec<_> = (0..9).map(|i| sample(side, (part * 10 + i) as u8)).collect();
            PackedShard::from_samples(&samples)?
                .write(dir.path().join(format!("packed/fold{}-lod{}.bin", part, lod)))?;
        }
    }

    let config = DatasetConfig {
        path: template,
        part_count: 2,
        size: 18,
        max_resolution_level: 2,
    };

    let mut dataset = PackedDataset::new(config)?;
    // 9 samples truncated to 8
    assert_eq!(dataset.len(), 8);
    assert_eq!(dataset.get(0).unwrap()[[0, 0, 0]], 0);

    // rank 3 mod 2 -> partition 1, higher lod
    dataset.switch_fold(3, 1)?;
    assert_eq!(dataset.len(), 8);
    assert_eq!(dataset.get(0).unwrap()[[0, 0, 0]], 10);
    assert_eq!(dataset.get(0).unwrap().shape(), &[3, 2, 2]);

    Ok(())
}
