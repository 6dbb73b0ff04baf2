//! Cross-crate checkpoint round-trip tests

use anyhow::Result;
use checkpoint::Checkpointer;
use integration_tests::{init_logging, shared, StubModule};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use training_core::{DatasetConfig, TrainingConfig};

fn config(dir: &Path) -> TrainingConfig {
    TrainingConfig {
        output_dir: dir.to_path_buf(),
        dataset: DatasetConfig::default(),
    }
}

#[tokio::test]
async fn test_two_models_optimizer_scheduler_roundtrip() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;

    let mut saver = Checkpointer::new(&config(dir.path()), true);
    saver.register_model(
        "generator",
        shared(StubModule::new(
            "generator",
            &[("conv.weight", vec![0.5, -0.5]), ("conv.bias", vec![0.1])],
        )),
    );
    saver.register_model(
        "discriminator",
        shared(StubModule::new(
            "discriminator",
            &[("fc.weight", vec![2.0, 3.0, 4.0])],
        )),
    );
    saver.register_optimizer(
        "generator",
        shared(StubModule::new("opt", &[("momentum", vec![0.9, 0.8])])),
    );
    saver.set_scheduler(shared(StubModule::new("sched", &[("lr", vec![1e-3])])));

    let extras = HashMap::from([
        ("step".to_string(), json!(1234)),
        ("lod".to_string(), json!(4)),
    ]);
    saver.save("epoch-7", extras)?;
    saver.wait_pending().await;

    // Fresh objects with zeroed parameters
    let generator = shared(StubModule::new(
        "generator",
        &[("conv.weight", vec![0.0, 0.0]), ("conv.bias", vec![0.0])],
    ));
    let discriminator = shared(StubModule::new(
        "discriminator",
        &[("fc.weight", vec![0.0, 0.0, 0.0])],
    ));
    let optimizer = shared(StubModule::new("opt", &[("momentum", vec![0.0, 0.0])]));
    let scheduler = shared(StubModule::new("sched", &[("lr", vec![0.0])]));

    let mut loader = Checkpointer::new(&config(dir.path()), true);
    loader.register_model("generator", generator.clone());
    loader.register_model("discriminator", discriminator.clone());
    loader.register_optimizer("generator", optimizer.clone());
    loader.set_scheduler(scheduler.clone());

    let extras = loader.load(false, None).await?;

    assert_eq!(extras["step"], json!(1234));
    assert_eq!(extras["lod"], json!(4));
    assert_eq!(extras.len(), 2);
    assert_eq!(generator.lock().param("conv.weight").unwrap(), &[0.5, -0.5]);
    assert_eq!(generator.lock().param("conv.bias").unwrap(), &[0.1]);
    assert_eq!(
        discriminator.lock().param("fc.weight").unwrap(),
        &[2.0, 3.0, 4.0]
    );
    assert_eq!(optimizer.lock().param("momentum").unwrap(), &[0.9, 0.8]);
    assert_eq!(scheduler.lock().param("lr").unwrap(), &[1e-3]);
    Ok(())
}

#[tokio::test]
async fn test_pointer_resolves_to_latest_tag() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;

    let model = shared(StubModule::new("m", &[("w", vec![1.0])]));
    let mut checkpointer = Checkpointer::new(&config(dir.path()), true);
    checkpointer.register_model("m", model.clone());

    checkpointer.save("t1", HashMap::from([("tag".to_string(), json!("t1"))]))?;
    checkpointer.wait_pending().await;
    checkpointer.save("t2", HashMap::from([("tag".to_string(), json!("t2"))]))?;
    checkpointer.wait_pending().await;

    let mut loader = Checkpointer::new(&config(dir.path()), true);
    loader.register_model("m", shared(StubModule::new("m", &[("w", vec![0.0])])));
    let extras = loader.load(false, None).await?;
    assert_eq!(extras["tag"], json!("t2"));
    Ok(())
}

#[tokio::test]
async fn test_fresh_start_paths() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;

    let mut checkpointer = Checkpointer::new(&config(dir.path()), true);
    checkpointer.register_model("m", shared(StubModule::new("m", &[("w", vec![1.0])])));

    // No pointer file yet
    assert!(checkpointer.load(false, None).await?.is_empty());

    checkpointer.save("t1", HashMap::from([("k".to_string(), json!(1))]))?;
    checkpointer.wait_pending().await;

    // Ignore flag wins over the existing checkpoint
    assert!(checkpointer.load(true, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_partial_record_warns_and_loads_the_rest() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;

    let mut saver = Checkpointer::new(&config(dir.path()), true);
    saver.register_model("a", shared(StubModule::new("a", &[("w", vec![6.0])])));
    saver.save("only-a", HashMap::new())?;
    saver.wait_pending().await;

    let model_a = shared(StubModule::new("a", &[("w", vec![0.0])]));
    let model_b = shared(StubModule::new("b", &[("w", vec![-1.0])]));

    let mut loader = Checkpointer::new(&config(dir.path()), true);
    loader.register_model("a", model_a.clone());
    loader.register_model("b", model_b.clone());
    loader.load(false, None).await?;

    // "a" restored, unrecorded "b" untouched
    assert_eq!(model_a.lock().param("w").unwrap(), &[6.0]);
    assert_eq!(model_b.lock().param("w").unwrap(), &[-1.0]);
    Ok(())
}

#[tokio::test]
async fn test_model_state_with_drifted_keys_loads_permissively() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;

    // Saved layout has a key the refactored model no longer carries
    let mut saver = Checkpointer::new(&config(dir.path()), true);
    saver.register_model(
        "m",
        shared(StubModule::new(
            "m",
            &[("kept", vec![1.0]), ("removed", vec![9.0])],
        )),
    );
    saver.save("old-layout", HashMap::new())?;
    saver.wait_pending().await;

    let model = shared(StubModule::new(
        "m",
        &[("kept", vec![0.0]), ("added", vec![0.25])],
    ));
    let mut loader = Checkpointer::new(&config(dir.path()), true);
    loader.register_model("m", model.clone());
    loader.load(false, None).await?;

    assert_eq!(model.lock().param("kept").unwrap(), &[1.0]);
    assert_eq!(model.lock().param("added").unwrap(), &[0.25]);
    assert!(model.lock().param("removed").is_none());
    Ok(())
}
