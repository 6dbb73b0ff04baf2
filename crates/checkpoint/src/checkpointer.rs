//! Checkpointer aggregating named model, optimizer, and scheduler states

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use training_core::{Result, StateDict, Stateful, TrainingConfig};

use crate::writer;

/// Shared handle to a registered stateful object
pub type SharedStateful = Arc<Mutex<dyn Stateful>>;

/// On-disk checkpoint record.
///
/// Caller extras ride along as a JSON text field so the payload encoding
/// stays self-contained while the extras stay schema-free.
#[derive(Serialize, Deserialize)]
struct CheckpointRecord {
    saved_at: DateTime<Utc>,
    models: BTreeMap<String, Option<StateDict>>,
    optimizers: BTreeMap<String, StateDict>,
    scheduler: Option<StateDict>,
    extra_json: String,
}

/// Persists and restores the combined state of registered models,
/// optimizers, and a learning-rate scheduler.
///
/// Saves are asynchronous: each call spawns one task that writes the blob
/// and then updates the pointer file, in that order. The task handles are
/// retained; [`Checkpointer::wait_pending`] drains them, and failures are
/// reported through the log sink rather than back to the `save` caller.
pub struct Checkpointer {
    output_dir: PathBuf,
    models: BTreeMap<String, SharedStateful>,
    optimizers: BTreeMap<String, SharedStateful>,
    scheduler: Option<SharedStateful>,
    save_enabled: bool,
    pending: Vec<JoinHandle<()>>,
}

impl Checkpointer {
    /// Create a checkpointer writing under the configured output directory.
    ///
    /// Non-primary ranks pass `save_enabled = false` and get a checkpointer
    /// whose `save` is a no-op.
    pub fn new(config: &TrainingConfig, save_enabled: bool) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            models: BTreeMap::new(),
            optimizers: BTreeMap::new(),
            scheduler: None,
            save_enabled,
            pending: Vec::new(),
        }
    }

    /// Register a named model
    pub fn register_model(&mut self, name: &str, model: SharedStateful) {
        self.models.insert(name.to_string(), model);
    }

    /// Register a named optimizer
    pub fn register_optimizer(&mut self, name: &str, optimizer: SharedStateful) {
        self.optimizers.insert(name.to_string(), optimizer);
    }

    /// Register the learning-rate scheduler
    pub fn set_scheduler(&mut self, scheduler: SharedStateful) {
        self.scheduler = Some(scheduler);
    }

    /// Output directory receiving blobs and the pointer file
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Snapshot all registered states and persist them under `tag`.
    ///
    /// States are captured synchronously; serialization and file I/O run in
    /// a spawned task. The pointer file is updated only after the blob write
    /// completes, in the same task.
    pub fn save(&mut self, tag: &str, extra: HashMap<String, Value>) -> Result<()> {
        if !self.save_enabled {
            return Ok(());
        }

        let record = self.snapshot(extra)?;
        let save_file = self
            .output_dir
            .join(format!("{}.{}", tag, writer::CHECKPOINT_EXT));
        let output_dir = self.output_dir.clone();

        self.pending.retain(|handle| !handle.is_finished());
        self.pending.push(tokio::spawn(async move {
            info!(path = %save_file.display(), "Saving checkpoint");
            let result = async {
                let payload = Bytes::from(
                    bincode::serialize(&record)
                        .map_err(|e| training_core::Error::Serialization(e.to_string()))?,
                );
                writer::write_blob(&save_file, payload).await?;
                writer::tag_last_checkpoint(&output_dir, &save_file).await
            }
            .await;

            if let Err(e) = result {
                error!(path = %save_file.display(), error = %e, "Checkpoint save failed");
            }
        }));

        Ok(())
    }

    /// Await all outstanding save tasks
    pub async fn wait_pending(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Checkpoint save task panicked");
            }
        }
    }

    /// Number of save tasks not yet known to have finished
    pub fn pending_saves(&self) -> usize {
        self.pending.iter().filter(|h| !h.is_finished()).count()
    }

    /// Restore registered objects from a checkpoint.
    ///
    /// Resolution order: with `ignore_last_checkpoint`, nothing is read and
    /// empty extras are returned. An explicit `file_name` is used verbatim
    /// and must exist. Otherwise the pointer file decides; an absent or
    /// unreadable pointer is a fresh start, not an error.
    ///
    /// Model states load permissively. Optimizer and scheduler states load
    /// strictly, and only when both the record entry and the registered
    /// object exist. Returns the caller-extra keys from the record.
    pub async fn load(
        &mut self,
        ignore_last_checkpoint: bool,
        file_name: Option<&Path>,
    ) -> Result<HashMap<String, Value>> {
        if ignore_last_checkpoint {
            info!("Forced to initialize from scratch");
            return Ok(HashMap::new());
        }

        let load_file = match file_name {
            Some(path) => path.to_path_buf(),
            None => match writer::read_last_checkpoint(&self.output_dir).await {
                Some(path) => path,
                None => {
                    info!("No checkpoint found, initializing from scratch");
                    return Ok(HashMap::new());
                }
            },
        };

        info!(path = %load_file.display(), "Loading checkpoint");
        let payload = writer::read_blob(&load_file).await?;
        let mut record: CheckpointRecord = bincode::deserialize(&payload)
            .map_err(|e| training_core::Error::CheckpointCorrupted {
                path: load_file.display().to_string(),
                reason: e.to_string(),
            })?;

        for (name, model) in &self.models {
            match record.models.remove(name) {
                Some(Some(state)) => model.lock().load_state_dict(&state, false)?,
                Some(None) => warn!(model = %name, "State for model is empty"),
                None => warn!(model = %name, "No state for model"),
            }
        }

        if !record.optimizers.is_empty() && !self.optimizers.is_empty() {
            info!(path = %load_file.display(), "Loading optimizer states");
            for (name, optimizer) in &self.optimizers {
                match record.optimizers.remove(name) {
                    Some(state) => optimizer.lock().load_state_dict(&state, true)?,
                    None => warn!(optimizer = %name, "No state for optimizer"),
                }
            }
        }

        if let (Some(state), Some(scheduler)) = (record.scheduler.take(), self.scheduler.as_ref()) {
            info!(path = %load_file.display(), "Loading scheduler state");
            scheduler.lock().load_state_dict(&state, true)?;
        }

        let extra = serde_json::from_str(&record.extra_json)?;
        Ok(extra)
    }

    /// Capture all registered states into one record
    fn snapshot(&self, extra: HashMap<String, Value>) -> Result<CheckpointRecord> {
        let models = self
            .models
            .iter()
            .map(|(name, model)| (name.clone(), Some(model.lock().state_dict())))
            .collect();

        let optimizers = self
            .optimizers
            .iter()
            .map(|(name, optimizer)| (name.clone(), optimizer.lock().state_dict()))
            .collect();

        let scheduler = self
            .scheduler
            .as_ref()
            .map(|scheduler| scheduler.lock().state_dict());

        Ok(CheckpointRecord {
            saved_at: Utc::now(),
            models,
            optimizers,
            scheduler,
            extra_json: serde_json::to_string(&extra)?,
        })
    }
}
