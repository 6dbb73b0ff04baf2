//! Shared helpers for the integration tests

use parking_lot::Mutex;
use std::sync::Arc;
use training_core::{apply_state, Result, StateDict, Stateful, TensorData};

/// Minimal stateful module holding named f32 parameters
pub struct StubModule {
    name: String,
    state: StateDict,
}

impl StubModule {
    /// Build a module with the given named parameters
    pub fn new(name: &str, params: &[(&str, Vec<f32>)]) -> Self {
        let state = params
            .iter()
            .map(|(key, values)| {
                let len = values.len();
                (key.to_string(), TensorData::new(vec![len], values.clone()))
            })
            .collect();
        Self {
            name: name.to_string(),
            state,
        }
    }

    /// Current values of one parameter
    pub fn param(&self, key: &str) -> Option<&[f32]> {
        self.state.get(key).map(|t| t.values.as_slice())
    }
}

impl Stateful for StubModule {
    fn state_dict(&self) -> StateDict {
        self.state.clone()
    }

    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()> {
        apply_state(&self.name, &mut self.state, state, strict)
    }
}

/// Wrap a module for registration with the checkpointer
pub fn shared(module: StubModule) -> Arc<Mutex<StubModule>> {
    Arc::new(Mutex::new(module))
}

/// Install a test log subscriber once per process
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}
