//! Shared helpers for the criterion benchmarks

use ndarray::Array3;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use training_core::{apply_state, Result, StateDict, Stateful, TensorData};

/// Module holding one flat parameter tensor of a configurable size
pub struct DenseModule {
    state: StateDict,
}

impl DenseModule {
    /// Build a module carrying `param_count` f32 parameters
    pub fn new(param_count: usize) -> Self {
        let mut state = StateDict::new();
        state.insert(
            "weight".to_string(),
            TensorData::new(vec![param_count], vec![0.5; param_count]),
        );
        Self { state }
    }
}

impl Stateful for DenseModule {
    fn state_dict(&self) -> StateDict {
        self.state.clone()
    }

    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()> {
        apply_state("dense", &mut self.state, state, strict)
    }
}

/// Wrap a module for registration
pub fn shared(module: DenseModule) -> Arc<Mutex<DenseModule>> {
    Arc::new(Mutex::new(module))
}

/// Generate random `[3, side, side]` samples with a fixed seed
pub fn random_samples(count: usize, side: usize, seed: u64) -> Vec<Array3<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Array3::from_shape_simple_fn((3, side, side), || rng.gen::<u8>()))
        .collect()
}
