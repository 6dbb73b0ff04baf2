//! Training Core - Foundation for the training support crates
//!
//! Provides shared tensor/state types, configuration, and error handling
//! for the checkpointing and data loading layers.

pub mod config;
pub mod error;
pub mod module;
pub mod types;

pub use config::{DatasetConfig, TrainingConfig};
pub use error::{Error, Result};
pub use module::{apply_state, Replicated, Stateful};
pub use types::*;
