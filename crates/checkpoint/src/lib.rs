//! Checkpoint management for resumable training
//!
//! Aggregates the states of named models, optimizers, and a scheduler into
//! one saved record per tag, written asynchronously, with a single-slot
//! pointer file naming the most recent completed save.

pub mod checkpointer;
pub mod writer;

pub use checkpointer::{Checkpointer, SharedStateful};
pub use writer::{CHECKPOINT_EXT, LAST_CHECKPOINT_FILE};
