//! Uniform state access for checkpointed objects
//!
//! Models, optimizers, and schedulers all expose their persistent state
//! through [`Stateful`]. Multi-device replication is an explicit wrapper
//! type rather than a capability probed at save time, so the plain and
//! replicated cases are resolved once, when the object is registered.

use crate::error::{Error, Result};
use crate::types::{Device, StateDict};

/// Anything whose state can be captured into and restored from a [`StateDict`]
pub trait Stateful: Send {
    /// Snapshot the current state
    fn state_dict(&self) -> StateDict;

    /// Restore state from a snapshot.
    ///
    /// With `strict` set, any key present on one side but not the other, or
    /// any shape disagreement, is an error. Without it, unknown and
    /// mismatched entries are skipped and the rest are applied.
    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()>;
}

/// A module replicated across several devices.
///
/// State always flows through the inner module; the replica devices only
/// matter at execution time.
pub struct Replicated<M> {
    /// The module holding the authoritative parameters
    pub module: M,

    /// Devices the module is replicated onto
    pub devices: Vec<Device>,
}

impl<M> Replicated<M> {
    /// Wrap a module for replicated execution
    pub fn new(module: M, devices: Vec<Device>) -> Self {
        Self { module, devices }
    }

    /// Access the inner module
    pub fn inner(&self) -> &M {
        &self.module
    }
}

impl<M: Stateful> Stateful for Replicated<M> {
    fn state_dict(&self) -> StateDict {
        self.module.state_dict()
    }

    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()> {
        self.module.load_state_dict(state, strict)
    }
}

/// Apply an incoming state dict onto existing parameters.
///
/// Implementors of [`Stateful`] can delegate their `load_state_dict` here:
/// entries are matched by name, and a shape match is required before values
/// are copied. Under `strict`, missing or extra keys and shape mismatches
/// fail with [`Error::StateMismatch`]; otherwise they are skipped.
pub fn apply_state(
    name: &str,
    current: &mut StateDict,
    incoming: &StateDict,
    strict: bool,
) -> Result<()> {
    if strict {
        for key in current.keys() {
            if !incoming.contains_key(key) {
                return Err(Error::StateMismatch {
                    name: name.to_string(),
                    reason: format!("missing key {}", key),
                });
            }
        }
    }

    for (key, value) in incoming {
        match current.get_mut(key) {
            Some(slot) if slot.shape == value.shape => {
                *slot = value.clone();
            }
            Some(slot) => {
                if strict {
                    return Err(Error::StateMismatch {
                        name: name.to_string(),
                        reason: format!(
                            "shape mismatch for {}: {:?} vs {:?}",
                            key, slot.shape, value.shape
                        ),
                    });
                }
                tracing::debug!(module = name, key = %key, "Skipping entry with mismatched shape");
            }
            None => {
                if strict {
                    return Err(Error::StateMismatch {
                        name: name.to_string(),
                        reason: format!("unexpected key {}", key),
                    });
                }
                tracing::debug!(module = name, key = %key, "Skipping unknown entry");
            }
        }
    }

    Ok(())
}
