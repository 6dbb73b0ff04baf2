//! Conversion of raw pixel batches into training tensors

use training_core::{Device, Error, PixelBatch, Result, Tensor};

/// Converts a one-element raw batch into an f32 tensor on a target device.
///
/// The output is a leaf tensor with no gradient history, flagged for
/// gradient tracking from this point forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchCollator {
    /// Device the collated tensor is placed on
    pub device: Device,
}

impl BatchCollator {
    /// Create a collator targeting `device`
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    /// Collate a batch wrapper holding exactly one pixel array.
    ///
    /// Any other arity is an error; the batch source always wraps a single
    /// array per step.
    pub fn collate(&self, batch: &[PixelBatch]) -> Result<Tensor> {
        let [pixels] = batch else {
            return Err(Error::InvalidBatch {
                message: format!("expected exactly one element, got {}", batch.len()),
            });
        };

        let floats = pixels.mapv(f32::from).into_dyn();
        Ok(Tensor::leaf(floats, self.device, true))
    }
}
