//! Core type definitions shared by the checkpoint and dataset crates

use ndarray::{Array3, Array4, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Worker rank within a distributed set
pub type Rank = usize;

/// Resolution level; image side length is `2^lod`
pub type Lod = usize;

/// One raw image sample: `[channels, side, side]` unsigned 8-bit pixels
pub type PixelSample = Array3<u8>;

/// One batch of raw samples: `[batch, channels, side, side]`
pub type PixelBatch = Array4<u8>;

/// Number of color channels in every sample
pub const SAMPLE_CHANNELS: usize = 3;

/// Named parameter states captured from one module
pub type StateDict = HashMap<String, TensorData>;

/// A single named parameter: host-memory f32 values plus shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Dimensions, outermost first
    pub shape: Vec<usize>,

    /// Flattened values in row-major order
    pub values: Vec<f32>,
}

impl TensorData {
    /// Create a parameter from shape and flat values
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Number of elements implied by the shape
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when the shape has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute device a tensor is placed on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,

    /// CUDA device by ordinal
    Cuda(usize),
}

/// A floating-point tensor handed to the training loop.
///
/// Gradient history is never attached at construction; `requires_grad` only
/// marks the tensor for tracking from this point forward.
#[derive(Debug, Clone)]
pub struct Tensor {
    /// Element storage
    pub data: ArrayD<f32>,

    /// Placement
    pub device: Device,

    /// Whether downstream operations should track gradients
    pub requires_grad: bool,
}

impl Tensor {
    /// Create a leaf tensor with no gradient history
    pub fn leaf(data: ArrayD<f32>, device: Device, requires_grad: bool) -> Self {
        Self {
            data,
            device,
            requires_grad,
        }
    }

    /// Tensor shape
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}
