//! Backend type aliases and device management
//!
//! - **TrainingBackend**: Autodiff-enabled NdArray backend used by the extractor (CPU)
//! - **InferenceBackend**: Plain NdArray backend for `encode`/`predict` inputs and outputs
//!
//! The NdArray backend is enough for 84x84 frame stacks on CPU. A GPU backend can
//! be plugged in through the generic `B: AutodiffBackend` parameter of
//! [`FeatureExtractor`](super::FeatureExtractor).

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend type for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend type for inference (without autodiff)
///
/// This is the inner backend of [`TrainingBackend`]; frame batches handed to the
/// extractor live here.
pub type InferenceBackend = NdArray<f32>;

/// Get the default device for computation
///
/// Returns the default NdArray device (CPU).
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
