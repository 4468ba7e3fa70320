//! Deep-FQI feature extractor
//!
//! This library provides:
//! - Convolutional autoencoder feature extractor (extractor module)
//! - Synthetic bouncing-ball frames for training (frames module)
//! - Training statistics (metrics module)
//! - Execution modes for the binary (train, inspect)

pub mod extractor;
pub mod frames;
pub mod metrics;
pub mod modes;
