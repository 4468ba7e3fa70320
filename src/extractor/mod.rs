//! Deep-FQI feature extractor
//!
//! Provides:
//! - Convolutional autoencoder over stacked frames (encoder, decoder, latent)
//! - Configuration parsing and validation from JSON mappings
//! - Optimizer selection (centered RMSProp, RMSProp, Adam, Adadelta)
//! - Checkpoint persistence and scalar summaries for monitoring

pub mod backend;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod persistence;
pub mod summary;

pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use config::{ExtractorConfig, OptimizerConfig};
pub use error::{ExtractorError, Result};
pub use feature_extractor::FeatureExtractor;
pub use network::{AutoencoderConfig, ConvAutoencoder};
pub use optimizer::ExtractorOptimizer;
pub use persistence::ExtractorSchema;
pub use summary::{ScalarSummary, SummaryWriter};
