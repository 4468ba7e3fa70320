//! Checkpoint persistence for extractors
//!
//! A checkpoint folder holds three files sharing the base name
//! `deep_fqi_extractor`:
//! - `deep_fqi_extractor.meta.json` - schema: name, configuration, latent size
//!   and the ordered parameter shapes
//! - `deep_fqi_extractor.mpk` - network weights (Burn named MessagePack record)
//! - `deep_fqi_extractor_optim.mpk` - optimizer state
//!
//! Loading re-runs the topology construction from the stored configuration and
//! then loads the weights into it; the stored parameter shapes guard against a
//! record written by a different topology.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder, RecorderError},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::ExtractorConfig;
use super::error::{ExtractorError, Result};
use super::network::{AutoencoderConfig, ConvAutoencoder};
use super::optimizer::ExtractorOptimizer;

/// Base file name of every persisted extractor
pub const BASE_NAME: &str = "deep_fqi_extractor";

const OPTIMIZER_NAME: &str = "deep_fqi_extractor_optim";
const RECORD_EXTENSION: &str = "mpk";

/// Schema saved next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorSchema {
    /// Name the extractor was created with
    pub name: String,

    /// Hyperparameters used to build the network
    pub config: ExtractorConfig,

    /// Size of the latent feature vector
    pub latent_dim: usize,

    /// Shapes of the trainable arrays, in `get_weights` order
    pub parameter_shapes: Vec<Vec<usize>>,

    /// Crate version that wrote the checkpoint
    pub version: String,
}

impl ExtractorSchema {
    pub fn new(
        name: &str,
        config: &ExtractorConfig,
        latent_dim: usize,
        parameter_shapes: Vec<Vec<usize>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config: config.clone(),
            latent_dim,
            parameter_shapes,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Path of the weights record (without the recorder's extension)
pub fn weights_path(folder: &Path) -> PathBuf {
    folder.join(BASE_NAME)
}

/// Path of the schema file
pub fn schema_path(folder: &Path) -> PathBuf {
    weights_path(folder).with_extension("meta.json")
}

/// Path of the optimizer record (without the recorder's extension)
pub fn optimizer_path(folder: &Path) -> PathBuf {
    folder.join(OPTIMIZER_NAME)
}

/// Everything restored from a checkpoint folder
pub struct Checkpoint<B: AutodiffBackend> {
    pub schema: ExtractorSchema,
    pub network: ConvAutoencoder<B>,
    pub optimizer: ExtractorOptimizer<B>,
}

/// Save schema, weights and optimizer state into `folder`
///
/// Creates `folder` if needed; existing files are overwritten.
pub fn save_checkpoint<B: AutodiffBackend>(
    folder: &Path,
    schema: &ExtractorSchema,
    network: &ConvAutoencoder<B>,
    optimizer: &ExtractorOptimizer<B>,
) -> Result<()> {
    fs::create_dir_all(folder)?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    let path = weights_path(folder);
    recorder
        .record(network.clone().into_record(), path.clone())
        .map_err(|err| record_error(path, err))?;

    let path = optimizer_path(folder);
    optimizer
        .save(&recorder, path.clone())
        .map_err(|err| record_error(path, err))?;

    let path = schema_path(folder);
    fs::write(&path, serde_json::to_string_pretty(schema)?)?;

    debug!(folder = %folder.display(), "checkpoint written");
    Ok(())
}

/// Restore an extractor network and optimizer from `folder`
///
/// A folder without an optimizer record restores with a fresh optimizer.
pub fn load_checkpoint<B: AutodiffBackend>(folder: &Path, device: &B::Device) -> Result<Checkpoint<B>> {
    let schema_json = fs::read_to_string(schema_path(folder))?;
    let schema: ExtractorSchema = serde_json::from_str(&schema_json)?;
    schema.config.validate()?;
    let latent_dim = schema.config.latent_dim()?;
    if latent_dim != schema.latent_dim {
        return Err(ExtractorError::SchemaMismatch {
            path: folder.to_path_buf(),
            reason: format!(
                "configuration encodes {latent_dim} features, schema lists {}",
                schema.latent_dim
            ),
        });
    }

    let network = AutoencoderConfig::from(&schema.config).init::<B>(device);
    let shapes = network.parameter_shapes();
    if shapes != schema.parameter_shapes {
        return Err(ExtractorError::SchemaMismatch {
            path: folder.to_path_buf(),
            reason: format!(
                "configuration builds parameters {shapes:?}, schema lists {:?}",
                schema.parameter_shapes
            ),
        });
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let path = weights_path(folder);
    let record = recorder
        .load(path.clone(), device)
        .map_err(|err| record_error(path, err))?;
    let network = network.load_record(record);

    let mut optimizer = ExtractorOptimizer::new(&schema.config.optimizer);
    let path = optimizer_path(folder);
    if path.with_extension(RECORD_EXTENSION).exists() {
        optimizer = optimizer
            .load(&recorder, path.clone(), device)
            .map_err(|err| record_error(path, err))?;
    } else {
        warn!(folder = %folder.display(), "no optimizer state found, starting from fresh moments");
    }

    Ok(Checkpoint {
        schema,
        network,
        optimizer,
    })
}

fn record_error(path: PathBuf, err: RecorderError) -> ExtractorError {
    ExtractorError::Record {
        path,
        reason: format!("{err:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{TrainingBackend, default_device};
    use tempfile::TempDir;

    fn schema() -> ExtractorSchema {
        let config = ExtractorConfig::atari();
        let network = AutoencoderConfig::from(&config).init::<TrainingBackend>(&default_device());
        ExtractorSchema::new("extractor", &config, 400, network.parameter_shapes())
    }

    #[test]
    fn test_paths_share_base_name() {
        let folder = Path::new("out");
        assert_eq!(schema_path(folder), folder.join("deep_fqi_extractor.meta.json"));
        assert_eq!(weights_path(folder), folder.join("deep_fqi_extractor"));
        assert_eq!(optimizer_path(folder), folder.join("deep_fqi_extractor_optim"));
    }

    #[test]
    fn test_schema_creation() {
        let schema = schema();
        assert_eq!(schema.name, "extractor");
        assert_eq!(schema.latent_dim, 400);
        assert_eq!(schema.parameter_shapes.len(), 18);
        assert_eq!(schema.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_schema_serialization() {
        let schema = schema();
        let json = serde_json::to_string(&schema).unwrap();
        let deserialized: ExtractorSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, schema);
    }

    #[test]
    fn test_save_and_load_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let config = ExtractorConfig::atari();
        let network = AutoencoderConfig::from(&config).init::<TrainingBackend>(&device);
        let optimizer = ExtractorOptimizer::new(&config.optimizer);
        let schema = ExtractorSchema::new("extractor", &config, 400, network.parameter_shapes());

        save_checkpoint(temp_dir.path(), &schema, &network, &optimizer).unwrap();
        assert!(schema_path(temp_dir.path()).exists());
        assert!(weights_path(temp_dir.path()).with_extension("mpk").exists());
        assert!(optimizer_path(temp_dir.path()).with_extension("mpk").exists());

        let restored = load_checkpoint::<TrainingBackend>(temp_dir.path(), &device).unwrap();
        assert_eq!(restored.schema, schema);
        let before = network.parameters();
        let after = restored.network.parameters();
        for (a, b) in after.iter().zip(&before) {
            assert_eq!(a.to_vec::<f32>().unwrap(), b.to_vec::<f32>().unwrap());
        }
    }

    #[test]
    fn test_load_rejects_foreign_shapes() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let config = ExtractorConfig::atari();
        let network = AutoencoderConfig::from(&config).init::<TrainingBackend>(&device);
        let optimizer = ExtractorOptimizer::new(&config.optimizer);

        let mut schema = ExtractorSchema::new("extractor", &config, 400, network.parameter_shapes());
        schema.parameter_shapes.pop();
        save_checkpoint(temp_dir.path(), &schema, &network, &optimizer).unwrap();

        assert!(matches!(
            load_checkpoint::<TrainingBackend>(temp_dir.path(), &device),
            Err(ExtractorError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_load_without_optimizer_record() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let config = ExtractorConfig::atari();
        let network = AutoencoderConfig::from(&config).init::<TrainingBackend>(&device);
        let optimizer = ExtractorOptimizer::new(&config.optimizer);
        let schema = ExtractorSchema::new("extractor", &config, 400, network.parameter_shapes());

        save_checkpoint(temp_dir.path(), &schema, &network, &optimizer).unwrap();
        fs::remove_file(optimizer_path(temp_dir.path()).with_extension(RECORD_EXTENSION)).unwrap();

        let restored = load_checkpoint::<TrainingBackend>(temp_dir.path(), &device).unwrap();
        assert_eq!(restored.optimizer.family(), "rmsprop");
        assert_eq!(restored.optimizer.learning_rate(), 0.00025);
        assert_eq!(restored.network.parameter_shapes(), schema.parameter_shapes);
    }

    #[test]
    fn test_load_rejects_wrong_latent_size() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let config = ExtractorConfig::atari();
        let network = AutoencoderConfig::from(&config).init::<TrainingBackend>(&device);
        let optimizer = ExtractorOptimizer::new(&config.optimizer);
        let schema = ExtractorSchema::new("extractor", &config, 256, network.parameter_shapes());

        save_checkpoint(temp_dir.path(), &schema, &network, &optimizer).unwrap();
        assert!(matches!(
            load_checkpoint::<TrainingBackend>(temp_dir.path(), &device),
            Err(ExtractorError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_load_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nothing-here");
        assert!(matches!(
            load_checkpoint::<TrainingBackend>(&missing, &default_device()),
            Err(ExtractorError::Io(_))
        ));
    }
}
