//! Feature extractor: build-or-load, encode, predict, fit and checkpointing
//!
//! Frame batches are channel-last, `[batch, height, width, history_length]`, on
//! the inner (non-autodiff) backend. The network itself runs channel-first.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::AutodiffModule,
    optim::GradientsParams,
    tensor::{ElementConversion, Tensor, TensorData, backend::AutodiffBackend},
};
use serde_json::Value;
use tracing::{debug, info};

use super::backend::TrainingBackend;
use super::config::ExtractorConfig;
use super::error::{ExtractorError, Result};
use super::loss::sigmoid_cross_entropy;
use super::network::{AutoencoderConfig, ConvAutoencoder};
use super::optimizer::ExtractorOptimizer;
use super::persistence::{ExtractorSchema, load_checkpoint, save_checkpoint};
use super::summary::SummaryWriter;

/// Name used when none is given at construction
pub const DEFAULT_NAME: &str = "deep_fqi_extractor";

/// Tag of the loss summary recorded by [`FeatureExtractor::fit`]
pub const LOSS_TAG: &str = "loss";

/// Convolutional autoencoder feature extractor
///
/// Owns its network, optimizer state and monitoring writer; two extractors in
/// one process share nothing.
///
/// # Example
///
/// ```rust
/// use deep_fqi_extractor::extractor::{default_device, FeatureExtractor, InferenceBackend};
/// use deep_fqi_extractor::frames::{BouncingBall, transition_batch};
/// use serde_json::json;
/// use tempfile::TempDir;
///
/// let folder = TempDir::new().unwrap();
/// let pars = json!({
///     "height": 84,
///     "width": 84,
///     "history_length": 4,
///     "optimizer": { "name": "adam" },
/// });
/// let mut extractor: FeatureExtractor =
///     FeatureExtractor::new(None, folder.path(), None, &pars, default_device()).unwrap();
///
/// let mut frames = BouncingBall::new(84, 84, 0);
/// let (x, y) = transition_batch::<InferenceBackend>(&mut frames, 4, 2, &default_device());
///
/// extractor.fit(x.clone(), y).unwrap();
/// let features = extractor.encode(x).unwrap();
/// assert_eq!(features.dims(), [2, 400]);
///
/// extractor.save().unwrap();
/// assert_eq!(extractor.train_count(), 1);
/// ```
pub struct FeatureExtractor<B: AutodiffBackend = TrainingBackend> {
    name: String,
    folder: PathBuf,
    config: ExtractorConfig,
    latent_dim: usize,
    network: ConvAutoencoder<B>,
    optimizer: ExtractorOptimizer<B>,
    summary: SummaryWriter,
    train_count: usize,
    last_loss: Option<f32>,
    device: B::Device,
}

impl<B: AutodiffBackend> FeatureExtractor<B> {
    /// Create an extractor from a load path or from a configuration mapping
    ///
    /// With `load_path`, topology and weights are restored from the checkpoint
    /// folder and `convnet_pars` is ignored. Without it, `convnet_pars` must hold
    /// `height`, `width`, `history_length` and `optimizer`.
    ///
    /// # Errors
    ///
    /// [`ExtractorError::MissingKey`] when building and a key is absent,
    /// [`ExtractorError::UnknownOptimizer`] for an unavailable optimizer, and any
    /// I/O or record error of the load path.
    pub fn new(
        name: Option<&str>,
        folder_name: impl Into<PathBuf>,
        load_path: Option<&Path>,
        convnet_pars: &Value,
        device: B::Device,
    ) -> Result<Self> {
        match load_path {
            Some(path) => Self::load(name, folder_name, path, device),
            None => Self::build(name, folder_name, ExtractorConfig::from_value(convnet_pars)?, device),
        }
    }

    /// Build a freshly initialized extractor
    pub fn build(
        name: Option<&str>,
        folder_name: impl Into<PathBuf>,
        config: ExtractorConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let network = AutoencoderConfig::from(&config).init::<B>(&device);
        let optimizer = ExtractorOptimizer::new(&config.optimizer);
        let name = name.unwrap_or(DEFAULT_NAME).to_string();

        info!(
            name = %name,
            height = config.height,
            width = config.width,
            history_length = config.history_length,
            optimizer = config.optimizer.name(),
            "built extractor"
        );
        Self::attach(name, folder_name.into(), config, network, optimizer, device)
    }

    /// Restore an extractor saved with [`FeatureExtractor::save`]
    ///
    /// `load_path` is the folder the checkpoint was saved into. The restored
    /// extractor writes its summaries and future checkpoints to `folder_name`.
    /// Its training counter starts at zero.
    pub fn load(
        name: Option<&str>,
        folder_name: impl Into<PathBuf>,
        load_path: &Path,
        device: B::Device,
    ) -> Result<Self> {
        let checkpoint = load_checkpoint::<B>(load_path, &device)?;
        let name = name.map_or(checkpoint.schema.name, str::to_string);

        info!(name = %name, path = %load_path.display(), "restored extractor");
        Self::attach(
            name,
            folder_name.into(),
            checkpoint.schema.config,
            checkpoint.network,
            checkpoint.optimizer,
            device,
        )
    }

    fn attach(
        name: String,
        folder: PathBuf,
        config: ExtractorConfig,
        network: ConvAutoencoder<B>,
        optimizer: ExtractorOptimizer<B>,
        device: B::Device,
    ) -> Result<Self> {
        let latent_dim = config.latent_dim()?;
        fs::create_dir_all(&folder)?;
        let summary = SummaryWriter::new(&folder)?;

        Ok(Self {
            name,
            folder,
            config,
            latent_dim,
            network,
            optimizer,
            summary,
            train_count: 0,
            last_loss: None,
            device,
        })
    }

    /// Latent feature vectors, `[batch, latent_dim]`
    pub fn encode(&self, x: Tensor<B::InnerBackend, 4>) -> Result<Tensor<B::InnerBackend, 2>> {
        let frames = self.channel_first(x)?;
        Ok(self.network.valid().encode(frames))
    }

    /// Reconstructed frame stacks, `[batch, height, width, history_length]`
    pub fn predict(&self, x: Tensor<B::InnerBackend, 4>) -> Result<Tensor<B::InnerBackend, 4>> {
        let frames = self.channel_first(x)?;
        Ok(self.network.valid().forward(frames).permute([0, 2, 3, 1]))
    }

    /// Reconstruction loss of `x` against `y` under the current parameters
    pub fn loss(&self, x: Tensor<B::InnerBackend, 4>, y: Tensor<B::InnerBackend, 4>) -> Result<f32> {
        let (x, y) = self.channel_first_pair(x, y)?;
        let loss = sigmoid_cross_entropy(self.network.valid().forward(x), y);
        Ok(loss.into_scalar().elem::<f32>())
    }

    /// One optimizer step on the reconstruction loss of `x` against `y`
    ///
    /// Records the loss before the update as a summary tagged with the current
    /// training counter, then increments the counter.
    pub fn fit(&mut self, x: Tensor<B::InnerBackend, 4>, y: Tensor<B::InnerBackend, 4>) -> Result<()> {
        let (x, y) = self.channel_first_pair(x, y)?;
        let x = Tensor::<B, 4>::from_inner(x);
        let y = Tensor::<B, 4>::from_inner(y);

        let loss = sigmoid_cross_entropy(self.network.forward(x), y);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.network);
        self.network = self.optimizer.step(self.network.clone(), grads);

        self.summary.add_scalar(LOSS_TAG, loss_value, self.train_count);
        debug!(step = self.train_count, loss = loss_value, "fit");
        self.last_loss = Some(loss_value);
        self.train_count += 1;
        Ok(())
    }

    /// Current parameters, in the order [`Self::set_weights`] expects
    pub fn get_weights(&self) -> Vec<TensorData> {
        self.network.parameters()
    }

    /// Overwrite every trainable parameter positionally
    ///
    /// # Errors
    ///
    /// [`ExtractorError::WeightCount`] or [`ExtractorError::WeightShape`]; in
    /// both cases no parameter has been modified.
    pub fn set_weights(&mut self, weights: Vec<TensorData>) -> Result<()> {
        self.network.set_parameters(weights, &self.device)
    }

    /// Persist schema, weights and optimizer state to the output folder
    ///
    /// Repeated calls overwrite the previous checkpoint.
    pub fn save(&self) -> Result<()> {
        let schema = ExtractorSchema::new(
            &self.name,
            &self.config,
            self.latent_dim,
            self.network.parameter_shapes(),
        );
        save_checkpoint(&self.folder, &schema, &self.network, &self.optimizer)?;
        info!(name = %self.name, folder = %self.folder.display(), step = self.train_count, "saved extractor");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Size of the vectors returned by [`Self::encode`]
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Number of `fit` calls since construction
    pub fn train_count(&self) -> usize {
        self.train_count
    }

    /// Loss recorded by the most recent `fit`
    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    /// Monitoring writer attached to the output folder
    pub fn summary(&self) -> &SummaryWriter {
        &self.summary
    }

    fn channel_first(&self, x: Tensor<B::InnerBackend, 4>) -> Result<Tensor<B::InnerBackend, 4>> {
        let dims = x.dims();
        let [batch, height, width, channels] = dims;
        if batch == 0
            || height != self.config.height
            || width != self.config.width
            || channels != self.config.history_length
        {
            return Err(ExtractorError::InputShape {
                actual: dims,
                height: self.config.height,
                width: self.config.width,
                channels: self.config.history_length,
            });
        }
        Ok(x.permute([0, 3, 1, 2]))
    }

    fn channel_first_pair(
        &self,
        x: Tensor<B::InnerBackend, 4>,
        y: Tensor<B::InnerBackend, 4>,
    ) -> Result<(Tensor<B::InnerBackend, 4>, Tensor<B::InnerBackend, 4>)> {
        if x.dims() != y.dims() {
            return Err(ExtractorError::TargetShape {
                input: x.dims(),
                target: y.dims(),
            });
        }
        Ok((self.channel_first(x)?, y.permute([0, 3, 1, 2])))
    }
}
