//! Training mode for the feature extractor
//!
//! Fits the autoencoder on synthetic bouncing-ball transitions, logging
//! progress and saving checkpoints into the output folder.
//!
//! # Example
//!
//! ```rust,ignore
//! use deep_fqi_extractor::extractor::{default_device, TrainingBackend};
//! use deep_fqi_extractor::modes::{TrainConfig, TrainMode};
//!
//! let config = TrainConfig::new(10_000, "runs/extractor".into());
//! let mut train_mode = TrainMode::<TrainingBackend>::new(config, default_device())?;
//! train_mode.run()?;
//! ```

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use crate::extractor::{ExtractorConfig, FeatureExtractor};
use crate::frames::{BouncingBall, transition_batch};
use crate::metrics::TrainingStats;

/// Configuration for training mode
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of fit calls
    pub steps: usize,

    /// Transitions per fit call
    pub batch_size: usize,

    /// Output folder for checkpoints and summaries
    pub folder: PathBuf,

    /// Checkpoint folder to resume from instead of building
    pub load_path: Option<PathBuf>,

    /// Extractor name; defaults to the stored or built-in one
    pub name: Option<String>,

    /// Network configuration mapping used when building
    pub convnet_pars: Value,

    /// Save a checkpoint every N steps (0 disables)
    pub checkpoint_frequency: usize,

    /// Log training progress every N steps (0 disables)
    pub log_frequency: usize,

    /// Seed of the frame generator
    pub seed: u64,
}

impl TrainConfig {
    /// Training configuration building the Atari-sized extractor
    ///
    /// ```rust
    /// use deep_fqi_extractor::modes::TrainConfig;
    ///
    /// let config = TrainConfig::new(1000, "runs/extractor".into());
    /// assert_eq!(config.steps, 1000);
    /// assert!(config.load_path.is_none());
    /// ```
    pub fn new(steps: usize, folder: PathBuf) -> Self {
        Self {
            steps,
            batch_size: 32,
            folder,
            load_path: None,
            name: None,
            convnet_pars: serde_json::to_value(ExtractorConfig::atari()).unwrap_or_default(),
            checkpoint_frequency: 1000,
            log_frequency: 100,
            seed: 0,
        }
    }
}

/// Training loop around a [`FeatureExtractor`]
pub struct TrainMode<B: AutodiffBackend> {
    extractor: FeatureExtractor<B>,
    generator: BouncingBall,
    stats: TrainingStats,
    config: TrainConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainMode<B> {
    /// Build (or load) the extractor and its frame source
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        let extractor = FeatureExtractor::new(
            config.name.as_deref(),
            &config.folder,
            config.load_path.as_deref(),
            &config.convnet_pars,
            device.clone(),
        )
        .with_context(|| format!("Failed to create extractor in {:?}", config.folder))?;

        let generator = BouncingBall::new(extractor.config().height, extractor.config().width, config.seed);

        Ok(Self {
            extractor,
            generator,
            stats: TrainingStats::new(100),
            config,
            device,
        })
    }

    pub fn extractor(&self) -> &FeatureExtractor<B> {
        &self.extractor
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Run the training loop and save the final checkpoint
    pub fn run(&mut self) -> Result<()> {
        self.log_header();

        for step in 1..=self.config.steps {
            self.train_step()?;

            if self.config.log_frequency > 0 && step % self.config.log_frequency == 0 {
                info!("[Step {}/{}] {}", step, self.config.steps, self.stats.format_summary());
            }

            if self.config.checkpoint_frequency > 0 && step % self.config.checkpoint_frequency == 0 {
                self.save()?;
            }
        }

        self.save()?;
        info!(folder = ?self.config.folder, "training complete");
        info!("{}", self.stats.format_summary());
        Ok(())
    }

    /// One fit call on a fresh batch of transitions
    fn train_step(&mut self) -> Result<()> {
        let history_length = self.extractor.config().history_length;
        let (x, y) = transition_batch::<B::InnerBackend>(
            &mut self.generator,
            history_length,
            self.config.batch_size,
            &self.device,
        );

        self.extractor
            .fit(x, y)
            .with_context(|| format!("Fit failed at step {}", self.extractor.train_count()))?;

        if let Some(loss) = self.extractor.last_loss() {
            self.stats.record_loss(loss);
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.extractor
            .save()
            .with_context(|| format!("Failed to save checkpoint to {:?}", self.config.folder))
    }

    fn log_header(&self) {
        let config = self.extractor.config();
        info!(
            name = self.extractor.name(),
            steps = self.config.steps,
            batch_size = self.config.batch_size,
            frame = %format!("{}x{}x{}", config.height, config.width, config.history_length),
            optimizer = config.optimizer.name(),
            latent_dim = self.extractor.latent_dim(),
            checkpoint_frequency = self.config.checkpoint_frequency,
            log_frequency = self.config.log_frequency,
            "starting training"
        );
    }
}
