use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use deep_fqi_extractor::extractor::{ExtractorConfig, TrainingBackend, default_device};
use deep_fqi_extractor::modes::{InspectMode, TrainConfig, TrainMode};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deep-fqi-extractor")]
#[command(version, about = "Convolutional autoencoder feature extractor for Deep-FQI")]
struct Cli {
    /// Execution mode
    #[arg(long, default_value = "train")]
    mode: Mode,

    /// JSON file with height, width, history_length and optimizer
    #[arg(long)]
    config: Option<PathBuf>,

    /// Checkpoint folder to load instead of building from --config
    #[arg(long)]
    load: Option<PathBuf>,

    /// Output folder for checkpoints and summaries
    #[arg(long, default_value = "runs/extractor")]
    folder: PathBuf,

    /// Extractor name
    #[arg(long)]
    name: Option<String>,

    /// Number of fit calls (train mode)
    #[arg(long, default_value = "10000")]
    steps: usize,

    /// Transitions per fit call (train mode)
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Log progress every N steps (train mode)
    #[arg(long, default_value = "100")]
    log_frequency: usize,

    /// Save a checkpoint every N steps (train mode)
    #[arg(long, default_value = "1000")]
    checkpoint_frequency: usize,

    /// Frame generator seed (train mode)
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    /// Fit the autoencoder on synthetic transitions
    Train,
    /// Log the configuration and parameter shapes of an extractor
    Inspect,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let convnet_pars = read_config(cli.config.as_deref())?;
    let device = default_device();

    match cli.mode {
        Mode::Train => {
            let mut config = TrainConfig::new(cli.steps, cli.folder);
            config.batch_size = cli.batch_size;
            config.load_path = cli.load;
            config.name = cli.name;
            config.convnet_pars = convnet_pars;
            config.log_frequency = cli.log_frequency;
            config.checkpoint_frequency = cli.checkpoint_frequency;
            config.seed = cli.seed;

            let mut train_mode = TrainMode::<TrainingBackend>::new(config, device)?;
            train_mode.run()?;
        }
        Mode::Inspect => {
            let inspect_mode =
                InspectMode::<TrainingBackend>::new(cli.folder, cli.load.as_deref(), &convnet_pars, device)?;
            inspect_mode.run()?;
        }
    }

    Ok(())
}

/// Configuration mapping from `path`, or the Atari defaults
fn read_config(path: Option<&Path>) -> Result<Value> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {path:?}"))?;
            serde_json::from_str(&content).with_context(|| format!("Failed to parse config {path:?}"))
        }
        None => serde_json::to_value(ExtractorConfig::atari()).context("Failed to encode default config"),
    }
}
