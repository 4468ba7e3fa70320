//! Inspection mode: report what an extractor checkpoint contains

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::extractor::FeatureExtractor;

/// Summary of one extractor, as logged by [`InspectMode::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorReport {
    pub name: String,
    pub height: usize,
    pub width: usize,
    pub history_length: usize,
    pub optimizer: String,
    pub latent_dim: usize,
    pub parameter_shapes: Vec<Vec<usize>>,
}

impl ExtractorReport {
    /// Total number of trainable scalars
    pub fn parameter_count(&self) -> usize {
        self.parameter_shapes
            .iter()
            .map(|shape| shape.iter().product::<usize>())
            .sum()
    }
}

/// Loads (or builds) an extractor and logs its topology
pub struct InspectMode<B: AutodiffBackend> {
    extractor: FeatureExtractor<B>,
}

impl<B: AutodiffBackend> InspectMode<B> {
    /// `folder` receives the summaries directory of the inspected instance
    pub fn new(folder: PathBuf, load_path: Option<&Path>, convnet_pars: &Value, device: B::Device) -> Result<Self> {
        let extractor = FeatureExtractor::new(None, &folder, load_path, convnet_pars, device)
            .with_context(|| match load_path {
                Some(path) => format!("Failed to load extractor from {path:?}"),
                None => "Failed to build extractor from configuration".to_string(),
            })?;
        Ok(Self { extractor })
    }

    pub fn report(&self) -> ExtractorReport {
        let config = self.extractor.config();
        ExtractorReport {
            name: self.extractor.name().to_string(),
            height: config.height,
            width: config.width,
            history_length: config.history_length,
            optimizer: config.optimizer.name().to_string(),
            latent_dim: self.extractor.latent_dim(),
            parameter_shapes: self.extractor.get_weights().iter().map(|w| w.shape.clone()).collect(),
        }
    }

    pub fn run(&self) -> Result<ExtractorReport> {
        let report = self.report();
        info!(
            name = %report.name,
            frame = %format!("{}x{}x{}", report.height, report.width, report.history_length),
            optimizer = %report.optimizer,
            latent_dim = report.latent_dim,
            parameters = report.parameter_count(),
            "extractor"
        );
        for (index, shape) in report.parameter_shapes.iter().enumerate() {
            info!(index, shape = ?shape, "parameter");
        }
        Ok(report)
    }
}
