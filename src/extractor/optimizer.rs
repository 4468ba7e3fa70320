//! Optimizer selection for the extractor
//!
//! Each configuration name maps to one optimizer wrapped in an
//! [`OptimizerAdaptor`]. Adam is burn's own. RMSProp and Adadelta are
//! implemented here on top of [`SimpleOptimizer`], the same way burn's own
//! optimizers are: RMSProp starts its mean square at one and adds epsilon inside
//! the square root, and the centered variant clamps its variance at zero, so
//! vanishing gradients never produce a NaN step. burn ships no Adadelta.

use std::path::PathBuf;

use burn::{
    module::AutodiffModule,
    optim::{
        Adam, AdamConfig, GradientsParams, Optimizer, SimpleOptimizer, adaptor::OptimizerAdaptor,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder, RecorderError},
    tensor::{
        Tensor,
        backend::{AutodiffBackend, Backend},
    },
};

use super::config::OptimizerConfig;
use super::network::ConvAutoencoder;

/// Learning rate used by the optimizers configured without one
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Epsilon of both RMSProp variants
const RMSPROP_EPSILON: f32 = 1e-10;

/// Epsilon of Adam
const ADAM_EPSILON: f32 = 1e-8;

/// Configuration for [`RmsProp`]
#[derive(Debug, Clone)]
pub struct RmsPropConfig {
    /// Discount of the running averages
    pub decay: f32,

    /// Added to the mean square inside the square root
    ///
    /// Default: 1e-10
    pub epsilon: f32,

    /// Normalize by the gradient variance instead of the mean square
    pub centered: bool,
}

impl RmsPropConfig {
    pub fn new(decay: f32, centered: bool) -> Self {
        Self {
            decay,
            epsilon: RMSPROP_EPSILON,
            centered,
        }
    }

    /// Initialize an RMSProp optimizer for module `M`
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> OptimizerAdaptor<RmsProp, M, B> {
        OptimizerAdaptor::from(RmsProp {
            decay: self.decay,
            epsilon: self.epsilon,
            centered: self.centered,
        })
    }
}

/// RMSProp, optionally centered
///
/// ```text
/// ms = ρ ms + (1 - ρ) g²                      ms starts at 1
/// mg = ρ mg + (1 - ρ) g                       centered only, starts at 0
/// x  = x - lr · g / sqrt(max(ms - mg², 0) + ε)
/// ```
#[derive(Debug, Clone)]
pub struct RmsProp {
    decay: f32,
    epsilon: f32,
    centered: bool,
}

/// Running averages kept per parameter by [`RmsProp`]
#[derive(Record, Clone)]
pub struct RmsPropState<B: Backend, const D: usize> {
    /// Running average of squared gradients
    pub mean_square: Tensor<B, D>,
    /// Running average of gradients; stays zero unless centered
    pub mean_grad: Tensor<B, D>,
}

impl<B: Backend> SimpleOptimizer<B> for RmsProp {
    type State<const D: usize> = RmsPropState<B, D>;

    fn step<const D: usize>(
        &self,
        lr: f64,
        tensor: Tensor<B, D>,
        grad: Tensor<B, D>,
        state: Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        let (mean_square, mean_grad) = match state {
            Some(state) => (state.mean_square, state.mean_grad),
            None => (grad.ones_like(), grad.zeros_like()),
        };

        let mean_square = mean_square.mul_scalar(self.decay)
            + grad.clone().mul(grad.clone()).mul_scalar(1.0 - self.decay);

        let (mean_grad, denominator) = if self.centered {
            let mean_grad =
                mean_grad.mul_scalar(self.decay) + grad.clone().mul_scalar(1.0 - self.decay);
            let variance = (mean_square.clone() - mean_grad.clone().mul(mean_grad.clone()))
                .clamp_min(0.0);
            (mean_grad, variance)
        } else {
            (mean_grad, mean_square.clone())
        };

        let update = grad.div(denominator.add_scalar(self.epsilon).sqrt());
        let tensor = tensor - update.mul_scalar(lr);
        (
            tensor,
            Some(RmsPropState {
                mean_square,
                mean_grad,
            }),
        )
    }

    fn to_device<const D: usize>(state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        RmsPropState {
            mean_square: state.mean_square.to_device(device),
            mean_grad: state.mean_grad.to_device(device),
        }
    }
}

/// Configuration for [`Adadelta`]
#[derive(Debug, Clone)]
pub struct AdadeltaConfig {
    /// Decay rate of both running averages
    ///
    /// Default: 0.95
    pub rho: f32,

    /// Added inside both square roots
    ///
    /// Default: 1e-8
    pub epsilon: f32,
}

impl Default for AdadeltaConfig {
    fn default() -> Self {
        Self {
            rho: 0.95,
            epsilon: 1e-8,
        }
    }
}

impl AdadeltaConfig {
    /// Initialize an Adadelta optimizer for module `M`
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> OptimizerAdaptor<Adadelta, M, B> {
        OptimizerAdaptor::from(Adadelta {
            rho: self.rho,
            epsilon: self.epsilon,
        })
    }
}

/// Adadelta (Zeiler, 2012)
///
/// ```text
/// E[g²]  = ρ E[g²]  + (1 - ρ) g²
/// Δx     = sqrt(E[Δx²] + ε) / sqrt(E[g²] + ε) · g
/// E[Δx²] = ρ E[Δx²] + (1 - ρ) Δx²
/// x      = x - lr · Δx
/// ```
#[derive(Debug, Clone)]
pub struct Adadelta {
    rho: f32,
    epsilon: f32,
}

/// Running averages kept per parameter by [`Adadelta`]
#[derive(Record, Clone)]
pub struct AdadeltaState<B: Backend, const D: usize> {
    /// Running average of squared gradients
    pub square_avg: Tensor<B, D>,
    /// Running average of squared updates
    pub update_avg: Tensor<B, D>,
}

impl<B: Backend> SimpleOptimizer<B> for Adadelta {
    type State<const D: usize> = AdadeltaState<B, D>;

    fn step<const D: usize>(
        &self,
        lr: f64,
        tensor: Tensor<B, D>,
        grad: Tensor<B, D>,
        state: Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        let (square_avg, update_avg) = match state {
            Some(state) => (state.square_avg, state.update_avg),
            None => (grad.zeros_like(), grad.zeros_like()),
        };

        let square_avg = square_avg.mul_scalar(self.rho)
            + grad.clone().mul(grad.clone()).mul_scalar(1.0 - self.rho);
        let update = update_avg
            .clone()
            .add_scalar(self.epsilon)
            .sqrt()
            .div(square_avg.clone().add_scalar(self.epsilon).sqrt())
            .mul(grad);
        let update_avg = update_avg.mul_scalar(self.rho)
            + update.clone().mul(update.clone()).mul_scalar(1.0 - self.rho);

        let tensor = tensor - update.mul_scalar(lr);
        (
            tensor,
            Some(AdadeltaState {
                square_avg,
                update_avg,
            }),
        )
    }

    fn to_device<const D: usize>(state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        AdadeltaState {
            square_avg: state.square_avg.to_device(device),
            update_avg: state.update_avg.to_device(device),
        }
    }
}

enum OptimizerKind<B: AutodiffBackend> {
    RmsProp(OptimizerAdaptor<RmsProp, ConvAutoencoder<B>, B>),
    Adam(OptimizerAdaptor<Adam, ConvAutoencoder<B>, B>),
    Adadelta(OptimizerAdaptor<Adadelta, ConvAutoencoder<B>, B>),
}

/// The optimizer chosen by an [`OptimizerConfig`], with its learning rate
pub struct ExtractorOptimizer<B: AutodiffBackend> {
    learning_rate: f64,
    kind: OptimizerKind<B>,
}

impl<B: AutodiffBackend> ExtractorOptimizer<B> {
    /// Create the optimizer for `config`
    ///
    /// | name              | optimizer                                  |
    /// |-------------------|--------------------------------------------|
    /// | `rmspropcentered` | centered RMSProp, `lr`, `decay`            |
    /// | `rmsprop`         | RMSProp, `lr`, `decay`                     |
    /// | `adam`            | Adam, lr 1e-3, betas (0.9, 0.999)          |
    /// | `adadelta`        | Adadelta, lr 1e-3, rho 0.95                |
    pub fn new(config: &OptimizerConfig) -> Self {
        match *config {
            OptimizerConfig::RmsPropCentered { lr, decay } => Self::rmsprop(lr, decay, true),
            OptimizerConfig::RmsProp { lr, decay } => Self::rmsprop(lr, decay, false),
            OptimizerConfig::Adam => Self {
                learning_rate: DEFAULT_LEARNING_RATE,
                kind: OptimizerKind::Adam(AdamConfig::new().with_epsilon(ADAM_EPSILON).init()),
            },
            OptimizerConfig::Adadelta => Self {
                learning_rate: DEFAULT_LEARNING_RATE,
                kind: OptimizerKind::Adadelta(AdadeltaConfig::default().init()),
            },
        }
    }

    fn rmsprop(lr: f64, decay: f64, centered: bool) -> Self {
        let optim = RmsPropConfig::new(decay as f32, centered).init();
        Self {
            learning_rate: lr,
            kind: OptimizerKind::RmsProp(optim),
        }
    }

    /// Learning rate passed to every step
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Apply one update to `network`
    pub fn step(&mut self, network: ConvAutoencoder<B>, grads: GradientsParams) -> ConvAutoencoder<B> {
        let lr = self.learning_rate;
        match &mut self.kind {
            OptimizerKind::RmsProp(optim) => optim.step(lr, network, grads),
            OptimizerKind::Adam(optim) => optim.step(lr, network, grads),
            OptimizerKind::Adadelta(optim) => optim.step(lr, network, grads),
        }
    }

    /// Write the optimizer state (moments, running averages) to `path`
    pub fn save(
        &self,
        recorder: &NamedMpkFileRecorder<FullPrecisionSettings>,
        path: PathBuf,
    ) -> Result<(), RecorderError> {
        match &self.kind {
            OptimizerKind::RmsProp(optim) => recorder.record(optim.to_record(), path),
            OptimizerKind::Adam(optim) => recorder.record(optim.to_record(), path),
            OptimizerKind::Adadelta(optim) => recorder.record(optim.to_record(), path),
        }
    }

    /// Replace the optimizer state with the one stored at `path`
    pub fn load(
        self,
        recorder: &NamedMpkFileRecorder<FullPrecisionSettings>,
        path: PathBuf,
        device: &B::Device,
    ) -> Result<Self, RecorderError> {
        let kind = match self.kind {
            OptimizerKind::RmsProp(optim) => {
                OptimizerKind::RmsProp(optim.load_record(recorder.load(path, device)?))
            }
            OptimizerKind::Adam(optim) => {
                OptimizerKind::Adam(optim.load_record(recorder.load(path, device)?))
            }
            OptimizerKind::Adadelta(optim) => {
                OptimizerKind::Adadelta(optim.load_record(recorder.load(path, device)?))
            }
        };
        Ok(Self {
            learning_rate: self.learning_rate,
            kind,
        })
    }

    /// Configuration name of the wrapped optimizer family
    pub fn family(&self) -> &'static str {
        match self.kind {
            OptimizerKind::RmsProp(_) => "rmsprop",
            OptimizerKind::Adam(_) => "adam",
            OptimizerKind::Adadelta(_) => "adadelta",
        }
    }
}
