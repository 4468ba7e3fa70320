//! Convolutional autoencoder used as the feature extractor network
//!
//! # Architecture
//!
//! ```text
//! Input: [batch, N, 84, 84]                 (N = history_length)
//!   ↓ hidden_1: Conv2d(N→32, k=8, s=4) + ReLU           [batch, 32, 20, 20]
//!   ↓ hidden_2: Conv2d(32→64, k=4, s=2) + ReLU          [batch, 64, 9, 9]
//!   ↓ hidden_3: Conv2d(64→64, k=3, s=1) + ReLU          [batch, 64, 7, 7]
//!   ↓ hidden_4: Conv2d(64→16, k=3, s=1) + ReLU          [batch, 16, 5, 5]
//!   ↓ Flatten (channel-last): latent [batch, 400]
//!   ↓ Unflatten                                          [batch, 16, 5, 5]
//!   ↓ hidden_5: ConvTranspose2d(16→16, k=3, s=1) + ReLU [batch, 16, 7, 7]
//!   ↓ hidden_6: ConvTranspose2d(16→64, k=3, s=1) + ReLU [batch, 64, 9, 9]
//!   ↓ hidden_7: ConvTranspose2d(64→64, k=4, s=2) + ReLU [batch, 64, 20, 20]
//!   ↓ hidden_8: ConvTranspose2d(64→32, k=8, s=4) + ReLU [batch, 32, 84, 84]
//!   ↓ prediction: ConvTranspose2d(32→N, k=1, s=1) + Sigmoid
//! Output: [batch, N, 84, 84]
//! ```
//!
//! The network works in burn's channel-first layout. The latent vector is
//! flattened channel-last (height, width, channel), which is the order the
//! downstream agents were trained against.
//!
//! Every weight and bias is drawn from a Glorot/Xavier uniform distribution with
//! bound `sqrt(6 / ((in + out) * k²))`. The bound is computed here because burn's
//! transposed convolutions do not hand a fan-out to their initializer.

use burn::{
    module::{Module, Param},
    nn::{
        Initializer,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    },
    tensor::{
        Tensor, TensorData,
        activation::{relu, sigmoid},
        backend::Backend,
    },
};

use super::config::ExtractorConfig;
use super::error::{ExtractorError, Result};

/// Kernel, stride and output channels of one (transposed) convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub kernel: usize,
    pub stride: usize,
    pub channels: usize,
}

impl LayerSpec {
    const fn new(kernel: usize, stride: usize, channels: usize) -> Self {
        Self {
            kernel,
            stride,
            channels,
        }
    }
}

/// Encoder convolutions `hidden_1..hidden_4`
pub const ENCODER_LAYERS: [LayerSpec; 4] = [
    LayerSpec::new(8, 4, 32),
    LayerSpec::new(4, 2, 64),
    LayerSpec::new(3, 1, 64),
    LayerSpec::new(3, 1, 16),
];

/// Decoder transposed convolutions `hidden_5..hidden_8`
///
/// The `prediction` layer after them is a 1x1 projection to `history_length`
/// channels.
pub const DECODER_LAYERS: [LayerSpec; 4] = [
    LayerSpec::new(3, 1, 16),
    LayerSpec::new(3, 1, 64),
    LayerSpec::new(4, 2, 64),
    LayerSpec::new(8, 4, 32),
];

/// Number of trainable arrays: a weight and a bias for each of the nine layers
pub const NUM_PARAMETERS: usize = 2 * (ENCODER_LAYERS.len() + DECODER_LAYERS.len() + 1);

/// Spatial size of the last encoder map, or `None` if a layer would produce an
/// empty map
pub fn encoded_dims(height: usize, width: usize) -> Option<(usize, usize)> {
    let conv = |size: usize, layer: &LayerSpec| {
        (size >= layer.kernel).then(|| (size - layer.kernel) / layer.stride + 1)
    };
    ENCODER_LAYERS
        .iter()
        .try_fold((height, width), |(h, w), layer| Some((conv(h, layer)?, conv(w, layer)?)))
}

/// Spatial size the decoder produces from an encoder map of `height x width`
pub fn decoded_dims(height: usize, width: usize) -> (usize, usize) {
    let deconv = |size: usize, layer: &LayerSpec| (size - 1) * layer.stride + layer.kernel;
    DECODER_LAYERS
        .iter()
        .fold((height, width), |(h, w), layer| (deconv(h, layer), deconv(w, layer)))
}

/// Configuration for the autoencoder network
#[derive(Debug, Clone)]
pub struct AutoencoderConfig {
    /// Number of stacked input frames; also the number of reconstructed channels
    pub history_length: usize,
}

impl AutoencoderConfig {
    pub fn new(history_length: usize) -> Self {
        Self { history_length }
    }

    /// Initialize a fresh, randomly initialized network
    ///
    /// ```rust
    /// use deep_fqi_extractor::extractor::AutoencoderConfig;
    /// use burn::backend::NdArray;
    /// use burn::backend::ndarray::NdArrayDevice;
    /// use burn::tensor::Tensor;
    ///
    /// let device = NdArrayDevice::default();
    /// let network = AutoencoderConfig::new(4).init::<NdArray<f32>>(&device);
    ///
    /// let frames = Tensor::zeros([2, 4, 84, 84], &device);
    /// assert_eq!(network.encode(frames.clone()).dims(), [2, 400]);
    /// assert_eq!(network.forward(frames).dims(), [2, 4, 84, 84]);
    /// ```
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvAutoencoder<B> {
        let [l1, l2, l3, l4] = ENCODER_LAYERS;
        let [l5, l6, l7, l8] = DECODER_LAYERS;

        ConvAutoencoder {
            hidden_1: conv(self.history_length, l1, device),
            hidden_2: conv(l1.channels, l2, device),
            hidden_3: conv(l2.channels, l3, device),
            hidden_4: conv(l3.channels, l4, device),
            hidden_5: deconv(l4.channels, l5, device),
            hidden_6: deconv(l5.channels, l6, device),
            hidden_7: deconv(l6.channels, l7, device),
            hidden_8: deconv(l7.channels, l8, device),
            prediction: deconv(
                l8.channels,
                LayerSpec::new(1, 1, self.history_length),
                device,
            ),
        }
    }
}

/// Glorot uniform initializer for a (transposed) convolution
///
/// Fan-in is `in_channels * k²`, fan-out `out_channels * k²`.
pub fn glorot_uniform(in_channels: usize, layer: &LayerSpec) -> Initializer {
    let receptive_field = layer.kernel * layer.kernel;
    let fan_sum = ((in_channels + layer.channels) * receptive_field) as f64;
    let bound = (6.0 / fan_sum).sqrt();
    Initializer::Uniform {
        min: -bound,
        max: bound,
    }
}

fn conv<B: Backend>(in_channels: usize, layer: LayerSpec, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, layer.channels], [layer.kernel; 2])
        .with_stride([layer.stride; 2])
        .with_initializer(glorot_uniform(in_channels, &layer))
        .init(device)
}

fn deconv<B: Backend>(
    in_channels: usize,
    layer: LayerSpec,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([in_channels, layer.channels], [layer.kernel; 2])
        .with_stride([layer.stride; 2])
        .with_initializer(glorot_uniform(in_channels, &layer))
        .init(device)
}

impl From<&ExtractorConfig> for AutoencoderConfig {
    fn from(config: &ExtractorConfig) -> Self {
        Self::new(config.history_length)
    }
}

/// Encoder/decoder network
///
/// Field order is the declaration order used by [`ConvAutoencoder::parameters`].
#[derive(Module, Debug)]
pub struct ConvAutoencoder<B: Backend> {
    hidden_1: Conv2d<B>,
    hidden_2: Conv2d<B>,
    hidden_3: Conv2d<B>,
    hidden_4: Conv2d<B>,
    hidden_5: ConvTranspose2d<B>,
    hidden_6: ConvTranspose2d<B>,
    hidden_7: ConvTranspose2d<B>,
    hidden_8: ConvTranspose2d<B>,
    prediction: ConvTranspose2d<B>,
}

type LayerParams<'a, B> = (&'a Param<Tensor<B, 4>>, Option<&'a Param<Tensor<B, 1>>>);
type LayerParamsMut<'a, B> = (&'a mut Param<Tensor<B, 4>>, Option<&'a mut Param<Tensor<B, 1>>>);

impl<B: Backend> ConvAutoencoder<B> {
    /// Latent features for a channel-first batch `[batch, N, H, W]`
    ///
    /// Returns `[batch, latent_dim]`.
    pub fn encode(&self, frames: Tensor<B, 4>) -> Tensor<B, 2> {
        flatten_channel_last(self.encode_map(frames))
    }

    /// Reconstruction for a channel-first batch, values in (0, 1)
    pub fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 4> {
        let map = self.encode_map(frames);
        let [_, _, height, width] = map.dims();
        let latent = flatten_channel_last(map);
        self.decode(latent, [height, width])
    }

    /// Decode latent vectors produced for an encoder map of `map_dims` (height, width)
    ///
    /// # Panics
    ///
    /// If `latent` does not hold `height * width * 16` features per row, i.e. it
    /// was not produced by [`Self::encode`] for frames with that encoder map.
    pub fn decode(&self, latent: Tensor<B, 2>, map_dims: [usize; 2]) -> Tensor<B, 4> {
        let [batch, _] = latent.dims();
        let [height, width] = map_dims;
        let [channels, ..] = self.hidden_5.weight.val().dims();

        let x = latent
            .reshape([batch, height, width, channels])
            .permute([0, 3, 1, 2]);
        let x = relu(self.hidden_5.forward(x));
        let x = relu(self.hidden_6.forward(x));
        let x = relu(self.hidden_7.forward(x));
        let x = relu(self.hidden_8.forward(x));
        sigmoid(self.prediction.forward(x))
    }

    fn encode_map(&self, frames: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.hidden_1.forward(frames));
        let x = relu(self.hidden_2.forward(x));
        let x = relu(self.hidden_3.forward(x));
        relu(self.hidden_4.forward(x))
    }

    fn layers(&self) -> [LayerParams<'_, B>; 9] {
        [
            (&self.hidden_1.weight, self.hidden_1.bias.as_ref()),
            (&self.hidden_2.weight, self.hidden_2.bias.as_ref()),
            (&self.hidden_3.weight, self.hidden_3.bias.as_ref()),
            (&self.hidden_4.weight, self.hidden_4.bias.as_ref()),
            (&self.hidden_5.weight, self.hidden_5.bias.as_ref()),
            (&self.hidden_6.weight, self.hidden_6.bias.as_ref()),
            (&self.hidden_7.weight, self.hidden_7.bias.as_ref()),
            (&self.hidden_8.weight, self.hidden_8.bias.as_ref()),
            (&self.prediction.weight, self.prediction.bias.as_ref()),
        ]
    }

    fn layers_mut(&mut self) -> [LayerParamsMut<'_, B>; 9] {
        [
            (&mut self.hidden_1.weight, self.hidden_1.bias.as_mut()),
            (&mut self.hidden_2.weight, self.hidden_2.bias.as_mut()),
            (&mut self.hidden_3.weight, self.hidden_3.bias.as_mut()),
            (&mut self.hidden_4.weight, self.hidden_4.bias.as_mut()),
            (&mut self.hidden_5.weight, self.hidden_5.bias.as_mut()),
            (&mut self.hidden_6.weight, self.hidden_6.bias.as_mut()),
            (&mut self.hidden_7.weight, self.hidden_7.bias.as_mut()),
            (&mut self.hidden_8.weight, self.hidden_8.bias.as_mut()),
            (&mut self.prediction.weight, self.prediction.bias.as_mut()),
        ]
    }

    /// Shapes of all trainable arrays, in [`Self::parameters`] order
    pub fn parameter_shapes(&self) -> Vec<Vec<usize>> {
        let mut shapes = Vec::with_capacity(NUM_PARAMETERS);
        for (weight, bias) in self.layers() {
            shapes.push(weight.val().dims().to_vec());
            if let Some(bias) = bias {
                shapes.push(bias.val().dims().to_vec());
            }
        }
        shapes
    }

    /// Current values of all trainable arrays
    ///
    /// Order: for each layer `hidden_1 .. hidden_8, prediction` the weight, then
    /// the bias. Convolution weights are `[out, in, kh, kw]`, transposed
    /// convolution weights `[in, out, kh, kw]`.
    pub fn parameters(&self) -> Vec<TensorData> {
        let mut values = Vec::with_capacity(NUM_PARAMETERS);
        for (weight, bias) in self.layers() {
            values.push(weight.val().into_data());
            if let Some(bias) = bias {
                values.push(bias.val().into_data());
            }
        }
        values
    }

    /// Overwrite all trainable arrays positionally
    ///
    /// The count and every shape are checked before the first parameter is
    /// replaced, so a rejected call leaves the network untouched. Parameter ids
    /// are kept, which keeps optimizer state attached to its parameter.
    pub fn set_parameters(&mut self, weights: Vec<TensorData>, device: &B::Device) -> Result<()> {
        let expected = self.parameter_shapes();
        if weights.len() != expected.len() {
            return Err(ExtractorError::WeightCount {
                expected: expected.len(),
                actual: weights.len(),
            });
        }
        for (index, (data, shape)) in weights.iter().zip(&expected).enumerate() {
            if data.shape != *shape {
                return Err(ExtractorError::WeightShape {
                    index,
                    expected: shape.clone(),
                    actual: data.shape.clone(),
                });
            }
        }

        let mut weights = weights.into_iter();
        for (weight, bias) in self.layers_mut() {
            if let Some(data) = weights.next() {
                *weight = replace_param(weight, data, device);
            }
            if let Some(bias) = bias {
                if let Some(data) = weights.next() {
                    *bias = replace_param(bias, data, device);
                }
            }
        }
        Ok(())
    }
}

fn replace_param<B: Backend, const D: usize>(
    param: &Param<Tensor<B, D>>,
    data: TensorData,
    device: &B::Device,
) -> Param<Tensor<B, D>> {
    Param::initialized(param.id, Tensor::from_data(data, device).require_grad())
}

fn flatten_channel_last<B: Backend>(map: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = map.dims();
    map.permute([0, 2, 3, 1])
        .reshape([batch, height * width * channels])
}
