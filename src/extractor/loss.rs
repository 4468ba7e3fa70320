//! Reconstruction loss

use burn::tensor::{Tensor, backend::Backend};

/// Mean elementwise sigmoid cross-entropy of `logits` against `labels`
///
/// Uses the overflow-free form `max(x, 0) - x * z + ln(1 + exp(-|x|))`.
/// The extractor feeds its sigmoid-activated reconstruction in as `logits`,
/// matching how the pretrained extractors were optimized.
pub fn sigmoid_cross_entropy<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    labels: Tensor<B, D>,
) -> Tensor<B, 1> {
    let softplus_tail = logits.clone().abs().neg().exp().log1p();
    (logits.clone().clamp_min(0.0) - logits * labels + softplus_tail).mean()
}
