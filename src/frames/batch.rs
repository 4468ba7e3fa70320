//! Transition batches for autoencoder training

use burn::tensor::{Tensor, TensorData, backend::Backend};

use super::bouncing_ball::BouncingBall;
use super::history::FrameHistory;

/// Sample `batch_size` consecutive transitions from `generator`
///
/// Returns `(x, y)`, both `[batch_size, height, width, history_length]`; `y[i]` is
/// `x[i]` advanced by one frame. The generator keeps its state, so successive
/// calls continue the same trajectory.
pub fn transition_batch<B: Backend>(
    generator: &mut BouncingBall,
    history_length: usize,
    batch_size: usize,
    device: &B::Device,
) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let shape = [batch_size, generator.height(), generator.width(), history_length];

    let mut history = FrameHistory::new(history_length);
    while !history.is_full() {
        history.push(generator.next_frame());
    }

    let mut states = Vec::with_capacity(shape.iter().product());
    let mut next_states = Vec::with_capacity(shape.iter().product());
    for _ in 0..batch_size {
        states.extend(history.stack().unwrap_or_default());
        history.push(generator.next_frame());
        next_states.extend(history.stack().unwrap_or_default());
    }

    (
        Tensor::from_data(TensorData::new(states, shape), device),
        Tensor::from_data(TensorData::new(next_states, shape), device),
    )
}
