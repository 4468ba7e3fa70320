//! Synthetic frame source for training and smoke tests
//!
//! Provides:
//! - Bouncing-ball frames with a paddle, deterministic given a seed
//! - Channel-last frame histories
//! - `(x, y)` transition batches on any burn backend

pub mod batch;
pub mod bouncing_ball;
pub mod history;

pub use batch::transition_batch;
pub use bouncing_ball::{BouncingBall, Frame};
pub use history::FrameHistory;
