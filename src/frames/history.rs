//! Frame history stacked channel-last

use std::collections::VecDeque;

use super::bouncing_ball::Frame;

/// The last `capacity` frames, oldest first
#[derive(Debug, Clone)]
pub struct FrameHistory {
    capacity: usize,
    frames: VecDeque<Frame>,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    /// Add the newest frame, evicting the oldest when full
    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    /// Stack as `[height, width, capacity]`, channel `0` being the oldest frame
    ///
    /// Returns `None` until the history is full.
    pub fn stack(&self) -> Option<Vec<f32>> {
        if !self.is_full() {
            return None;
        }
        let first = self.frames.front()?;
        let pixels = first.height * first.width;

        let mut stacked = Vec::with_capacity(pixels * self.capacity);
        for pixel in 0..pixels {
            stacked.extend(self.frames.iter().map(|frame| frame.pixels[pixel]));
        }
        Some(stacked)
    }
}
