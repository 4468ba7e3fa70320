//! Training statistics tracking for the extractor
//!
//! Keeps a rolling window of recent reconstruction losses next to the total
//! number of fit steps, for periodic progress logging.

use std::collections::VecDeque;

/// Training statistics tracker with a rolling loss average
///
/// # Example
///
/// ```rust
/// use deep_fqi_extractor::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_loss(0.69);
/// stats.record_loss(0.65);
///
/// assert_eq!(stats.total_steps(), 2);
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Recent losses (rolling window)
    losses: VecDeque<f32>,

    /// Lowest loss seen so far
    best_loss: Option<f32>,

    /// Total number of fit steps recorded
    total_steps: usize,

    /// Window size for the rolling average
    window_size: usize,
}

impl TrainingStats {
    /// Create a tracker averaging over the last `window_size` losses
    pub fn new(window_size: usize) -> Self {
        Self {
            losses: VecDeque::with_capacity(window_size),
            best_loss: None,
            total_steps: 0,
            window_size,
        }
    }

    /// Record the loss of one fit step
    ///
    /// # Example
    ///
    /// ```rust
    /// use deep_fqi_extractor::metrics::TrainingStats;
    ///
    /// let mut stats = TrainingStats::new(10);
    /// stats.record_loss(0.5);
    ///
    /// assert!((stats.mean_loss() - 0.5).abs() < 1e-6);
    /// ```
    pub fn record_loss(&mut self, loss: f32) {
        if self.losses.len() >= self.window_size {
            self.losses.pop_front();
        }
        self.losses.push_back(loss);
        self.best_loss = Some(self.best_loss.map_or(loss, |best| best.min(loss)));
        self.total_steps += 1;
    }

    /// Mean loss over the rolling window, or 0.0 if nothing was recorded
    pub fn mean_loss(&self) -> f32 {
        if self.losses.is_empty() {
            0.0
        } else {
            self.losses.iter().sum::<f32>() / self.losses.len() as f32
        }
    }

    /// Most recently recorded loss
    pub fn last_loss(&self) -> Option<f32> {
        self.losses.back().copied()
    }

    pub fn best_loss(&self) -> Option<f32> {
        self.best_loss
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary, e.g. `Steps: 100 | Loss: 0.6931 | Last: 0.6812 | Best: 0.6790`
    pub fn format_summary(&self) -> String {
        format!(
            "Steps: {} | Loss: {:.4} | Last: {:.4} | Best: {:.4}",
            self.total_steps,
            self.mean_loss(),
            self.last_loss().unwrap_or(0.0),
            self.best_loss.unwrap_or(0.0),
        )
    }
}
