//! Synthetic Atari-like frames
//!
//! A ball bounces inside the frame while a paddle on the bottom row follows it.
//! Frames are grayscale with pixels in [0, 1] (1.0 for ball and paddle).

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Side length of the square ball in pixels
pub const BALL_SIZE: usize = 3;

/// A single grayscale frame, row-major `[height, width]`
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<f32>,
}

impl Frame {
    /// All-black frame
    pub fn blank(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            pixels: vec![0.0; height * width],
        }
    }

    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.pixels[y * self.width + x]
    }

    fn fill(&mut self, y: usize, x: usize, h: usize, w: usize) {
        for row in y..(y + h).min(self.height) {
            let start = row * self.width + x.min(self.width);
            let end = row * self.width + (x + w).min(self.width);
            self.pixels[start..end].fill(1.0);
        }
    }
}

/// Deterministic-given-seed frame generator
#[derive(Debug, Clone)]
pub struct BouncingBall {
    height: usize,
    width: usize,
    paddle_width: usize,
    position: (f32, f32),
    velocity: (f32, f32),
    rng: StdRng,
}

impl BouncingBall {
    /// Create a generator for `height × width` frames
    ///
    /// Frames smaller than the ball plus the paddle row are allowed; the ball and
    /// paddle are then clipped to the frame, and an empty frame stays blank.
    pub fn new(height: usize, width: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bottom = Self::max_y(height);
        let right = Self::max_x(width);
        let position = (rng.gen_range(0.0..=bottom), rng.gen_range(0.0..=right));
        let velocity = Self::random_velocity(&mut rng);

        Self {
            height,
            width,
            paddle_width: (width / 6).max(BALL_SIZE),
            position,
            velocity,
            rng,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Ball top-left corner as `(y, x)`
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    /// Advance one tick and render the resulting frame
    pub fn next_frame(&mut self) -> Frame {
        self.advance();
        self.render()
    }

    /// Render the current state without advancing
    pub fn render(&self) -> Frame {
        let mut frame = Frame::blank(self.height, self.width);

        let (y, x) = self.position;
        frame.fill(y.round() as usize, x.round() as usize, BALL_SIZE, BALL_SIZE);

        if let Some(bottom_row) = self.height.checked_sub(1) {
            let ball_center = x.round() as usize + BALL_SIZE / 2;
            let paddle_x = ball_center
                .saturating_sub(self.paddle_width / 2)
                .min(self.width.saturating_sub(self.paddle_width));
            frame.fill(bottom_row, paddle_x, 1, self.paddle_width);
        }

        frame
    }

    fn advance(&mut self) {
        let bottom = Self::max_y(self.height);
        let right = Self::max_x(self.width);
        let (mut y, mut x) = (self.position.0 + self.velocity.0, self.position.1 + self.velocity.1);

        if y < 0.0 || y > bottom {
            y = y.clamp(0.0, bottom);
            self.velocity.0 = -self.velocity.0;
        }
        if x < 0.0 || x > right {
            x = x.clamp(0.0, right);
            self.velocity.1 = -self.velocity.1;
        }
        // the paddle returns the ball at a slightly different angle
        if y >= bottom {
            self.velocity.1 += self.rng.gen_range(-0.5..=0.5);
            self.velocity.1 = self.velocity.1.clamp(-3.0, 3.0);
        }

        self.position = (y, x);
    }

    fn random_velocity(rng: &mut StdRng) -> (f32, f32) {
        (Self::random_speed(rng), Self::random_speed(rng))
    }

    fn random_speed(rng: &mut StdRng) -> f32 {
        let magnitude = rng.gen_range(1.0..=2.5);
        if rng.gen_bool(0.5) { magnitude } else { -magnitude }
    }

    // the ball never overlaps the paddle row
    fn max_y(height: usize) -> f32 {
        height.saturating_sub(BALL_SIZE + 1) as f32
    }

    fn max_x(width: usize) -> f32 {
        width.saturating_sub(BALL_SIZE) as f32
    }
}
