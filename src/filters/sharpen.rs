//! Laplacian sharpening filter.

use ndarray::Array3;

use crate::core::collaborators::FrameFilter;
use crate::core::types::Frame;
use crate::error::{EngineError, Result};

/// Per-channel Laplacian sharpen with configurable gain.
#[derive(Clone, Copy, Debug)]
pub struct SharpenFilter {
    amount: f32,
}

impl SharpenFilter {
    /// `amount` of 0 is a no-op; typical values sit in `[0.2, 0.8]`.
    pub fn new(amount: f32) -> Self {
        Self {
            amount: amount.max(0.0),
        }
    }
}

impl FrameFilter for SharpenFilter {
    fn name(&self) -> &'static str {
        "sharpen"
    }

    fn process(&mut self, frame: &Frame) -> Result<Frame> {
        if frame.is_empty() {
            return Err(EngineError::EmptyFrame);
        }
        let src = frame.pixels();
        let (h, w, _) = src.dim();

        let data = Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
            let up = src[[y.saturating_sub(1), x, c]] as f32;
            let down = src[[(y + 1).min(h - 1), x, c]] as f32;
            let left = src[[y, x.saturating_sub(1), c]] as f32;
            let right = src[[y, (x + 1).min(w - 1), c]] as f32;
            let center = src[[y, x, c]] as f32;

            let laplacian = 4.0 * center - up - down - left - right;
            (center + self.amount * laplacian).round().clamp(0.0, 255.0) as u8
        });

        let mut out = Frame::new(data, frame.index);
        out.captured_at = frame.captured_at;
        Ok(out)
    }
}
