//! Edge-aware smoothing filter.
//!
//! Averages each pixel with the neighbors whose values are close to it,
//! so low-amplitude noise flattens out while hard edges stay put.

use ndarray::Array3;

use crate::core::collaborators::FrameFilter;
use crate::core::types::Frame;
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug)]
pub struct SmoothingFilter {
    radius: usize,
    /// Per-channel difference above which a neighbor is excluded.
    threshold: f32,
}

impl SmoothingFilter {
    pub fn new(radius: usize, threshold: f32) -> Self {
        Self {
            radius: radius.max(1),
            threshold: threshold.max(0.0),
        }
    }
}

impl FrameFilter for SmoothingFilter {
    fn name(&self) -> &'static str {
        "smoothing"
    }

    fn process(&mut self, frame: &Frame) -> Result<Frame> {
        if frame.is_empty() {
            return Err(EngineError::EmptyFrame);
        }
        let src = frame.pixels();
        let (h, w, _) = src.dim();
        let r = self.radius as isize;

        let data = Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
            let center = src[[y, x, c]] as f32;
            let mut sum = 0.0;
            let mut count = 0.0;
            for oy in -r..=r {
                for ox in -r..=r {
                    let ny = (y as isize + oy).clamp(0, h as isize - 1) as usize;
                    let nx = (x as isize + ox).clamp(0, w as isize - 1) as usize;
                    let value = src[[ny, nx, c]] as f32;
                    if (value - center).abs() <= self.threshold {
                        sum += value;
                        count += 1.0;
                    }
                }
            }
            (sum / count).round().clamp(0.0, 255.0) as u8
        });

        let mut out = Frame::new(data, frame.index);
        out.captured_at = frame.captured_at;
        Ok(out)
    }
}
