//! Frame upscalers.
//!
//! Two CPU implementations sit behind [`FrameUpscaler`]: a plain bicubic
//! resize and a detail-enhanced variant used for the super-resolution
//! setting when no accelerated backend exists. Selection happens once at
//! pipeline start in [`create_upscaler`]; a GPU request degrades to the
//! CPU path with a warning rather than failing startup.

use image::imageops::{self, FilterType};

use tracing::warn;

use crate::core::collaborators::FrameUpscaler;
use crate::core::config::{PipelineConfig, UpscaleAlgorithm};
use crate::core::types::Frame;
use crate::error::{EngineError, Result};

/// Build the upscaler the configuration asks for.
pub fn create_upscaler(config: &PipelineConfig) -> Box<dyn FrameUpscaler> {
    if config.use_gpu {
        warn!("no accelerated backend available, using CPU upscaler");
    }
    match config.algorithm {
        UpscaleAlgorithm::Bicubic => {
            Box::new(ResizeUpscaler::new(config.target_width, config.target_height))
        }
        UpscaleAlgorithm::SuperRes => {
            Box::new(DetailUpscaler::new(config.target_width, config.target_height))
        }
    }
}

/// Deterministic nearest-neighbor resize used when the configured
/// upscaler fails on a frame. Infallible so the process stage always
/// has an output to hand forward.
pub fn fallback_resize(frame: &Frame, width: u32, height: u32) -> Frame {
    let src = frame.pixels();
    let (sh, sw, _) = src.dim();
    let (th, tw) = (height as usize, width as usize);

    let data = ndarray::Array3::from_shape_fn((th, tw, 3), |(y, x, c)| {
        if sh == 0 || sw == 0 {
            0
        } else {
            let sy = (y * sh / th).min(sh - 1);
            let sx = (x * sw / tw).min(sw - 1);
            src[[sy, sx, c]]
        }
    });

    let mut out = Frame::new(data, frame.index);
    out.captured_at = frame.captured_at;
    out
}

fn resize_bicubic(frame: &Frame, width: u32, height: u32) -> Result<Frame> {
    if frame.is_empty() {
        return Err(EngineError::EmptyFrame);
    }
    let resized = imageops::resize(&frame.to_rgb_image(), width, height, FilterType::CatmullRom);
    let mut out = Frame::from_rgb_image(&resized, frame.index)?;
    out.captured_at = frame.captured_at;
    Ok(out)
}

/// Plain bicubic resize to a fixed target resolution.
#[derive(Clone, Copy, Debug)]
pub struct ResizeUpscaler {
    width: u32,
    height: u32,
}

impl ResizeUpscaler {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameUpscaler for ResizeUpscaler {
    fn upscale(&mut self, frame: &Frame) -> Result<Frame> {
        resize_bicubic(frame, self.width, self.height)
    }

    fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Bicubic resize followed by an unsharp detail pass. Stands in for the
/// super-resolution path on machines without an accelerated backend.
#[derive(Clone, Copy, Debug)]
pub struct DetailUpscaler {
    width: u32,
    height: u32,
    /// Unsharp gain applied after the resize.
    detail_gain: f32,
}

impl DetailUpscaler {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            detail_gain: 0.4,
        }
    }
}

impl FrameUpscaler for DetailUpscaler {
    fn upscale(&mut self, frame: &Frame) -> Result<Frame> {
        let resized = resize_bicubic(frame, self.width, self.height)?;
        let src = resized.pixels();
        let (h, w, _) = src.dim();

        // Unsharp: amplify the residual against the 4-neighbor mean.
        let data = ndarray::Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
            let up = src[[y.saturating_sub(1), x, c]] as f32;
            let down = src[[(y + 1).min(h - 1), x, c]] as f32;
            let left = src[[y, x.saturating_sub(1), c]] as f32;
            let right = src[[y, (x + 1).min(w - 1), c]] as f32;
            let center = src[[y, x, c]] as f32;
            let residual = center - (up + down + left + right) / 4.0;
            (center + residual * self.detail_gain)
                .round()
                .clamp(0.0, 255.0) as u8
        });

        let mut out = Frame::new(data, frame.index);
        out.captured_at = frame.captured_at;
        Ok(out)
    }

    fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
