//! Upscalers and post-upscale enhancement filters.

pub mod sharpen;
pub mod smoothing;
pub mod upscale;

pub use sharpen::SharpenFilter;
pub use smoothing::SmoothingFilter;
pub use upscale::{DetailUpscaler, ResizeUpscaler};

use crate::core::collaborators::FrameFilter;

/// Default post-upscale chain: light denoise, then sharpen.
pub fn default_filter_chain() -> Vec<Box<dyn FrameFilter>> {
    vec![
        Box::new(SmoothingFilter::new(1, 12.0)),
        Box::new(SharpenFilter::new(0.3)),
    ]
}
