//! Core contract types shared by every pipeline stage.

pub mod collaborators;
pub mod config;
pub mod context;
pub mod types;

pub use collaborators::{FrameFilter, FrameSource, FrameUpscaler, OutputSink, SourceStatus};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use types::{Frame, MotionField, PixelFormat, ReliabilityMask};
