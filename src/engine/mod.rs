//! Pipeline engine: bounded queues, motion estimation, temporal
//! blending, stage loops, and the orchestrator that owns them.

pub mod motion;
pub mod perf;
pub mod pipeline;
pub mod queue;
pub mod stage;
pub mod temporal;

pub use motion::MotionEstimator;
pub use perf::PerfTimer;
pub use pipeline::PipelineOrchestrator;
pub use queue::BoundedFrameQueue;
pub use temporal::{BlendState, TemporalBlender};
