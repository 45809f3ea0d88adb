//! Frame sources and output sinks.

pub mod sink;
pub mod source;

pub use sink::{NullSink, PipelineCommand, RecordingSink};
pub use source::{ImageSequenceSource, SyntheticSource};
