//! Boundary traits for the pipeline's external collaborators.
//!
//! These traits are the seams between the threading core and the
//! pluggable pieces around it: where frames come from, how they are
//! upscaled and filtered, and where they go. Every implementation must
//! be `Send + 'static` because each stage owns its collaborator on a
//! dedicated thread.

use crate::core::types::Frame;
use crate::error::Result;

// ─── Source (capture's upstream) ─────────────────────────────────────────

/// Outcome of one frame acquisition attempt.
#[derive(Debug)]
pub enum SourceStatus {
    /// A frame was produced.
    Ready(Frame),
    /// Transient failure; the capture stage sleeps briefly and retries.
    Retry,
    /// Terminal end-of-stream; triggers orderly pipeline shutdown.
    Exhausted,
}

/// Produces raw frames for the capture stage.
///
/// Implementations: synthetic pattern generators, image-sequence
/// readers, camera/decoder front-ends.
pub trait FrameSource: Send + 'static {
    /// Acquire the next frame, or report why one is not available.
    fn next_frame(&mut self) -> SourceStatus;
}

// ─── Upscaler ────────────────────────────────────────────────────────────

/// Scales a frame to the configured target resolution.
///
/// On success the output dimensions match the target exactly. On failure
/// the process stage substitutes a deterministic fallback resize; the
/// failure must be observable, never a crash.
pub trait FrameUpscaler: Send + 'static {
    fn upscale(&mut self, frame: &Frame) -> Result<Frame>;

    /// Whether this instance runs on an accelerated (GPU) backend.
    fn is_gpu(&self) -> bool {
        false
    }

    /// Target `(width, height)` this upscaler was constructed for.
    fn target(&self) -> (u32, u32);
}

// ─── Filter stages ───────────────────────────────────────────────────────

/// One link of the post-upscale filter chain.
///
/// A failing filter is skipped: the stage passes the unmodified input
/// forward rather than stalling the pipeline.
pub trait FrameFilter: Send + 'static {
    /// Short stable name used in logs and perf events.
    fn name(&self) -> &'static str;

    fn process(&mut self, frame: &Frame) -> Result<Frame>;
}

// ─── Output sink ─────────────────────────────────────────────────────────

/// Receives finished frames from the display stage.
///
/// Implementations: recording writers, preview windows, test collectors.
pub trait OutputSink: Send + 'static {
    /// Consume one finished frame.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flip persistent recording on/off. Default: ignored.
    fn toggle_recording(&mut self) {}

    /// Persist a single frame out-of-band. Default: ignored.
    fn snapshot(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    /// Flush buffered output and finalize the stream.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
