//! Shared cross-thread pipeline state.
//!
//! One [`PipelineContext`] per pipeline instance, passed by `Arc` to
//! every stage. No process-wide statics, so multiple pipelines can
//! coexist in one process (and in one test binary).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

/// Atomic flags and counters shared by all stages of one pipeline.
#[derive(Debug)]
pub struct PipelineContext {
    shutdown: AtomicBool,
    /// Frames accepted into the raw queue.
    pub frames_captured: AtomicU64,
    /// Frames that exited the process stage.
    pub frames_processed: AtomicU64,
    /// Frames handed to the output sink.
    pub frames_displayed: AtomicU64,
    /// Frames dropped by admission control or non-blocking pushes.
    pub frames_dropped: AtomicU64,
    /// End-to-end latency EMA, f64 milliseconds stored as bits.
    latency_ms_bits: AtomicU64,
    /// Capture-rate estimate, f64 FPS stored as bits.
    fps_bits: AtomicU64,
}

impl PipelineContext {
    /// Fresh context with all counters zeroed and shutdown cleared.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shutdown: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_displayed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            latency_ms_bits: AtomicU64::new(0f64.to_bits()),
            fps_bits: AtomicU64::new(0f64.to_bits()),
        })
    }

    /// Request cooperative shutdown. Queue waiters are woken separately
    /// by the orchestrator; stages observe this flag at loop tops and at
    /// every blocking wait.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Fold one end-to-end latency sample into the moving average
    /// (90% old, 10% new). Single writer: the display stage.
    pub fn update_latency_ms(&self, sample_ms: f64) {
        let current = f64::from_bits(self.latency_ms_bits.load(Ordering::Relaxed));
        let updated = if current == 0.0 {
            sample_ms
        } else {
            current * 0.9 + sample_ms * 0.1
        };
        self.latency_ms_bits.store(updated.to_bits(), Ordering::Relaxed);
    }

    /// Smoothed end-to-end latency in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        f64::from_bits(self.latency_ms_bits.load(Ordering::Relaxed))
    }

    /// Publish the capture-rate estimate. Single writer: the capture stage.
    pub fn set_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    /// Most recent capture-rate estimate in frames per second.
    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    /// Ordering invariant: frames only ever leave the pipeline.
    /// Should hold at shutdown.
    pub fn validate_counts(&self) -> bool {
        let c = self.frames_captured.load(Ordering::Acquire);
        let p = self.frames_processed.load(Ordering::Acquire);
        let d = self.frames_displayed.load(Ordering::Acquire);
        c >= p && p >= d
    }

    /// Log a one-line summary of the run so far.
    pub fn report(&self) {
        info!(
            captured = self.frames_captured.load(Ordering::Relaxed),
            processed = self.frames_processed.load(Ordering::Relaxed),
            displayed = self.frames_displayed.load(Ordering::Relaxed),
            dropped = self.frames_dropped.load(Ordering::Relaxed),
            latency_ms = format!("{:.2}", self.latency_ms()),
            fps = format!("{:.1}", self.fps()),
            "Pipeline counters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_flag_round_trip() {
        let ctx = PipelineContext::new();
        assert!(!ctx.is_shutdown());
        ctx.request_shutdown();
        assert!(ctx.is_shutdown());
    }

    #[test]
    fn latency_ema_seeds_then_smooths() {
        let ctx = PipelineContext::new();
        ctx.update_latency_ms(10.0);
        assert!((ctx.latency_ms() - 10.0).abs() < 1e-9);

        ctx.update_latency_ms(20.0);
        assert!((ctx.latency_ms() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn count_ordering_invariant() {
        let ctx = PipelineContext::new();
        ctx.frames_captured.store(10, Ordering::Release);
        ctx.frames_processed.store(8, Ordering::Release);
        ctx.frames_displayed.store(8, Ordering::Release);
        assert!(ctx.validate_counts());

        ctx.frames_displayed.store(11, Ordering::Release);
        assert!(!ctx.validate_counts());
    }
}
