//! Pipeline orchestration and lifecycle.
//!
//! [`PipelineOrchestrator`] owns the queues, the shared context, and the
//! three stage threads. Lifecycle is strict: configuration is validated
//! before anything starts, structural settings are frozen while threads
//! are live, and `stop` always joins every thread before returning.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::core::collaborators::{FrameFilter, FrameSource, FrameUpscaler, OutputSink};
use crate::core::config::{PipelineConfig, TemporalConfig};
use crate::core::context::PipelineContext;
use crate::engine::perf::PerfTimer;
use crate::engine::queue::BoundedFrameQueue;
use crate::engine::stage;
use crate::engine::temporal::TemporalBlender;
use crate::error::{EngineError, Result};
use crate::filters::default_filter_chain;
use crate::filters::upscale::create_upscaler;
use crate::io::sink::PipelineCommand;

struct Running {
    raw: Arc<BoundedFrameQueue>,
    processed: Arc<BoundedFrameQueue>,
    handles: Vec<JoinHandle<()>>,
    command_tx: Sender<PipelineCommand>,
    temporal: Arc<Mutex<TemporalConfig>>,
}

/// Owns and supervises one capture/process/display pipeline.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    ctx: Arc<PipelineContext>,
    perf: Arc<PerfTimer>,
    running: Option<Running>,
}

impl PipelineOrchestrator {
    /// Validate the configuration and build an idle orchestrator.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ctx: PipelineContext::new(),
            perf: Arc::new(PerfTimer::new()),
            running: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared context handle; valid across start/stop cycles within the
    /// same run (a restart issues a fresh context).
    pub fn context(&self) -> Arc<PipelineContext> {
        self.ctx.clone()
    }

    pub fn perf(&self) -> Arc<PerfTimer> {
        self.perf.clone()
    }

    /// Start with the configured upscaler and the default filter chain.
    pub fn start(
        &mut self,
        source: Box<dyn FrameSource>,
        sink: Box<dyn OutputSink>,
    ) -> Result<()> {
        let upscaler = create_upscaler(&self.config);
        let filters = default_filter_chain();
        self.start_with(source, upscaler, filters, sink)
    }

    /// Start the three stage threads with explicit collaborators.
    pub fn start_with(
        &mut self,
        source: Box<dyn FrameSource>,
        upscaler: Box<dyn FrameUpscaler>,
        filters: Vec<Box<dyn FrameFilter>>,
        sink: Box<dyn OutputSink>,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.config.validate()?;

        // A previous run leaves the context flagged; restarts get a
        // fresh one so counters and shutdown state begin clean.
        if self.ctx.is_shutdown() {
            self.ctx = PipelineContext::new();
            self.perf.reset();
        }

        let raw = Arc::new(BoundedFrameQueue::new(self.config.raw_capacity));
        let processed = Arc::new(BoundedFrameQueue::new(self.config.processed_capacity));
        let (command_tx, command_rx) = mpsc::channel();

        let blender = TemporalBlender::new(self.config.temporal, self.config.flow);
        let temporal = blender.shared_config();

        let mut handles = Vec::with_capacity(3);

        handles.push(thread::Builder::new().name("capture".into()).spawn({
            let raw = raw.clone();
            let ctx = self.ctx.clone();
            let perf = self.perf.clone();
            let cfg = self.config.clone();
            move || stage::run_capture(source, raw, ctx, perf, cfg)
        })?);

        handles.push(thread::Builder::new().name("process".into()).spawn({
            let raw = raw.clone();
            let processed = processed.clone();
            let ctx = self.ctx.clone();
            let perf = self.perf.clone();
            let cfg = self.config.clone();
            move || stage::run_process(upscaler, filters, blender, raw, processed, ctx, perf, cfg)
        })?);

        handles.push(thread::Builder::new().name("display".into()).spawn({
            let processed = processed.clone();
            let ctx = self.ctx.clone();
            let perf = self.perf.clone();
            let cfg = self.config.clone();
            move || stage::run_display(sink, processed, ctx, perf, cfg, command_rx)
        })?);

        info!(
            target = format!("{}x{}", self.config.target_width, self.config.target_height),
            raw_capacity = self.config.raw_capacity,
            processed_capacity = self.config.processed_capacity,
            "pipeline started"
        );

        self.running = Some(Running {
            raw,
            processed,
            handles,
            command_tx,
            temporal,
        });
        Ok(())
    }

    /// Signal shutdown and join all threads. Idempotent: stopping an
    /// idle pipeline is a no-op.
    ///
    /// Joins cascade front to back. Capture exits on the shutdown flag
    /// and closes the raw queue; process drains it, then closes the
    /// processed queue; display drains that and flushes the sink. Frames
    /// already in flight are delivered, not lost.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        self.ctx.request_shutdown();

        let mut panicked = false;
        for handle in running.handles {
            if handle.join().is_err() {
                panicked = true;
            }
        }

        running.raw.clear();
        running.processed.clear();

        self.ctx.report();
        self.perf.report();

        if !self.ctx.validate_counts() {
            warn!("frame counters violate capture >= process >= display ordering");
        }
        if panicked {
            return Err(EngineError::Pipeline("a stage thread panicked".into()));
        }
        Ok(())
    }

    /// Block until the pipeline winds down on its own (source exhaustion
    /// or a quit command), then join the stages.
    pub fn wait(&mut self) -> Result<()> {
        while self.running.is_some() && !self.ctx.is_shutdown() {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        self.stop()
    }

    /// Sender for runtime control commands, while running.
    pub fn command_sender(&self) -> Option<Sender<PipelineCommand>> {
        self.running.as_ref().map(|r| r.command_tx.clone())
    }

    /// Change the output resolution. Rejected while threads are live.
    pub fn set_target_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if self.running.is_some() {
            return Err(EngineError::ReconfigureWhileRunning("target resolution"));
        }
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "target resolution {width}x{height} is invalid"
            )));
        }
        self.config.target_width = width;
        self.config.target_height = height;
        Ok(())
    }

    /// Change queue capacities. Rejected while threads are live.
    pub fn set_queue_capacities(&mut self, raw: usize, processed: usize) -> Result<()> {
        if self.running.is_some() {
            return Err(EngineError::ReconfigureWhileRunning("queue capacity"));
        }
        if raw == 0 || processed == 0 {
            return Err(EngineError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        self.config.raw_capacity = raw;
        self.config.processed_capacity = processed;
        Ok(())
    }

    /// Adjust blend strength, live if the pipeline is running. Clamped
    /// to `[0, 1]`.
    pub fn set_blend_strength(&mut self, strength: f32) {
        let strength = strength.clamp(0.0, 1.0);
        self.config.temporal.blend_strength = strength;
        if let Some(running) = &self.running {
            running.temporal.lock().unwrap().blend_strength = strength;
        }
    }

    /// Smoothed end-to-end latency in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.ctx.latency_ms()
    }

    /// Most recent capture-rate estimate.
    pub fn fps(&self) -> f64 {
        self.ctx.fps()
    }

    /// Current raw/processed queue occupancy, while running.
    pub fn queue_depths(&self) -> Option<(usize, usize)> {
        self.running
            .as_ref()
            .map(|r| (r.raw.size(), r.processed.size()))
    }

    /// Log the counter and perf summaries.
    pub fn print_stats(&self) {
        self.ctx.report();
        self.perf.report();
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        if self.running.is_some() {
            let _ = self.stop();
        }
    }
}
