//! The three pipeline stage loops.
//!
//! Each loop runs on its own dedicated thread and owns its collaborator
//! outright. Shutdown cascades front to back: capture stops producing
//! and closes the raw queue, process drains it and closes the processed
//! queue, display drains that and flushes the sink. Every blocking wait
//! sits on an interruptible queue, so the orchestrator can always join.

use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::collaborators::{FrameFilter, FrameSource, FrameUpscaler, OutputSink, SourceStatus};
use crate::core::config::PipelineConfig;
use crate::core::context::PipelineContext;
use crate::engine::perf::PerfTimer;
use crate::engine::queue::BoundedFrameQueue;
use crate::engine::temporal::TemporalBlender;
use crate::filters::upscale::fallback_resize;
use crate::io::sink::PipelineCommand;

/// Pause between acquisition attempts after a transient source failure.
const RETRY_SLEEP: Duration = Duration::from_millis(5);
/// Display idle poll interval while the processed queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Processed frames between progress log lines.
const PROGRESS_INTERVAL: u64 = 100;

/// Capture loop: pull frames from the source and feed the raw queue,
/// shedding load at the admission boundary when the queue runs hot.
pub(crate) fn run_capture(
    mut source: Box<dyn FrameSource>,
    raw: Arc<BoundedFrameQueue>,
    ctx: Arc<PipelineContext>,
    perf: Arc<PerfTimer>,
    cfg: PipelineConfig,
) {
    let backoff = Duration::from_millis(cfg.capture_backoff_ms);
    let mut window_start = Instant::now();
    let mut window_frames = 0u64;

    while !ctx.is_shutdown() {
        let start = Instant::now();
        match source.next_frame() {
            SourceStatus::Ready(frame) => {
                perf.record("capture", start.elapsed());

                // Admission control: above the high-water mark the frame
                // is dropped instead of blocking the source.
                if raw.utilization() >= cfg.high_water_mark {
                    ctx.frames_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(
                        occupancy = raw.size(),
                        capacity = raw.capacity(),
                        "raw queue hot, dropping captured frame"
                    );
                    thread::sleep(backoff);
                } else if raw.push(frame, true) {
                    ctx.frames_captured
                        .fetch_add(1, Ordering::Relaxed);
                    window_frames += 1;
                }

                let elapsed = window_start.elapsed();
                if elapsed >= Duration::from_secs(1) {
                    ctx.set_fps(window_frames as f64 / elapsed.as_secs_f64());
                    window_start = Instant::now();
                    window_frames = 0;
                }
            }
            SourceStatus::Retry => thread::sleep(RETRY_SLEEP),
            SourceStatus::Exhausted => {
                info!("frame source exhausted, requesting shutdown");
                ctx.request_shutdown();
                break;
            }
        }
    }

    // Let the process stage drain what is buffered, then observe None.
    raw.shutdown();
    debug!("capture stage exited");
}

/// Process loop: upscale, run the filter chain, temporally blend, and
/// hand off to the processed queue. Per-frame collaborator failures
/// degrade the frame, never the pipeline.
pub(crate) fn run_process(
    mut upscaler: Box<dyn FrameUpscaler>,
    mut filters: Vec<Box<dyn FrameFilter>>,
    mut blender: TemporalBlender,
    raw: Arc<BoundedFrameQueue>,
    processed: Arc<BoundedFrameQueue>,
    ctx: Arc<PipelineContext>,
    perf: Arc<PerfTimer>,
    cfg: PipelineConfig,
) {
    let backoff = Duration::from_millis(cfg.capture_backoff_ms);

    while let Some(frame) = raw.pop(true) {
        let mut working = match perf.time("upscale", || upscaler.upscale(&frame)) {
            Ok(upscaled) => upscaled,
            Err(err) => {
                warn!(error = %err, frame = frame.index, "upscale failed, using fallback resize");
                fallback_resize(&frame, cfg.target_width, cfg.target_height)
            }
        };

        for filter in filters.iter_mut() {
            match perf.time(filter.name(), || filter.process(&working)) {
                Ok(filtered) => working = filtered,
                Err(err) => {
                    warn!(error = %err, filter = filter.name(), "filter failed, skipping");
                }
            }
        }

        let blended = perf.time("temporal_blend", || blender.process(working));

        let count = ctx
            .frames_processed
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        if count % PROGRESS_INTERVAL == 0 {
            info!(
                processed = count,
                blend_state = ?blender.state(),
                "processing progress"
            );
        }

        // One backoff retry, then shed the frame rather than stall the
        // blender's input side.
        if !processed.push(blended.clone(), false) {
            thread::sleep(backoff);
            if !processed.push(blended, false) && !ctx.is_shutdown() {
                ctx.frames_dropped
                    .fetch_add(1, Ordering::Relaxed);
                debug!("processed queue full, dropping frame");
            }
        }
    }

    processed.shutdown();
    debug!("process stage exited");
}

/// Display loop: drain the processed queue into the sink, pace output to
/// the configured ceiling, track end-to-end latency, and service
/// control commands.
pub(crate) fn run_display(
    mut sink: Box<dyn OutputSink>,
    processed: Arc<BoundedFrameQueue>,
    ctx: Arc<PipelineContext>,
    perf: Arc<PerfTimer>,
    cfg: PipelineConfig,
    commands: Receiver<PipelineCommand>,
) {
    let min_interval = if cfg.max_display_fps > 0 {
        Some(Duration::from_secs_f64(1.0 / cfg.max_display_fps as f64))
    } else {
        None
    };
    let mut last_present: Option<Instant> = None;
    let mut snapshot_pending = false;

    loop {
        while let Ok(command) = commands.try_recv() {
            match command {
                PipelineCommand::Quit => {
                    info!("quit command received");
                    ctx.request_shutdown();
                }
                PipelineCommand::ToggleRecording => sink.toggle_recording(),
                PipelineCommand::Snapshot => snapshot_pending = true,
            }
        }

        match processed.pop(false) {
            Some(frame) => {
                if let (Some(interval), Some(last)) = (min_interval, last_present) {
                    let since = last.elapsed();
                    if since < interval {
                        thread::sleep(interval - since);
                    }
                }

                let start = Instant::now();
                if snapshot_pending {
                    snapshot_pending = false;
                    if let Err(err) = sink.snapshot(&frame) {
                        warn!(error = %err, "snapshot failed");
                    }
                }
                match sink.write(&frame) {
                    Ok(()) => {
                        ctx.frames_displayed
                            .fetch_add(1, Ordering::Relaxed);
                        let latency = frame.captured_at.elapsed();
                        ctx.update_latency_ms(latency.as_secs_f64() * 1e3);
                    }
                    Err(err) => warn!(error = %err, frame = frame.index, "sink write failed"),
                }
                perf.record("display", start.elapsed());
                last_present = Some(Instant::now());
            }
            None => {
                if processed.is_shutdown() {
                    break;
                }
                thread::sleep(IDLE_SLEEP);
            }
        }
    }

    if let Err(err) = sink.flush() {
        warn!(error = %err, "sink flush failed");
    }
    debug!("display stage exited");
}
