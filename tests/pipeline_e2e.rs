//! End-to-end pipeline runs with real sources and sinks.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use framelift::core::collaborators::OutputSink;
use framelift::core::config::{FlowParams, PipelineConfig, UpscaleAlgorithm};
use framelift::engine::pipeline::PipelineOrchestrator;
use framelift::io::sink::{NullSink, PipelineCommand, RecordingSink};
use framelift::io::source::SyntheticSource;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        raw_capacity: 64,
        processed_capacity: 64,
        target_width: 32,
        target_height: 32,
        algorithm: UpscaleAlgorithm::Bicubic,
        // Full queues block instead of dropping, so short runs are lossless.
        high_water_mark: 1.0,
        max_display_fps: 0,
        flow: FlowParams {
            levels: 2,
            window_radius: 2,
            search_radius: 1,
            iterations: 1,
            smoothing_passes: 1,
        },
        ..PipelineConfig::default()
    }
}

fn source(frames: u64) -> Box<SyntheticSource> {
    Box::new(SyntheticSource::new(16, 16).with_frame_limit(frames))
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "framelift-e2e-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

/// Upscaler that fails on every frame, forcing the fallback path.
struct BrokenUpscaler;

impl framelift::core::collaborators::FrameUpscaler for BrokenUpscaler {
    fn upscale(
        &mut self,
        _frame: &framelift::core::types::Frame,
    ) -> framelift::error::Result<framelift::core::types::Frame> {
        Err(framelift::error::EngineError::Upscale(
            "backend unavailable".into(),
        ))
    }

    fn target(&self) -> (u32, u32) {
        (32, 32)
    }
}

/// Sink that keeps every frame it receives for later inspection.
#[derive(Default)]
struct CollectingSink {
    frames: std::sync::Arc<std::sync::Mutex<Vec<framelift::core::types::Frame>>>,
}

impl OutputSink for CollectingSink {
    fn write(&mut self, frame: &framelift::core::types::Frame) -> framelift::error::Result<()> {
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[test]
fn upscaler_failure_degrades_to_deterministic_fallback() {
    use framelift::core::collaborators::{FrameSource, SourceStatus};
    use framelift::filters::upscale::fallback_resize;

    let mut pipeline = PipelineOrchestrator::new(test_config()).unwrap();
    let sink = CollectingSink::default();
    let collected = sink.frames.clone();

    // No filters, single frame: the sink receives exactly the fallback
    // resize of the source frame.
    pipeline
        .start_with(source(1), Box::new(BrokenUpscaler), Vec::new(), Box::new(sink))
        .unwrap();
    pipeline.wait().unwrap();

    let frames = collected.lock().unwrap();
    assert_eq!(frames.len(), 1);

    let mut reference = SyntheticSource::new(16, 16).with_frame_limit(1);
    let SourceStatus::Ready(original) = reference.next_frame() else {
        panic!("reference source produced no frame");
    };
    let expected = fallback_resize(&original, 32, 32);
    assert_eq!(frames[0].pixels(), expected.pixels());
}

#[test]
fn run_to_exhaustion_delivers_every_frame() {
    let mut pipeline = PipelineOrchestrator::new(test_config()).unwrap();
    let sink = NullSink::new();
    let written = sink.written_counter();

    pipeline.start(source(40), Box::new(sink)).unwrap();
    pipeline.wait().unwrap();
    assert!(!pipeline.is_running());

    let ctx = pipeline.context();
    assert_eq!(ctx.frames_captured.load(Ordering::Acquire), 40);
    assert_eq!(ctx.frames_processed.load(Ordering::Acquire), 40);
    assert_eq!(ctx.frames_displayed.load(Ordering::Acquire), 40);
    assert_eq!(ctx.frames_dropped.load(Ordering::Acquire), 0);
    assert_eq!(written.load(Ordering::Acquire), 40);
    assert!(ctx.validate_counts());
}

#[test]
fn counters_stay_ordered_under_backpressure() {
    // Tiny queues and an aggressive high-water mark force drops.
    let config = PipelineConfig {
        raw_capacity: 2,
        processed_capacity: 2,
        high_water_mark: 0.5,
        capture_backoff_ms: 1,
        ..test_config()
    };
    let mut pipeline = PipelineOrchestrator::new(config).unwrap();
    let sink = NullSink::new();
    let written = sink.written_counter();

    pipeline.start(source(60), Box::new(sink)).unwrap();
    pipeline.wait().unwrap();

    let ctx = pipeline.context();
    let captured = ctx.frames_captured.load(Ordering::Acquire);
    let processed = ctx.frames_processed.load(Ordering::Acquire);
    let displayed = ctx.frames_displayed.load(Ordering::Acquire);

    assert!(captured <= 60);
    assert!(processed <= captured);
    assert!(displayed <= processed);
    assert!(displayed > 0, "nothing reached the sink");
    assert_eq!(written.load(Ordering::Acquire), displayed);
    assert!(ctx.validate_counts());
}

#[test]
fn output_frames_have_target_resolution() {
    let dir = unique_temp_dir("resolution");
    let mut sink = RecordingSink::new(dir.clone()).unwrap();
    sink.toggle_recording();

    let mut pipeline = PipelineOrchestrator::new(test_config()).unwrap();
    pipeline.start(source(10), Box::new(sink)).unwrap();
    pipeline.wait().unwrap();

    let mut recorded = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (32, 32));
        recorded += 1;
    }
    assert_eq!(recorded, 10);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn quit_command_stops_an_unbounded_run() {
    let mut pipeline = PipelineOrchestrator::new(test_config()).unwrap();
    pipeline
        .start(
            Box::new(SyntheticSource::new(16, 16)),
            Box::new(NullSink::new()),
        )
        .unwrap();

    // Let some frames flow, then ask for shutdown.
    std::thread::sleep(std::time::Duration::from_millis(100));
    pipeline
        .command_sender()
        .unwrap()
        .send(PipelineCommand::Quit)
        .unwrap();
    pipeline.wait().unwrap();

    assert!(!pipeline.is_running());
    assert!(pipeline.context().validate_counts());
}

#[test]
fn superres_path_runs_end_to_end() {
    let config = PipelineConfig {
        algorithm: UpscaleAlgorithm::SuperRes,
        ..test_config()
    };
    let mut pipeline = PipelineOrchestrator::new(config).unwrap();
    let sink = NullSink::new();
    let written = sink.written_counter();

    pipeline.start(source(12), Box::new(sink)).unwrap();
    pipeline.wait().unwrap();
    assert_eq!(written.load(Ordering::Acquire), 12);
}

#[test]
fn snapshot_command_writes_one_file() {
    let dir = unique_temp_dir("snapshot");
    let sink = RecordingSink::new(dir.clone()).unwrap();

    let mut pipeline = PipelineOrchestrator::new(test_config()).unwrap();
    pipeline
        .start(
            Box::new(SyntheticSource::new(16, 16).with_fps(60)),
            Box::new(sink),
        )
        .unwrap();

    let sender = pipeline.command_sender().unwrap();
    sender.send(PipelineCommand::Snapshot).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));
    sender.send(PipelineCommand::Quit).unwrap();
    pipeline.wait().unwrap();

    assert!(dir.join("snapshot_000.png").exists());
    // Recording was never toggled on, so no numbered frames exist.
    assert!(!dir.join("frame_000000.png").exists());

    let _ = std::fs::remove_dir_all(&dir);
}
