//! framelift — CLI entrypoint.
//!
//! Parses user flags, assembles a source and sink, and runs the
//! capture/process/display enhancement pipeline.
//!
//! ```bash
//! framelift --frames 600 --width 1280 --height 720
//! framelift -i ./frames -o ./out --record --algorithm superres
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use framelift::core::collaborators::{FrameSource, OutputSink};
use framelift::core::config::{PipelineConfig, UpscaleAlgorithm};
use framelift::engine::pipeline::PipelineOrchestrator;
use framelift::error::{EngineError, Result};
use framelift::io::sink::{NullSink, RecordingSink};
use framelift::io::source::{ImageSequenceSource, SyntheticSource};

// ─── CLI argument definition ─────────────────────────────────────────────────

/// framelift — real-time video enhancement pipeline.
///
/// Upscales, filters, and temporally stabilizes a frame stream using a
/// three-stage threaded pipeline with bounded buffering.
#[derive(Parser, Debug)]
#[command(name = "framelift", version, about)]
struct Cli {
    /// Input image-sequence directory (PNG/JPEG/BMP, played in filename
    /// order). Omit to use the synthetic test-pattern source.
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Output directory for recorded frames and snapshots.
    /// Omit to discard output after processing.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Output width after upscaling.
    #[arg(long = "width", default_value_t = 1280)]
    width: u32,

    /// Output height after upscaling.
    #[arg(long = "height", default_value_t = 720)]
    height: u32,

    /// Upscaling algorithm: bicubic or superres.
    #[arg(short = 'a', long = "algorithm", default_value = "bicubic")]
    algorithm: String,

    /// Request GPU acceleration (falls back to CPU when unavailable).
    #[arg(long = "gpu")]
    gpu: bool,

    /// Queue capacity: capture → process.
    #[arg(long = "raw-cap", default_value_t = 5)]
    raw_cap: usize,

    /// Queue capacity: process → display.
    #[arg(long = "processed-cap", default_value_t = 5)]
    processed_cap: usize,

    /// Synthetic source resolution width.
    #[arg(long = "source-width", default_value_t = 640)]
    source_width: u32,

    /// Synthetic source resolution height.
    #[arg(long = "source-height", default_value_t = 360)]
    source_height: u32,

    /// Synthetic source pacing in frames per second (0 = unpaced).
    #[arg(long = "source-fps", default_value_t = 30)]
    source_fps: u32,

    /// Frame count for the synthetic source (0 = unlimited).
    #[arg(short = 'n', long = "frames", default_value_t = 300)]
    frames: u64,

    /// Display pacing ceiling in frames per second (0 = unpaced).
    #[arg(long = "max-display-fps", default_value_t = 60)]
    max_display_fps: u32,

    /// Temporal blend strength in [0, 1].
    #[arg(long = "blend", default_value_t = 0.6)]
    blend: f32,

    /// Temporal history depth in frames.
    #[arg(long = "history", default_value_t = 3)]
    history: usize,

    /// Raw-queue occupancy ratio above which capture drops frames.
    #[arg(long = "high-water", default_value_t = 0.9)]
    high_water: f64,

    /// Start with recording enabled (requires --output).
    #[arg(long = "record")]
    record: bool,

    /// Loop the input image sequence instead of exiting at its end.
    #[arg(long = "loop")]
    loop_input: bool,

    /// Seconds between stats log lines.
    #[arg(long = "stats-interval", default_value_t = 5)]
    stats_interval: u64,
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    // Initialize tracing (structured logging).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    tracing::info!(
        target = format!("{}x{}", cli.width, cli.height),
        algorithm = %cli.algorithm,
        gpu = cli.gpu,
        "framelift starting"
    );

    match run(cli) {
        Ok(()) => {
            tracing::info!("Pipeline completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "Pipeline failed");
            std::process::exit(e.error_code() as i32);
        }
    }
}

// ─── Pipeline assembly ───────────────────────────────────────────────────────

fn run(cli: Cli) -> Result<()> {
    let wall_start = Instant::now();

    let mut config = PipelineConfig {
        raw_capacity: cli.raw_cap,
        processed_capacity: cli.processed_cap,
        target_width: cli.width,
        target_height: cli.height,
        algorithm: parse_algorithm(&cli.algorithm)?,
        use_gpu: cli.gpu,
        high_water_mark: cli.high_water,
        max_display_fps: cli.max_display_fps,
        ..PipelineConfig::default()
    };
    config.temporal.blend_strength = cli.blend;
    config.temporal.history_depth = cli.history;

    let source: Box<dyn FrameSource> = match &cli.input {
        Some(dir) => {
            let sequence = ImageSequenceSource::new(dir)?;
            if sequence.is_empty() {
                return Err(EngineError::Source(format!(
                    "no images found in {}",
                    dir.display()
                )));
            }
            if cli.loop_input {
                Box::new(sequence.with_loop())
            } else {
                Box::new(sequence)
            }
        }
        None => {
            let mut synthetic = SyntheticSource::new(cli.source_width, cli.source_height)
                .with_fps(cli.source_fps);
            if cli.frames > 0 {
                synthetic = synthetic.with_frame_limit(cli.frames);
            }
            Box::new(synthetic)
        }
    };

    let sink: Box<dyn OutputSink> = match &cli.output {
        Some(dir) => {
            let mut recording = RecordingSink::new(dir.clone())?;
            if cli.record {
                recording.toggle_recording();
            }
            Box::new(recording)
        }
        None => {
            if cli.record {
                tracing::warn!("--record has no effect without --output");
            }
            Box::new(NullSink::new())
        }
    };

    let mut pipeline = PipelineOrchestrator::new(config)?;
    pipeline.start(source, sink)?;

    // Supervise: periodic stats until the pipeline winds down on its own
    // (source exhaustion or a quit command).
    let ctx = pipeline.context();
    let stats_interval = Duration::from_secs(cli.stats_interval.max(1));
    let mut last_stats = Instant::now();
    while !ctx.is_shutdown() {
        std::thread::sleep(Duration::from_millis(50));
        if last_stats.elapsed() >= stats_interval {
            pipeline.print_stats();
            last_stats = Instant::now();
        }
    }
    pipeline.stop()?;

    tracing::info!(
        elapsed_s = format!("{:.2}", wall_start.elapsed().as_secs_f64()),
        latency_ms = format!("{:.2}", pipeline.latency_ms()),
        "Engine shutdown complete"
    );
    Ok(())
}

/// Parse an algorithm string into an `UpscaleAlgorithm`.
fn parse_algorithm(s: &str) -> Result<UpscaleAlgorithm> {
    match s.to_lowercase().as_str() {
        "bicubic" | "resize" => Ok(UpscaleAlgorithm::Bicubic),
        "superres" | "sr" | "detail" => Ok(UpscaleAlgorithm::SuperRes),
        other => Err(EngineError::InvalidConfig(format!(
            "Unknown algorithm '{}'. Use bicubic or superres.",
            other
        ))),
    }
}
