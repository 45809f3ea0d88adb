//! Output sinks and runtime control commands.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::collaborators::OutputSink;
use crate::core::types::Frame;
use crate::error::Result;

/// Runtime control commands serviced by the display stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Wind the pipeline down cleanly.
    Quit,
    /// Flip persistent recording on or off.
    ToggleRecording,
    /// Persist the next displayed frame out-of-band.
    Snapshot,
}

/// Sink that discards frames but counts them. The counter handle stays
/// valid after the sink moves onto the display thread.
#[derive(Debug, Default)]
pub struct NullSink {
    written: Arc<AtomicU64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the number of frames written so far.
    pub fn written_counter(&self) -> Arc<AtomicU64> {
        self.written.clone()
    }
}

impl OutputSink for NullSink {
    fn write(&mut self, _frame: &Frame) -> Result<()> {
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Writes frames to numbered PNG files while recording is enabled, and
/// snapshots on demand regardless of the recording state.
pub struct RecordingSink {
    dir: PathBuf,
    recording: bool,
    frames_written: u64,
    snapshots_taken: u64,
}

impl RecordingSink {
    /// Create the output directory if needed. Recording starts off.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            recording: false,
            frames_written: 0,
            snapshots_taken: 0,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl OutputSink for RecordingSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        frame.to_rgb_image().save(&path)?;
        self.frames_written += 1;
        debug!(path = %path.display(), "recorded frame");
        Ok(())
    }

    fn toggle_recording(&mut self) {
        self.recording = !self.recording;
        info!(recording = self.recording, "recording toggled");
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<()> {
        let path = self
            .dir
            .join(format!("snapshot_{:03}.png", self.snapshots_taken));
        frame.to_rgb_image().save(&path)?;
        self.snapshots_taken += 1;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.frames_written > 0 || self.snapshots_taken > 0 {
            info!(
                frames = self.frames_written,
                snapshots = self.snapshots_taken,
                dir = %self.dir.display(),
                "recording finalized"
            );
        }
        Ok(())
    }
}
