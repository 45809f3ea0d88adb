//! Frame sources.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::Array3;
use tracing::{info, warn};

use crate::core::collaborators::{FrameSource, SourceStatus};
use crate::core::types::Frame;
use crate::error::{EngineError, Result};

/// Deterministic procedural test-pattern generator.
///
/// Produces an animated gradient so consecutive frames carry real
/// motion, optionally paced to a fixed rate and capped at a frame
/// count. The pattern is a pure function of `(x, y, index)`, which
/// keeps every run reproducible.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    next_index: u64,
    frame_limit: Option<u64>,
    frame_interval: Option<Duration>,
    last_emit: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            next_index: 0,
            frame_limit: None,
            frame_interval: None,
            last_emit: None,
        }
    }

    /// Stop after `frames` frames; the source then reports exhaustion.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Pace emission to roughly `fps` frames per second.
    pub fn with_fps(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps as f64));
        }
        self
    }

    fn generate(&self, index: u64) -> Frame {
        let (w, h) = (self.width as usize, self.height as usize);
        let t = index as usize;
        let data = Array3::from_shape_fn((h, w, 3), |(y, x, c)| match c {
            0 => (((x + t) % w) * 255 / w) as u8,
            1 => (y * 255 / h) as u8,
            _ => (((x + y + 2 * t) % (w + h)) * 255 / (w + h)) as u8,
        });
        Frame::new(data, index)
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> SourceStatus {
        if let Some(limit) = self.frame_limit {
            if self.next_index >= limit {
                return SourceStatus::Exhausted;
            }
        }

        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_emit) {
            let since = last.elapsed();
            if since < interval {
                thread::sleep(interval - since);
            }
        }

        let frame = self.generate(self.next_index);
        self.next_index += 1;
        self.last_emit = Some(Instant::now());
        SourceStatus::Ready(frame)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Plays a directory of still images in filename order.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    next_index: u64,
    looping: bool,
}

impl ImageSequenceSource {
    /// Scan `dir` for image files. An empty directory is allowed; the
    /// source is then immediately exhausted.
    pub fn new(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            warn!(dir = %dir.display(), "no image files found in sequence directory");
        } else {
            info!(dir = %dir.display(), count = files.len(), "image sequence loaded");
        }

        Ok(Self {
            files,
            position: 0,
            next_index: 0,
            looping: false,
        })
    }

    /// Restart from the first image instead of exhausting.
    pub fn with_loop(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn load(&self, path: &Path, index: u64) -> Result<Frame> {
        let image = image::open(path)
            .map_err(|err| EngineError::Source(format!("{}: {err}", path.display())))?
            .to_rgb8();
        Frame::from_rgb_image(&image, index)
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> SourceStatus {
        if self.position >= self.files.len() {
            if self.looping && !self.files.is_empty() {
                self.position = 0;
            } else {
                return SourceStatus::Exhausted;
            }
        }

        let path = self.files[self.position].clone();
        self.position += 1;

        match self.load(&path, self.next_index) {
            Ok(frame) => {
                self.next_index += 1;
                SourceStatus::Ready(frame)
            }
            Err(err) => {
                // A bad file is skipped, not fatal to the stream.
                warn!(error = %err, "failed to load sequence image");
                SourceStatus::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_is_deterministic() {
        let mut a = SyntheticSource::new(16, 12).with_frame_limit(3);
        let mut b = SyntheticSource::new(16, 12).with_frame_limit(3);

        loop {
            match (a.next_frame(), b.next_frame()) {
                (SourceStatus::Ready(fa), SourceStatus::Ready(fb)) => {
                    assert_eq!(fa.pixels(), fb.pixels());
                    assert_eq!(fa.index, fb.index);
                }
                (SourceStatus::Exhausted, SourceStatus::Exhausted) => break,
                other => panic!("sources diverged: {other:?}"),
            }
        }
    }

    #[test]
    fn frame_limit_is_honored() {
        let mut source = SyntheticSource::new(8, 8).with_frame_limit(2);
        assert!(matches!(source.next_frame(), SourceStatus::Ready(_)));
        assert!(matches!(source.next_frame(), SourceStatus::Ready(_)));
        assert!(matches!(source.next_frame(), SourceStatus::Exhausted));
        // Exhaustion is sticky.
        assert!(matches!(source.next_frame(), SourceStatus::Exhausted));
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut source = SyntheticSource::new(16, 16).with_frame_limit(2);
        let SourceStatus::Ready(first) = source.next_frame() else {
            panic!("expected a frame");
        };
        let SourceStatus::Ready(second) = source.next_frame() else {
            panic!("expected a frame");
        };
        assert_ne!(first.pixels(), second.pixels());
    }

    #[test]
    fn empty_directory_is_exhausted_immediately() {
        let dir = std::env::temp_dir().join(format!(
            "framelift-empty-seq-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let mut source = ImageSequenceSource::new(&dir).unwrap();
        assert!(source.is_empty());
        assert!(matches!(source.next_frame(), SourceStatus::Exhausted));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
