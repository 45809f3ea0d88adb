//! Frame and motion-field types.
//!
//! A [`Frame`] is an immutable-once-published pixel buffer with
//! reference-counted sharing: cloning is cheap, and every queue slot or
//! history entry holding the same frame shares one backing allocation.
//! Mutation goes through [`Frame::pixels_mut`], which copies on write, so
//! a frame handed across a queue boundary is never mutated by its former
//! owner.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use ndarray::{Array2, Array3};

use crate::error::{EngineError, Result};

/// Pixel layout of a [`Frame`]'s backing buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB, shape `(h, w, 3)`.
    Rgb8,
}

impl PixelFormat {
    /// Number of interleaved channels for this format.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// One decoded image buffer at a point in time.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Monotonically increasing capture index. Survivors of a drop keep
    /// their original index, so gaps identify dropped frames.
    pub index: u64,
    /// When the source produced this frame; used for end-to-end latency.
    pub captured_at: Instant,
    data: Arc<Array3<u8>>,
}

impl Frame {
    /// Wrap an interleaved RGB pixel array, shape `(h, w, 3)`.
    pub fn new(data: Array3<u8>, index: u64) -> Self {
        let (h, w, _) = data.dim();
        Self {
            width: w as u32,
            height: h as u32,
            format: PixelFormat::Rgb8,
            index,
            captured_at: Instant::now(),
            data: Arc::new(data),
        }
    }

    /// A frame filled with one color. Used by synthetic sources and tests.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        let mut data = Array3::zeros((height as usize, width as usize, 3));
        for mut pixel in data.rows_mut() {
            pixel[0] = rgb[0];
            pixel[1] = rgb[1];
            pixel[2] = rgb[2];
        }
        Self::new(data, index)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// True for zero-area frames, which queues reject.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Shared read access to the pixel data.
    pub fn pixels(&self) -> &Array3<u8> {
        &self.data
    }

    /// Mutable access, copying the backing buffer iff it is shared.
    pub fn pixels_mut(&mut self) -> &mut Array3<u8> {
        Arc::make_mut(&mut self.data)
    }

    /// Whether two frames share one backing allocation.
    pub fn shares_data_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Luma plane in `[0, 255]` (BT.601 weights), used by motion
    /// estimation and scene-change scoring.
    pub fn to_gray(&self) -> Array2<f32> {
        let (h, w, _) = self.data.dim();
        let mut gray = Array2::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let r = self.data[[y, x, 0]] as f32;
                let g = self.data[[y, x, 1]] as f32;
                let b = self.data[[y, x, 2]] as f32;
                gray[[y, x]] = 0.299 * r + 0.587 * g + 0.114 * b;
            }
        }
        gray
    }

    /// Convert to an owned `image` buffer for encoding/saving.
    pub fn to_rgb_image(&self) -> RgbImage {
        let raw: Vec<u8> = self.data.iter().copied().collect();
        RgbImage::from_raw(self.width, self.height, raw)
            .expect("frame dimensions always match the backing buffer")
    }

    /// Build a frame from a decoded `image` buffer.
    pub fn from_rgb_image(img: &RgbImage, index: u64) -> Result<Self> {
        let (w, h) = img.dimensions();
        let data = Array3::from_shape_vec((h as usize, w as usize, 3), img.as_raw().clone())
            .map_err(|e| EngineError::DimensionMismatch(e.to_string()))?;
        Ok(Self::new(data, index))
    }
}

/// Dense per-pixel displacement field between two frames.
///
/// Shape `(h, w, 2)`; `[[y, x, 0]]` is the row (y) displacement,
/// `[[y, x, 1]]` the column (x) displacement, in pixels of the field's
/// own resolution.
#[derive(Clone, Debug)]
pub struct MotionField {
    data: Array3<f32>,
}

impl MotionField {
    /// All-zero field of the given dimensions.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, 2)),
        }
    }

    pub fn from_array(data: Array3<f32>) -> Self {
        debug_assert_eq!(data.dim().2, 2);
        Self { data }
    }

    /// `(height, width)` of the field.
    pub fn dim(&self) -> (usize, usize) {
        let (h, w, _) = self.data.dim();
        (h, w)
    }

    /// Displacement `(dy, dx)` at a pixel.
    pub fn get(&self, y: usize, x: usize) -> (f32, f32) {
        (self.data[[y, x, 0]], self.data[[y, x, 1]])
    }

    pub fn set(&mut self, y: usize, x: usize, dy: f32, dx: f32) {
        self.data[[y, x, 0]] = dy;
        self.data[[y, x, 1]] = dx;
    }

    /// Euclidean displacement magnitude at a pixel.
    pub fn magnitude(&self, y: usize, x: usize) -> f32 {
        let (dy, dx) = self.get(y, x);
        (dy * dy + dx * dx).sqrt()
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn as_array_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }
}

/// Per-pixel confidence weights in `[0, 1]` derived from a motion field;
/// high displacement magnitude means low reliability.
#[derive(Clone, Debug)]
pub struct ReliabilityMask {
    data: Array2<f32>,
}

impl ReliabilityMask {
    /// Full-confidence mask (all ones).
    pub fn ones(height: usize, width: usize) -> Self {
        Self {
            data: Array2::from_elem((height, width), 1.0),
        }
    }

    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.data[[y, x]]
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }
}
