//! Dense motion estimation and scene-change scoring.
//!
//! Flow comes from coarse-to-fine block matching on grayscale pyramids.
//! It is deliberately simple and fully deterministic: identical inputs
//! always produce the identical field, which is what the blender tests
//! rely on. Scene-change scoring combines global histogram correlation
//! with mean absolute pixel difference, so it fires on cuts but not on
//! smooth motion.

use ndarray::Array2;

use crate::core::config::FlowParams;
use crate::core::types::MotionField;
use crate::error::{EngineError, Result};

const HISTOGRAM_BINS: usize = 64;

/// Cost added per squared pixel of displacement. Biases ambiguous
/// (flat-texture) matches toward zero motion instead of the search-order
/// corner.
const MOTION_PENALTY: f64 = 0.25;

/// Pyramidal block-matching flow estimator.
#[derive(Clone, Debug)]
pub struct MotionEstimator {
    params: FlowParams,
}

impl MotionEstimator {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    /// Estimate per-pixel displacement carrying `prev` onto `curr`.
    ///
    /// The returned field has one `(dy, dx)` vector per pixel of `curr`.
    /// Dimension mismatch between the two images is an error; the caller
    /// treats it as a recoverable per-frame failure.
    pub fn estimate(&self, prev: &Array2<f32>, curr: &Array2<f32>) -> Result<MotionField> {
        if prev.dim() != curr.dim() {
            return Err(EngineError::Motion(format!(
                "gray image dimensions differ: {:?} vs {:?}",
                prev.dim(),
                curr.dim()
            )));
        }
        let (height, width) = curr.dim();
        if height == 0 || width == 0 {
            return Err(EngineError::Motion("empty gray image".into()));
        }

        let prev_pyramid = build_pyramid(prev, self.params.levels);
        let curr_pyramid = build_pyramid(curr, self.params.levels);

        // Coarsest level starts from zero displacement.
        let (ch, cw) = curr_pyramid[curr_pyramid.len() - 1].dim();
        let mut flow = MotionField::zeros(ch, cw);

        for level in (0..curr_pyramid.len()).rev() {
            let prev_level = &prev_pyramid[level];
            let curr_level = &curr_pyramid[level];
            if flow.dim() != curr_level.dim() {
                flow = upsample_flow(&flow, curr_level.dim());
            }
            for _ in 0..self.params.iterations {
                self.refine_level(prev_level, curr_level, &mut flow);
            }
            for _ in 0..self.params.smoothing_passes {
                smooth_flow(&mut flow);
            }
        }

        Ok(flow)
    }

    /// One full-sweep refinement: for every pixel, search around the
    /// current displacement for the window with the lowest SAD.
    fn refine_level(&self, prev: &Array2<f32>, curr: &Array2<f32>, flow: &mut MotionField) {
        let (height, width) = curr.dim();
        let window = self.params.window_radius as isize;
        let search = self.params.search_radius as isize;

        for y in 0..height {
            for x in 0..width {
                let (base_dy, base_dx) = flow.get(y, x);
                let base_dy = base_dy.round() as isize;
                let base_dx = base_dx.round() as isize;

                let mut best = (base_dy, base_dx);
                let mut best_cost = matching_cost(prev, curr, y, x, base_dy, base_dx, window);

                for sy in -search..=search {
                    for sx in -search..=search {
                        if sy == 0 && sx == 0 {
                            continue;
                        }
                        let cand = (base_dy + sy, base_dx + sx);
                        let cost = matching_cost(prev, curr, y, x, cand.0, cand.1, window);
                        // Strict improvement keeps the search deterministic.
                        if cost < best_cost {
                            best_cost = cost;
                            best = cand;
                        }
                    }
                }

                flow.set(y, x, best.0 as f32, best.1 as f32);
            }
        }
    }
}

/// Combined scene-change score between two gray images.
///
/// `(1 - pearson(hist_prev, hist_curr)) * 100 + mad * 0.5` where `mad`
/// is the mean absolute pixel difference. Higher means more different;
/// a cut is declared strictly above the configured threshold.
pub fn scene_change_score(prev: &Array2<f32>, curr: &Array2<f32>) -> f64 {
    let hist_prev = normalized_histogram(prev);
    let hist_curr = normalized_histogram(curr);
    let correlation = pearson(&hist_prev, &hist_curr);

    let mad = if prev.dim() == curr.dim() && !prev.is_empty() {
        prev.iter()
            .zip(curr.iter())
            .map(|(a, b)| (a - b).abs() as f64)
            .sum::<f64>()
            / prev.len() as f64
    } else {
        // Resolution change is itself a hard discontinuity.
        255.0
    };

    (1.0 - correlation) * 100.0 + mad * 0.5
}

fn normalized_histogram(gray: &Array2<f32>) -> [f64; HISTOGRAM_BINS] {
    let mut hist = [0f64; HISTOGRAM_BINS];
    for &value in gray.iter() {
        let bin = ((value / 256.0 * HISTOGRAM_BINS as f32) as usize).min(HISTOGRAM_BINS - 1);
        hist[bin] += 1.0;
    }
    let max = hist.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        for h in hist.iter_mut() {
            *h /= max;
        }
    }
    hist
}

fn pearson(a: &[f64; HISTOGRAM_BINS], b: &[f64; HISTOGRAM_BINS]) -> f64 {
    let n = HISTOGRAM_BINS as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..HISTOGRAM_BINS {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        // Flat histograms: identical distributions, perfectly correlated.
        1.0
    } else {
        cov / denom
    }
}

fn build_pyramid(base: &Array2<f32>, levels: usize) -> Vec<Array2<f32>> {
    let mut pyramid = vec![base.clone()];
    for _ in 1..levels {
        let top = &pyramid[pyramid.len() - 1];
        let (h, w) = top.dim();
        if h < 8 || w < 8 {
            break;
        }
        pyramid.push(downsample_half(top));
    }
    pyramid
}

/// Halve each dimension by 2x2 box averaging.
fn downsample_half(img: &Array2<f32>) -> Array2<f32> {
    let (h, w) = img.dim();
    let (oh, ow) = (h / 2, w / 2);
    Array2::from_shape_fn((oh, ow), |(y, x)| {
        (img[[2 * y, 2 * x]]
            + img[[2 * y, 2 * x + 1]]
            + img[[2 * y + 1, 2 * x]]
            + img[[2 * y + 1, 2 * x + 1]])
            / 4.0
    })
}

/// Expand a coarse field to `target` dimensions, doubling displacement
/// magnitudes to match the finer pixel grid.
fn upsample_flow(flow: &MotionField, target: (usize, usize)) -> MotionField {
    let (sh, sw) = flow.dim();
    let (th, tw) = target;
    let mut out = MotionField::zeros(th, tw);
    for y in 0..th {
        for x in 0..tw {
            let sy = (y * sh / th).min(sh.saturating_sub(1));
            let sx = (x * sw / tw).min(sw.saturating_sub(1));
            let (dy, dx) = flow.get(sy, sx);
            out.set(y, x, dy * 2.0, dx * 2.0);
        }
    }
    out
}

/// One 3x3 box-blur pass over both flow components, clamped borders.
fn smooth_flow(flow: &mut MotionField) {
    let (h, w) = flow.dim();
    let mut out = MotionField::zeros(h, w);
    for y in 0..h {
        for x in 0..w {
            let mut sum_dy = 0.0;
            let mut sum_dx = 0.0;
            let mut count = 0.0;
            for oy in -1isize..=1 {
                for ox in -1isize..=1 {
                    let ny = (y as isize + oy).clamp(0, h as isize - 1) as usize;
                    let nx = (x as isize + ox).clamp(0, w as isize - 1) as usize;
                    let (dy, dx) = flow.get(ny, nx);
                    sum_dy += dy;
                    sum_dx += dx;
                    count += 1.0;
                }
            }
            out.set(y, x, sum_dy / count, sum_dx / count);
        }
    }
    *flow = out;
}

/// SAD plus the displacement-magnitude penalty.
fn matching_cost(
    prev: &Array2<f32>,
    curr: &Array2<f32>,
    y: usize,
    x: usize,
    dy: isize,
    dx: isize,
    radius: isize,
) -> f64 {
    window_sad(prev, curr, y, x, dy, dx, radius) + MOTION_PENALTY * (dy * dy + dx * dx) as f64
}

/// Sum of absolute differences between the window centered at `(y, x)`
/// in `curr` and the window displaced by `(dy, dx)` in `prev`. Border
/// pixels clamp rather than shrink the window.
fn window_sad(
    prev: &Array2<f32>,
    curr: &Array2<f32>,
    y: usize,
    x: usize,
    dy: isize,
    dx: isize,
    radius: isize,
) -> f64 {
    let (h, w) = curr.dim();
    let mut cost = 0.0f64;
    for oy in -radius..=radius {
        for ox in -radius..=radius {
            let cy = (y as isize + oy).clamp(0, h as isize - 1) as usize;
            let cx = (x as isize + ox).clamp(0, w as isize - 1) as usize;
            let py = (cy as isize + dy).clamp(0, h as isize - 1) as usize;
            let px = (cx as isize + dx).clamp(0, w as isize - 1) as usize;
            cost += (curr[[cy, cx]] - prev[[py, px]]).abs() as f64;
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(h: usize, w: usize, shift: usize) -> Array2<f32> {
        // Vertical bar on a dark background, shifted right by `shift`.
        Array2::from_shape_fn((h, w), |(_, x)| {
            let bar = 8 + shift;
            if x >= bar && x < bar + 4 {
                200.0
            } else {
                20.0
            }
        })
    }

    #[test]
    fn identical_frames_produce_zero_flow() {
        let img = gradient_image(32, 32, 0);
        let estimator = MotionEstimator::new(FlowParams::default());
        let flow = estimator.estimate(&img, &img).unwrap();

        let (h, w) = flow.dim();
        for y in 0..h {
            for x in 0..w {
                let (dy, dx) = flow.get(y, x);
                assert_eq!((dy, dx), (0.0, 0.0), "nonzero flow at ({y}, {x})");
            }
        }
    }

    #[test]
    fn horizontal_shift_is_recovered_near_the_edge() {
        let prev = gradient_image(32, 32, 0);
        let curr = gradient_image(32, 32, 2);
        let estimator = MotionEstimator::new(FlowParams {
            levels: 1,
            ..FlowParams::default()
        });
        let flow = estimator.estimate(&prev, &curr).unwrap();

        // Pixels on the moved bar should point back at its old position.
        let (dy, dx) = flow.get(16, 11);
        assert!(dy.abs() <= 1.0);
        assert!(
            (dx - (-2.0)).abs() <= 1.0,
            "expected dx near -2, got {dx} (dy {dy})"
        );
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let a = Array2::<f32>::zeros((16, 16));
        let b = Array2::<f32>::zeros((16, 24));
        let estimator = MotionEstimator::new(FlowParams::default());
        assert!(matches!(
            estimator.estimate(&a, &b),
            Err(EngineError::Motion(_))
        ));
    }

    #[test]
    fn estimation_is_deterministic() {
        let prev = gradient_image(32, 32, 0);
        let curr = gradient_image(32, 32, 1);
        let estimator = MotionEstimator::new(FlowParams::default());
        let a = estimator.estimate(&prev, &curr).unwrap();
        let b = estimator.estimate(&prev, &curr).unwrap();
        assert_eq!(a.as_array(), b.as_array());
    }

    #[test]
    fn scene_score_is_low_for_identical_and_high_for_inverted() {
        let img = gradient_image(32, 32, 0);
        let inverted = img.mapv(|v| 255.0 - v);

        let same = scene_change_score(&img, &img);
        assert!(same < 1.0, "identical frames scored {same}");

        let cut = scene_change_score(&img, &inverted);
        assert!(cut > same, "inversion ({cut}) not above identity ({same})");
    }

    #[test]
    fn scene_score_grows_with_brightness_gap() {
        let dark = Array2::from_elem((32, 32), 10.0f32);
        let mid = Array2::from_elem((32, 32), 100.0f32);
        let bright = Array2::from_elem((32, 32), 250.0f32);

        let small = scene_change_score(&dark, &mid);
        let large = scene_change_score(&dark, &bright);
        assert!(large > small);
        // Flat 240-level gap: MAD term alone clears the default threshold.
        assert!(large > 100.0);
    }
}
