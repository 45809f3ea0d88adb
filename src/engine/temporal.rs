//! Temporal-consistency blending.
//!
//! Reduces frame-to-frame flicker by blending each frame with motion
//! compensated versions of its recent predecessors. Every history entry
//! carries the flow to its immediate successor and is warped by that
//! single step when blending, so compensation quality degrades gently
//! with age instead of compounding flow errors across the whole chain.
//!
//! The blender never fails a frame: scene cuts, flow failures, and
//! resolution changes all degrade to pass-through while keeping the
//! history bookkeeping consistent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array3};

use crate::core::config::{FlowParams, TemporalConfig};
use crate::core::types::{Frame, MotionField, ReliabilityMask};
use crate::engine::motion::{scene_change_score, MotionEstimator};
use tracing::{debug, warn};

/// Where the blender is in its warm-up cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendState {
    /// No history; the next frame passes through untouched.
    Empty,
    /// Partial history; blending uses fewer than `history_depth` frames.
    Warming,
    /// Full history window.
    Steady,
}

struct HistoryEntry {
    frame: Frame,
    gray: Array2<f32>,
    /// Flow carrying this frame onto the frame that followed it.
    /// `None` on the newest entry and where estimation failed.
    flow_to_next: Option<MotionField>,
}

/// Stateful per-pipeline temporal blender.
///
/// Owned by the process stage; tuning lives behind a shared mutex so a
/// control thread can adjust it while frames are flowing.
pub struct TemporalBlender {
    config: Arc<Mutex<TemporalConfig>>,
    estimator: MotionEstimator,
    history: VecDeque<HistoryEntry>,
}

impl TemporalBlender {
    pub fn new(config: TemporalConfig, flow: FlowParams) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            estimator: MotionEstimator::new(flow),
            history: VecDeque::new(),
        }
    }

    /// Snapshot of the current tuning.
    pub fn config(&self) -> TemporalConfig {
        *self.config.lock().unwrap()
    }

    /// Handle for adjusting tuning from another thread.
    pub fn shared_config(&self) -> Arc<Mutex<TemporalConfig>> {
        self.config.clone()
    }

    /// Apply a tuning change; out-of-range values are clamped rather
    /// than rejected since this runs mid-stream.
    pub fn update_config(&self, apply: impl FnOnce(&mut TemporalConfig)) {
        let mut cfg = self.config.lock().unwrap();
        apply(&mut cfg);
        cfg.blend_strength = cfg.blend_strength.clamp(0.0, 1.0);
        cfg.history_depth = cfg.history_depth.max(1);
    }

    pub fn state(&self) -> BlendState {
        let depth = self.config.lock().unwrap().history_depth;
        match self.history.len() {
            0 => BlendState::Empty,
            n if n < depth => BlendState::Warming,
            _ => BlendState::Steady,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drop all history; the next frame passes through untouched.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Blend one frame against the motion-compensated history.
    ///
    /// Always returns a frame with the input's dimensions and metadata.
    pub fn process(&mut self, frame: Frame) -> Frame {
        let cfg = self.config();
        let gray = frame.to_gray();

        if self.history.is_empty() {
            self.store(frame.clone(), gray, None, cfg.history_depth);
            return frame;
        }

        // Scene check and flow estimation read the newest entry; the
        // borrow must end before any history mutation below.
        let (scene_cut, flow) = {
            // Non-empty here.
            let last = self.history.back().unwrap();

            let cut = gray.dim() == last.gray.dim() && {
                let score = scene_change_score(&last.gray, &gray);
                let cut = score > cfg.scene_change_threshold;
                if cut {
                    debug!(score = format!("{score:.1}"), "scene cut, resetting history");
                }
                cut
            };

            if cut {
                (true, None)
            } else {
                match self.estimator.estimate(&last.gray, &gray) {
                    Ok(flow) => (false, Some(flow)),
                    Err(err) => {
                        warn!(error = %err, "flow estimation failed, passing frame through");
                        (false, None)
                    }
                }
            }
        };

        if scene_cut {
            self.history.clear();
            self.store(frame.clone(), gray, None, cfg.history_depth);
            return frame;
        }

        let output = match &flow {
            Some(flow) => self.blend(&frame, flow, &cfg),
            None => frame.clone(),
        };

        if let Some(back) = self.history.back_mut() {
            back.flow_to_next = flow;
        }
        self.store(frame, gray, None, cfg.history_depth);
        output
    }

    fn store(
        &mut self,
        frame: Frame,
        gray: Array2<f32>,
        flow_to_next: Option<MotionField>,
        depth: usize,
    ) {
        self.history.push_back(HistoryEntry {
            frame,
            gray,
            flow_to_next,
        });
        while self.history.len() > depth {
            self.history.pop_front();
        }
    }

    /// Weighted average of the current frame and each history entry
    /// warped by its own single flow step. The current frame always
    /// contributes with weight 1.0, so output brightness never drifts.
    fn blend(&self, current: &Frame, newest_flow: &MotionField, cfg: &TemporalConfig) -> Frame {
        let (height, width) = (current.height() as usize, current.width() as usize);
        let pixels = current.pixels();

        let mut acc = Array3::<f32>::zeros((height, width, 3));
        let mut total = Array2::<f32>::zeros((height, width));
        for ((y, x, c), value) in pixels.indexed_iter() {
            acc[[y, x, c]] = *value as f32;
            if c == 0 {
                total[[y, x]] = 1.0;
            }
        }

        for (age, entry) in self.history.iter().rev().enumerate() {
            let age = age as f32 + 1.0;
            // Newest entry's flow was just estimated and is not stored yet.
            let flow = if age == 1.0 {
                Some(newest_flow)
            } else {
                entry.flow_to_next.as_ref()
            };
            let Some(flow) = flow else { continue };
            if flow.dim() != (height, width) || entry.frame.pixels().dim() != pixels.dim() {
                continue;
            }

            let warped = warp_frame(&entry.frame, flow);
            let mask = reliability_mask(flow, cfg);
            let age_weight = (-age / cfg.age_decay).exp() * cfg.blend_strength;

            for y in 0..height {
                for x in 0..width {
                    let weight = age_weight * mask.get(y, x);
                    if weight <= 0.0 {
                        continue;
                    }
                    for c in 0..3 {
                        acc[[y, x, c]] += warped[[y, x, c]] * weight;
                    }
                    total[[y, x]] += weight;
                }
            }
        }

        let blended = Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            let t = total[[y, x]];
            if t <= f32::EPSILON {
                pixels[[y, x, c]]
            } else {
                (acc[[y, x, c]] / t).round().clamp(0.0, 255.0) as u8
            }
        });

        let mut out = Frame::new(blended, current.index);
        out.captured_at = current.captured_at;
        out
    }
}

/// Bilinear backward warp of `frame` along `flow`, border-replicate.
fn warp_frame(frame: &Frame, flow: &MotionField) -> Array3<f32> {
    let pixels = frame.pixels();
    let (height, width, _) = pixels.dim();
    Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
        let (dy, dx) = flow.get(y, x);
        sample_bilinear(pixels, y as f32 + dy, x as f32 + dx, c)
    })
}

fn sample_bilinear(pixels: &Array3<u8>, y: f32, x: f32, c: usize) -> f32 {
    let (height, width, _) = pixels.dim();
    let max_y = height as f32 - 1.0;
    let max_x = width as f32 - 1.0;
    let y = y.clamp(0.0, max_y);
    let x = x.clamp(0.0, max_x);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;

    let top = pixels[[y0, x0, c]] as f32 * (1.0 - fx) + pixels[[y0, x1, c]] as f32 * fx;
    let bottom = pixels[[y1, x0, c]] as f32 * (1.0 - fx) + pixels[[y1, x1, c]] as f32 * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Per-pixel confidence in the flow: full trust below the motion
/// threshold, exponential falloff above it, then one smoothing pass so
/// isolated unreliable pixels do not punch holes in the blend.
pub fn reliability_mask(flow: &MotionField, cfg: &TemporalConfig) -> ReliabilityMask {
    let (height, width) = flow.dim();
    let raw = Array2::from_shape_fn((height, width), |(y, x)| {
        let mag = flow.magnitude(y, x);
        if mag <= cfg.motion_threshold {
            1.0
        } else {
            (-(mag - cfg.motion_threshold) / cfg.reliability_falloff)
                .exp()
                .clamp(0.0, 1.0)
        }
    });

    // 3x3 box blur, clamped borders.
    let blurred = Array2::from_shape_fn((height, width), |(y, x)| {
        let mut sum = 0.0;
        let mut count = 0.0;
        for oy in -1isize..=1 {
            for ox in -1isize..=1 {
                let ny = (y as isize + oy).clamp(0, height as isize - 1) as usize;
                let nx = (x as isize + ox).clamp(0, width as isize - 1) as usize;
                sum += raw[[ny, nx]];
                count += 1.0;
            }
        }
        sum / count
    });

    ReliabilityMask::from_array(blurred)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blender() -> TemporalBlender {
        TemporalBlender::new(TemporalConfig::default(), FlowParams::default())
    }

    fn textured_frame(index: u64) -> Frame {
        let data = Array3::from_shape_fn((24, 24, 3), |(y, x, c)| {
            ((y * 7 + x * 13 + c * 29) % 200) as u8 + 20
        });
        Frame::new(data, index)
    }

    #[test]
    fn first_frame_passes_through_unchanged() {
        let mut blender = blender();
        assert_eq!(blender.state(), BlendState::Empty);

        let input = textured_frame(0);
        let output = blender.process(input.clone());
        assert!(output.shares_data_with(&input));
        assert_eq!(blender.state(), BlendState::Warming);
    }

    #[test]
    fn state_reaches_steady_at_configured_depth() {
        let mut blender = blender();
        for i in 0..3 {
            blender.process(textured_frame(i));
        }
        assert_eq!(blender.state(), BlendState::Steady);
        assert_eq!(blender.history_len(), 3);

        // Depth stays bounded as more frames arrive.
        for i in 3..8 {
            blender.process(textured_frame(i));
        }
        assert_eq!(blender.history_len(), 3);
    }

    #[test]
    fn static_scene_output_equals_input() {
        let mut blender = blender();
        let mut last = None;
        for i in 0..5 {
            last = Some(blender.process(textured_frame(i)));
        }
        // Identical frames, zero flow: the weighted average of equal
        // pixels must round back to the same pixel values.
        assert_eq!(
            last.unwrap().pixels(),
            textured_frame(4).pixels()
        );
    }

    #[test]
    fn scene_cut_clears_history_and_passes_through() {
        let mut blender = blender();
        for i in 0..3 {
            blender.process(textured_frame(i));
        }
        assert_eq!(blender.history_len(), 3);

        // Hard cut to a flat white frame: histogram collapses to one
        // bin and the pixel difference is large.
        let cut = Frame::solid(24, 24, [255, 255, 255], 3);
        let output = blender.process(cut.clone());
        assert!(output.shares_data_with(&cut));
        assert_eq!(blender.history_len(), 1);
        assert_eq!(blender.state(), BlendState::Warming);
    }

    #[test]
    fn cut_requires_strictly_greater_score() {
        let mut blender = blender();
        let base = textured_frame(0);
        let white = Frame::solid(24, 24, [255, 255, 255], 1);

        // Pin the threshold to the exact score this transition produces;
        // an equal score must not reset the history.
        let score = scene_change_score(&base.to_gray(), &white.to_gray());
        blender.update_config(|cfg| cfg.scene_change_threshold = score);

        blender.process(base);
        blender.process(white);
        assert_eq!(blender.history_len(), 2);

        // The smallest threshold decrease flips the same transition
        // into a cut.
        let mut blender = TemporalBlender::new(
            TemporalConfig {
                scene_change_threshold: score * 0.999,
                ..TemporalConfig::default()
            },
            FlowParams::default(),
        );
        blender.process(textured_frame(0));
        blender.process(Frame::solid(24, 24, [255, 255, 255], 1));
        assert_eq!(blender.history_len(), 1);
    }

    #[test]
    fn resolution_change_passes_through_and_keeps_history_bounded() {
        let mut blender = blender();
        for i in 0..3 {
            blender.process(textured_frame(i));
        }

        // Different dimensions but similar histogram: no scene cut, flow
        // estimation fails, frame passes through.
        let resized = Frame::new(
            Array3::from_shape_fn((32, 32, 3), |(y, x, c)| {
                ((y * 7 + x * 13 + c * 29) % 200) as u8 + 20
            }),
            3,
        );
        let output = blender.process(resized.clone());
        assert!(output.shares_data_with(&resized));
        assert_eq!(blender.history_len(), 3);
    }

    #[test]
    fn persistent_flow_failure_is_pass_through_every_frame() {
        let mut blender = blender();
        // Every frame has new dimensions, so estimation fails each time
        // while history keeps accumulating up to the depth bound.
        for i in 0..5usize {
            let side = 16 + 4 * i;
            let frame = Frame::new(
                Array3::from_shape_fn((side, side, 3), |(y, x, c)| {
                    ((y * 3 + x * 5 + c) % 251) as u8
                }),
                i as u64,
            );
            let output = blender.process(frame.clone());
            assert!(output.shares_data_with(&frame));
            assert_eq!(blender.history_len(), (i + 1).min(3));
        }
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut blender = blender();
        blender.process(textured_frame(0));
        blender.reset();
        assert_eq!(blender.state(), BlendState::Empty);
    }

    #[test]
    fn runtime_tuning_is_clamped() {
        let blender = blender();
        blender.update_config(|cfg| {
            cfg.blend_strength = 3.0;
            cfg.history_depth = 0;
        });
        let cfg = blender.config();
        assert_eq!(cfg.blend_strength, 1.0);
        assert_eq!(cfg.history_depth, 1);
    }

    #[test]
    fn reliability_is_full_below_threshold_and_decays_above() {
        let cfg = TemporalConfig::default();

        let mut still = MotionField::zeros(9, 9);
        for y in 0..9 {
            for x in 0..9 {
                still.set(y, x, 0.0, 5.0);
            }
        }
        let mask = reliability_mask(&still, &cfg);
        assert!((mask.get(4, 4) - 1.0).abs() < 1e-6);

        let mut fast = MotionField::zeros(9, 9);
        for y in 0..9 {
            for x in 0..9 {
                fast.set(y, x, 0.0, 30.0);
            }
        }
        let mut faster = MotionField::zeros(9, 9);
        for y in 0..9 {
            for x in 0..9 {
                faster.set(y, x, 0.0, 60.0);
            }
        }
        let fast_mask = reliability_mask(&fast, &cfg);
        let faster_mask = reliability_mask(&faster, &cfg);
        assert!(fast_mask.get(4, 4) < 1.0);
        assert!(faster_mask.get(4, 4) < fast_mask.get(4, 4));
    }

    #[test]
    fn blend_preserves_frame_metadata() {
        let mut blender = blender();
        blender.process(textured_frame(0));
        let input = textured_frame(1);
        let stamp = input.captured_at;
        let output = blender.process(input);
        assert_eq!(output.index, 1);
        assert_eq!(output.captured_at, stamp);
        assert_eq!((output.width(), output.height()), (24, 24));
    }
}
