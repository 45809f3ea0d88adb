//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is a snapshot taken at initialization and
//! immutable for the duration of a run: the orchestrator rejects capacity
//! and resolution changes while its threads are live. Blender tuning
//! (`TemporalConfig`) is the exception and stays adjustable at runtime
//! behind the blender's own mutex.

use crate::error::{EngineError, Result};

/// Which upscaling path the process stage constructs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpscaleAlgorithm {
    /// Classical bicubic resize (CPU).
    Bicubic,
    /// Neural super-resolution; falls back to bicubic when no
    /// accelerated backend is available.
    SuperRes,
}

/// Immutable-during-run pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Capacity of the raw (capture → process) queue.
    pub raw_capacity: usize,
    /// Capacity of the processed (process → display) queue.
    pub processed_capacity: usize,
    /// Output width after upscaling.
    pub target_width: u32,
    /// Output height after upscaling.
    pub target_height: u32,
    /// Upscaling algorithm selection.
    pub algorithm: UpscaleAlgorithm,
    /// Request a GPU-accelerated upscaler; falls back to CPU with a
    /// warning when unavailable.
    pub use_gpu: bool,
    /// Occupancy ratio above which capture drops instead of enqueueing.
    pub high_water_mark: f64,
    /// Capture back-off after an admission-control drop, in milliseconds.
    pub capture_backoff_ms: u64,
    /// Display pacing target; 0 disables pacing.
    pub max_display_fps: u32,
    /// Temporal blender settings.
    pub temporal: TemporalConfig,
    /// Dense flow estimation settings.
    pub flow: FlowParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_capacity: 5,
            processed_capacity: 5,
            target_width: 1920,
            target_height: 1080,
            algorithm: UpscaleAlgorithm::Bicubic,
            use_gpu: false,
            high_water_mark: 0.9,
            capture_backoff_ms: 10,
            max_display_fps: 60,
            temporal: TemporalConfig::default(),
            flow: FlowParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate at initialization time. The pipeline refuses to start on
    /// any violation; nothing here is a per-frame error.
    pub fn validate(&self) -> Result<()> {
        if self.raw_capacity == 0 || self.processed_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "target resolution {}x{} is invalid",
                self.target_width, self.target_height
            )));
        }
        if !(0.0..=1.0).contains(&self.high_water_mark) {
            return Err(EngineError::InvalidConfig(format!(
                "high-water mark {} outside [0, 1]",
                self.high_water_mark
            )));
        }
        self.temporal.validate()?;
        self.flow.validate()?;
        Ok(())
    }
}

/// Temporal-consistency blender tuning.
#[derive(Clone, Copy, Debug)]
pub struct TemporalConfig {
    /// History depth `H`: number of previous frames retained for blending.
    pub history_depth: usize,
    /// Weight applied to every historical frame's contribution, in `[0, 1]`.
    pub blend_strength: f32,
    /// Displacement magnitude (pixels) below which a pixel is fully reliable.
    pub motion_threshold: f32,
    /// Reliability falloff constant above the motion threshold.
    pub reliability_falloff: f32,
    /// Age decay constant for historical frame weights (`exp(-age/decay)`).
    pub age_decay: f32,
    /// Combined histogram/MAD score above which a scene cut is declared.
    pub scene_change_threshold: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            history_depth: 3,
            blend_strength: 0.6,
            motion_threshold: 15.0,
            reliability_falloff: 10.0,
            age_decay: 2.0,
            scene_change_threshold: 100.0,
        }
    }
}

impl TemporalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "temporal history depth must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.blend_strength) {
            return Err(EngineError::InvalidConfig(format!(
                "blend strength {} outside [0, 1]",
                self.blend_strength
            )));
        }
        if self.reliability_falloff <= 0.0 || self.age_decay <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "reliability falloff and age decay must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Coarse-to-fine dense flow parameters.
#[derive(Clone, Copy, Debug)]
pub struct FlowParams {
    /// Pyramid levels (1 = full resolution only).
    pub levels: usize,
    /// Matching window radius in pixels (window edge = 2r + 1).
    pub window_radius: usize,
    /// Search radius around the propagated displacement, per level.
    pub search_radius: usize,
    /// Refinement iterations per level.
    pub iterations: usize,
    /// Smoothing passes applied to the field after each level.
    pub smoothing_passes: usize,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            levels: 3,
            window_radius: 3,
            search_radius: 2,
            iterations: 2,
            smoothing_passes: 1,
        }
    }
}

impl FlowParams {
    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 || self.iterations == 0 {
            return Err(EngineError::InvalidConfig(
                "flow levels and iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let cfg = PipelineConfig {
            raw_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(crate::error::EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let cfg = PipelineConfig {
            target_height: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_blend_strength_is_rejected() {
        let cfg = PipelineConfig {
            temporal: TemporalConfig {
                blend_strength: 1.5,
                ..TemporalConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
