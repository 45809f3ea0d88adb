//! Typed error hierarchy for the pipeline.
//!
//! Uses `thiserror` for library-grade errors. Per-frame processing
//! failures (upscale, filter, flow) are recoverable by contract: stage
//! loops log them and degrade to pass-through instead of propagating.
//!
//! # Error codes
//!
//! Each variant maps to a stable integer code via [`EngineError::error_code`]
//! for structured telemetry without string parsing.

/// All errors originating from the framelift engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot change {0} while the pipeline is running")]
    ReconfigureWhileRunning(&'static str),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Pipeline is already running")]
    AlreadyRunning,

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Pipeline shutdown signal received")]
    Shutdown,

    // ── Frame contracts ──────────────────────────────────────────────
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty frame rejected")]
    EmptyFrame,

    // ── Collaborators ────────────────────────────────────────────────
    #[error("Source error: {0}")]
    Source(String),

    #[error("Upscale error: {0}")]
    Upscale(String),

    #[error("Filter '{name}' failed: {message}")]
    Filter { name: &'static str, message: String },

    #[error("Motion estimation error: {0}")]
    Motion(String),

    #[error("Sink error: {0}")]
    Sink(String),

    // ── I/O ──────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

impl EngineError {
    /// Stable integer error code for structured telemetry.
    ///
    /// Codes are grouped by category:
    /// - 1xx: configuration/lifecycle
    /// - 2xx: frame contracts
    /// - 3xx: collaborators
    /// - 4xx: I/O
    pub fn error_code(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 100,
            Self::ReconfigureWhileRunning(_) => 101,
            Self::AlreadyRunning => 102,
            Self::Pipeline(_) => 103,
            Self::Shutdown => 104,
            Self::DimensionMismatch(_) => 200,
            Self::EmptyFrame => 201,
            Self::Source(_) => 300,
            Self::Upscale(_) => 301,
            Self::Filter { .. } => 302,
            Self::Motion(_) => 303,
            Self::Sink(_) => 304,
            Self::Io(_) => 400,
            Self::Image(_) => 401,
        }
    }

    /// Whether the pipeline can continue after logging this error.
    ///
    /// Recoverable errors degrade to pass-through of the unmodified frame;
    /// non-recoverable ones prevent startup or force shutdown.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Upscale(_)
                | Self::Filter { .. }
                | Self::Motion(_)
                | Self::DimensionMismatch(_)
                | Self::EmptyFrame
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn per_frame_failures_are_recoverable() {
        assert!(EngineError::Upscale("oom".into()).is_recoverable());
        assert!(EngineError::Motion("size mismatch".into()).is_recoverable());
        assert!(!EngineError::InvalidConfig("capacity 0".into()).is_recoverable());
        assert!(!EngineError::AlreadyRunning.is_recoverable());
    }

    #[test]
    fn error_codes_are_grouped_by_category() {
        assert_eq!(EngineError::InvalidConfig(String::new()).error_code(), 100);
        assert_eq!(EngineError::EmptyFrame.error_code(), 201);
        assert_eq!(EngineError::Sink(String::new()).error_code(), 304);
    }
}
