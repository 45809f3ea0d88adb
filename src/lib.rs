//! Framelift — real-time video enhancement pipeline.
//!
//! # Architecture
//!
//! Three concurrent stages on dedicated OS threads, connected by bounded
//! blocking frame queues:
//!
//! ```text
//! ┌─────────┐  queue(C)  ┌─────────┐  queue(C)  ┌─────────┐
//! │ Capture │───────────►│ Process │───────────►│ Display │
//! │(source) │            │(upscale │            │ (sink)  │
//! └─────────┘            │ +blend) │            └─────────┘
//!                        └─────────┘
//! ```
//!
//! Capture applies admission control (drops before the raw queue is
//! actually full), the process stage runs the upscaler and filter chain
//! ending in the temporal blender, and the display stage paces frames to
//! the sink. Shutdown is cooperative: a shared atomic flag, checked at
//! loop tops and at every blocking queue wait.
//!
//! # Module layout
//!
//! - [`core`] — frame/flow types, configuration, shared context, collaborator traits
//! - [`engine`] — queues, motion estimation, temporal blending, stage loops, orchestrator
//! - [`filters`] — upscaler and filter implementations
//! - [`io`] — frame sources and output sinks
//! - [`error`] — typed error hierarchy

pub mod core;
pub mod engine;
pub mod error;
pub mod filters;
pub mod io;
