//! Frame rendering seam and the out-of-line render worker.
//!
//! Pixel production is a caller-supplied [`renderer::FrameRenderer`]; the engine only decides
//! what to render, where, and when.

/// The renderer trait and the built-in block-digit implementation.
pub mod renderer;
/// Worker thread with typed request/response messages.
pub mod worker;
