//! countick renders countdown-timer stickers: short alpha-channel WebM clips counting a
//! duration down to zero.
//!
//! The engine caches every rendered frame so identical or overlapping durations regenerate
//! near-instantly. The public API is session-oriented:
//!
//! - Supply a [`FrameRenderer`] (or use the built-in [`BlockDigitRenderer`])
//! - Probe encoder capabilities once with [`probe_capabilities`]
//! - Create a [`StickerSession`] and call [`StickerSession::generate`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Two-tier frame cache.
pub mod cache;
/// Encoding strategies and the fallback chain.
pub mod encode;
/// Memory-pressure classification for chunked rendering.
pub mod memory;
/// Frame renderer seam and render worker.
pub mod render;
/// Session-oriented generation API.
pub mod session;
/// Master-clip trimming fast path.
pub mod trim;

pub use crate::foundation::core::{
    FrameRgba, Fps, STICKER_DIM, STICKER_FPS, format_remaining,
};
pub use crate::foundation::error::{CountickError, CountickResult};

pub use crate::cache::frames::{CacheAnalysis, CacheSizeInfo, FrameCache};
pub use crate::encode::ffmpeg::{
    Vp8Encoder, Vp9QualityEncoder, Vp9RealtimeEncoder, is_ffmpeg_on_path, probe_capabilities,
};
pub use crate::encode::{
    EncodeJob, EncodeStrategy, EncodedClip, EncoderCapabilities, EncoderChain, WEBM_VP8_MIME,
    WEBM_VP9_MIME,
};
pub use crate::memory::{
    FixedMemoryProbe, MemoryConfig, MemoryPressure, MemoryProbe, SystemMemoryProbe,
};
pub use crate::render::renderer::{BlockDigitRenderer, FrameRenderer};
pub use crate::render::worker::{RenderWorker, WorkerRequest, WorkerResponse};
pub use crate::session::generate::{
    DEFAULT_CHUNK_THRESHOLD, GenerateOpts, GenerateOutput, GeneratePhase, GenerateSource,
    GenerateStats, MAX_STICKER_BYTES, Progress, StickerSession,
};
pub use crate::trim::master::{MAX_TRIM_DURATION_SECS, MasterClipTrimmer, TrimOutcome};
