//! Adaptive encoding: interchangeable strategies turning a frame sequence into one WebM blob.
//!
//! Strategies are capability-probed and chained with automatic fallback; a strategy that fails
//! mid-encode is logged and the next supported one is tried, so a single bad encoder build
//! degrades quality instead of failing the request.

/// `ffmpeg`-backed WebM strategies (VP9/VP8 with alpha) and the capability probe.
pub mod ffmpeg;

use std::collections::BTreeSet;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::core::{FrameRgba, Fps};
use crate::foundation::error::{CountickError, CountickResult};

/// Container/codec tag for VP9 WebM output.
pub const WEBM_VP9_MIME: &str = "video/webm;codecs=vp9";
/// Container/codec tag for VP8 WebM output.
pub const WEBM_VP8_MIME: &str = "video/webm;codecs=vp8";

/// Explicit descriptor of the codec encoders available to this process.
///
/// Probed once (see [`ffmpeg::probe_capabilities`]) and passed into the session at construction
/// time so tests can inject arbitrary capability sets without touching process-wide state.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncoderCapabilities {
    encoders: BTreeSet<String>,
}

impl EncoderCapabilities {
    /// Build a descriptor from encoder names.
    pub fn new(encoders: impl IntoIterator<Item = String>) -> Self {
        Self {
            encoders: encoders.into_iter().collect(),
        }
    }

    /// Add one encoder name.
    pub fn with_encoder(mut self, name: impl Into<String>) -> Self {
        self.encoders.insert(name.into());
        self
    }

    /// Whether the named codec encoder is available.
    pub fn supports(&self, encoder: &str) -> bool {
        self.encoders.contains(encoder)
    }

    /// Whether no encoder at all is available.
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

/// One encoding request: an ordered frame sequence plus output parameters.
///
/// Stateless; constructed fresh per request.
#[derive(Clone, Debug)]
pub struct EncodeJob<'a> {
    /// Frames in playback order.
    pub frames: &'a [Arc<FrameRgba>],
    /// Output frame rate. Each frame gets exactly `den/num` seconds.
    pub fps: Fps,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl<'a> EncodeJob<'a> {
    /// Create a validated job over a non-empty, uniformly sized frame sequence.
    ///
    /// Dimensions must be even: the alpha-capable `yuva420p` pixel format subsamples chroma.
    pub fn new(frames: &'a [Arc<FrameRgba>], fps: Fps) -> CountickResult<Self> {
        let first = frames.first().ok_or_else(|| {
            CountickError::encoding("encode job requires at least one frame")
        })?;
        let (width, height) = (first.width, first.height);
        if width == 0 || height == 0 {
            return Err(CountickError::encoding("frame dimensions must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(CountickError::encoding(
                "frame dimensions must be even (required for yuva420p output)",
            ));
        }
        for (i, f) in frames.iter().enumerate() {
            if f.width != width || f.height != height {
                return Err(CountickError::encoding(format!(
                    "frame {i} is {}x{}, expected {width}x{height}",
                    f.width, f.height
                )));
            }
            if f.data.len() != (width as usize) * (height as usize) * 4 {
                return Err(CountickError::encoding(format!(
                    "frame {i} data length does not match {width}x{height} RGBA8"
                )));
            }
        }
        Ok(Self {
            frames,
            fps,
            width,
            height,
        })
    }
}

/// A finished clip: one binary blob tagged with its container/codec MIME string.
#[derive(Clone, Debug)]
pub struct EncodedClip {
    /// The WebM file bytes.
    pub bytes: Vec<u8>,
    /// Container + codec tag, e.g. [`WEBM_VP9_MIME`].
    pub mime: &'static str,
}

impl EncodedClip {
    /// Blob size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// One interchangeable encoder.
///
/// `encode` reports progress proportionally (0–100) as frames are consumed and must release
/// every acquired resource (child process, temp file, scratch surface) on all exit paths.
pub trait EncodeStrategy: Send + Sync {
    /// Stable strategy name, usable as the preferred-encoder selector.
    fn name(&self) -> &'static str;
    /// Whether this strategy can run under the given capabilities.
    fn is_supported(&self, caps: &EncoderCapabilities) -> bool;
    /// Encode the job into a single blob.
    fn encode(
        &self,
        job: &EncodeJob<'_>,
        progress: &mut dyn FnMut(f32),
    ) -> CountickResult<EncodedClip>;
}

/// Prioritized strategy chain with automatic fallback.
pub struct EncoderChain {
    strategies: Vec<Box<dyn EncodeStrategy>>,
}

impl EncoderChain {
    /// Build a chain from strategies in preference order.
    pub fn new(strategies: Vec<Box<dyn EncodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// The built-in chain: VP9 quality, then VP9 realtime, then VP8.
    pub fn default_chain() -> Self {
        Self::new(vec![
            Box::new(ffmpeg::Vp9QualityEncoder),
            Box::new(ffmpeg::Vp9RealtimeEncoder),
            Box::new(ffmpeg::Vp8Encoder),
        ])
    }

    /// Strategy names in preference order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Encode `job` with the first working strategy.
    ///
    /// A supported `preferred` strategy is tried first; otherwise the chain order decides. When
    /// no strategy is supported at all this fails with
    /// [`CountickError::NoEncoderAvailable`] — exactly once, without invoking any encoder. A
    /// supported strategy that fails mid-encode is logged and the next supported one is tried;
    /// the error propagates as [`CountickError::Encoding`] only once every candidate has been
    /// exhausted.
    pub fn encode(
        &self,
        job: &EncodeJob<'_>,
        caps: &EncoderCapabilities,
        preferred: Option<&str>,
        progress: &mut dyn FnMut(f32),
    ) -> CountickResult<EncodedClip> {
        let mut order: SmallVec<[&dyn EncodeStrategy; 4]> = SmallVec::new();
        if let Some(name) = preferred {
            match self
                .strategies
                .iter()
                .find(|s| s.name() == name && s.is_supported(caps))
            {
                Some(s) => order.push(s.as_ref()),
                None => {
                    tracing::warn!(encoder = name, "preferred encoder unavailable, using chain order");
                }
            }
        }
        for s in &self.strategies {
            if s.is_supported(caps) && !order.iter().any(|o| o.name() == s.name()) {
                order.push(s.as_ref());
            }
        }
        if order.is_empty() {
            return Err(CountickError::no_encoder(
                "no supported encoding strategy in chain",
            ));
        }

        let mut attempts: SmallVec<[(&'static str, String); 4]> = SmallVec::new();
        for strategy in order {
            match strategy.encode(job, progress) {
                Ok(clip) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            strategy = strategy.name(),
                            failed = attempts.len(),
                            "encoded after fallback"
                        );
                    }
                    return Ok(clip);
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %e,
                        "encoding strategy failed, trying next"
                    );
                    attempts.push((strategy.name(), e.to_string()));
                }
            }
        }

        let detail = attempts
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(CountickError::encoding(format!(
            "all encoding strategies failed: {detail}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStrategy {
        name: &'static str,
        supported: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        fn boxed(
            name: &'static str,
            supported: bool,
            fail: bool,
            calls: &Arc<AtomicUsize>,
        ) -> Box<dyn EncodeStrategy> {
            Box::new(Self {
                name,
                supported,
                fail,
                calls: calls.clone(),
            })
        }
    }

    impl EncodeStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_supported(&self, _caps: &EncoderCapabilities) -> bool {
            self.supported
        }

        fn encode(
            &self,
            job: &EncodeJob<'_>,
            progress: &mut dyn FnMut(f32),
        ) -> CountickResult<EncodedClip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CountickError::encoding("synthetic failure"));
            }
            progress(100.0);
            Ok(EncodedClip {
                bytes: vec![0u8; job.frames.len()],
                mime: WEBM_VP9_MIME,
            })
        }
    }

    fn frames(n: usize) -> Vec<Arc<FrameRgba>> {
        (0..n).map(|_| Arc::new(FrameRgba::transparent(4, 4))).collect()
    }

    #[test]
    fn job_rejects_empty_and_mismatched_frames() {
        assert!(EncodeJob::new(&[], crate::foundation::core::STICKER_FPS).is_err());

        let mut mixed = frames(2);
        mixed[1] = Arc::new(FrameRgba::transparent(8, 8));
        assert!(EncodeJob::new(&mixed, crate::foundation::core::STICKER_FPS).is_err());
    }

    #[test]
    fn job_rejects_odd_dimensions() {
        let odd = vec![Arc::new(FrameRgba::transparent(5, 4))];
        assert!(EncodeJob::new(&odd, crate::foundation::core::STICKER_FPS).is_err());
    }

    #[test]
    fn first_supported_strategy_wins() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let chain = EncoderChain::new(vec![
            FakeStrategy::boxed("a", false, false, &calls_a),
            FakeStrategy::boxed("b", true, false, &calls_b),
        ]);

        let fs = frames(3);
        let job = EncodeJob::new(&fs, crate::foundation::core::STICKER_FPS).unwrap();
        let clip = chain
            .encode(&job, &EncoderCapabilities::default(), None, &mut |_| {})
            .unwrap();
        assert_eq!(clip.size(), 3);
        assert_eq!(calls_a.load(Ordering::SeqCst), 0);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_strategy_falls_back_to_next_supported() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let chain = EncoderChain::new(vec![
            FakeStrategy::boxed("a", true, true, &calls_a),
            FakeStrategy::boxed("b", true, false, &calls_b),
        ]);

        let fs = frames(2);
        let job = EncodeJob::new(&fs, crate::foundation::core::STICKER_FPS).unwrap();
        chain
            .encode(&job, &EncoderCapabilities::default(), None, &mut |_| {})
            .unwrap();
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preferred_strategy_is_tried_first() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let chain = EncoderChain::new(vec![
            FakeStrategy::boxed("a", true, false, &calls_a),
            FakeStrategy::boxed("b", true, false, &calls_b),
        ]);

        let fs = frames(1);
        let job = EncodeJob::new(&fs, crate::foundation::core::STICKER_FPS).unwrap();
        chain
            .encode(&job, &EncoderCapabilities::default(), Some("b"), &mut |_| {})
            .unwrap();
        assert_eq!(calls_a.load(Ordering::SeqCst), 0);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_supported_strategy_raises_no_encoder_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = EncoderChain::new(vec![
            FakeStrategy::boxed("a", false, false, &calls),
            FakeStrategy::boxed("b", false, false, &calls),
        ]);

        let fs = frames(1);
        let job = EncodeJob::new(&fs, crate::foundation::core::STICKER_FPS).unwrap();
        let err = chain
            .encode(&job, &EncoderCapabilities::default(), None, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CountickError::NoEncoderAvailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhausted_chain_propagates_encoding_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = EncoderChain::new(vec![
            FakeStrategy::boxed("a", true, true, &calls),
            FakeStrategy::boxed("b", true, true, &calls),
        ]);

        let fs = frames(1);
        let job = EncodeJob::new(&fs, crate::foundation::core::STICKER_FPS).unwrap();
        let err = chain
            .encode(&job, &EncoderCapabilities::default(), None, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CountickError::Encoding(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capabilities_describe_probed_encoders() {
        let caps = EncoderCapabilities::default().with_encoder("libvpx-vp9");
        assert!(caps.supports("libvpx-vp9"));
        assert!(!caps.supports("libvpx"));
        assert!(!caps.is_empty());
        assert!(EncoderCapabilities::default().is_empty());
    }
}
