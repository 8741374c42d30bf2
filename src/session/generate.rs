use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::frames::FrameCache;
use crate::encode::{EncodeJob, EncodedClip, EncoderCapabilities, EncoderChain};
use crate::foundation::core::{FrameRgba, Fps, STICKER_FPS};
use crate::foundation::error::{CountickError, CountickResult};
use crate::memory::{MemoryConfig, MemoryPressure, MemoryProbe, SystemMemoryProbe};
use crate::render::renderer::FrameRenderer;
use crate::render::worker::{RenderWorker, WorkerRequest, WorkerResponse};
use crate::trim::master::MasterClipTrimmer;

/// Caller-enforced upper bound on sticker uploads.
pub const MAX_STICKER_BYTES: usize = 256 * 1024;

/// Frame-count threshold at which generation switches from the direct worker path to
/// chunked in-process rendering: 10 minutes at 1 fps.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 600;

/// Per-request state machine phase, surfaced through progress events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum GeneratePhase {
    /// Request accepted, nothing started.
    Idle,
    /// Consulting the frame cache.
    CacheCheck,
    /// Slicing the master asset.
    TrimPath,
    /// Rendering out-of-line in the worker.
    DirectRender,
    /// Rendering in bounded chunks in the calling thread.
    ChunkedRender,
    /// Driving the encoder chain.
    Encode,
    /// Finished successfully.
    Done,
    /// Terminated with an error.
    Failed,
}

/// One progress event: the active phase plus overall completion on a single 0–100 scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Active phase.
    pub phase: GeneratePhase,
    /// Overall completion, 0–100.
    pub overall: f32,
}

/// Which path produced the clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum GenerateSource {
    /// Every frame came from the cache (exact clip or full second-tier coverage).
    CacheExact,
    /// Re-sliced from a longer cached clip.
    DonorExtract,
    /// Sliced out of the pre-rendered master asset.
    Trimmed,
    /// At least one frame was freshly rendered.
    Rendered,
}

/// Aggregated counters for one generation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct GenerateStats {
    /// Frames required for the duration.
    pub frames_total: u64,
    /// Frames freshly rendered.
    pub frames_rendered: u64,
    /// Frames served from the cache.
    pub frames_from_cache: u64,
    /// Path that produced the clip.
    pub source: GenerateSource,
}

/// Successful generation result.
#[derive(Clone, Debug)]
pub struct GenerateOutput {
    /// The encoded clip.
    pub clip: EncodedClip,
    /// Request counters.
    pub stats: GenerateStats,
    /// Whether the clip fits the configured size bound. Oversize output is reported,
    /// never truncated.
    pub within_size_limit: bool,
}

/// Options controlling one session's generation behavior.
#[derive(Clone, Debug)]
pub struct GenerateOpts {
    /// Output frame rate. The sticker format uses 1 fps.
    pub fps: Fps,
    /// Frame count at which rendering switches to the chunked path.
    pub chunk_threshold: usize,
    /// Size bound reported through [`GenerateOutput::within_size_limit`]. `None` disables
    /// the check.
    pub max_output_bytes: Option<usize>,
    /// Strategy name to try first in the encoder chain.
    pub preferred_encoder: Option<String>,
    /// Re-classify memory pressure every this many chunks.
    pub pressure_check_chunks: usize,
    /// Optional wall-clock bound for a request, checked between chunks.
    pub deadline: Option<Duration>,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        Self {
            fps: STICKER_FPS,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            max_output_bytes: Some(MAX_STICKER_BYTES),
            preferred_encoder: None,
            pressure_check_chunks: 4,
            deadline: None,
        }
    }
}

/// Top-level controller for sticker generation.
///
/// Owns the frame cache and drives cache analysis, trim-vs-render selection, chunk sizing
/// under memory pressure, and the encoder chain. One generation runs at a time (`&mut self`);
/// the caches are single-writer by construction.
pub struct StickerSession {
    renderer: Arc<dyn FrameRenderer>,
    cache: FrameCache,
    chain: EncoderChain,
    caps: EncoderCapabilities,
    trimmer: Option<MasterClipTrimmer>,
    probe: Box<dyn MemoryProbe>,
    opts: GenerateOpts,
    next_worker_id: u64,
}

impl StickerSession {
    /// Create a session around a renderer and a probed capability descriptor.
    pub fn new(
        renderer: Arc<dyn FrameRenderer>,
        caps: EncoderCapabilities,
        opts: GenerateOpts,
    ) -> Self {
        Self {
            renderer,
            cache: FrameCache::new(),
            chain: EncoderChain::default_chain(),
            caps,
            trimmer: None,
            probe: Box::new(SystemMemoryProbe::new()),
            opts,
            next_worker_id: 1,
        }
    }

    /// Enable the master-clip trim path.
    pub fn with_trimmer(mut self, trimmer: MasterClipTrimmer) -> Self {
        self.trimmer = Some(trimmer);
        self
    }

    /// Replace the encoder chain.
    pub fn with_chain(mut self, chain: EncoderChain) -> Self {
        self.chain = chain;
        self
    }

    /// Replace the memory probe.
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Borrow the frame cache.
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// Mutably borrow the frame cache (pre-seeding, explicit clears).
    pub fn cache_mut(&mut self) -> &mut FrameCache {
        &mut self.cache
    }

    /// Generate the clip for a countdown of `duration` seconds.
    ///
    /// `on_progress` receives phase transitions and overall completion on one 0–100 scale.
    pub fn generate(
        &mut self,
        duration: u32,
        on_progress: &mut dyn FnMut(Progress),
    ) -> CountickResult<GenerateOutput> {
        let mut sink = ProgressSink {
            cb: on_progress,
            last: 0.0,
        };
        sink.emit(GeneratePhase::Idle, 0.0);
        match self.generate_inner(duration, &mut sink) {
            Ok(out) => {
                sink.emit(GeneratePhase::Done, 100.0);
                Ok(out)
            }
            Err(e) => {
                let last = sink.last;
                sink.emit(GeneratePhase::Failed, last);
                Err(e)
            }
        }
    }

    /// Map an error to the user-facing message with its remediation hint.
    pub fn failure_message(err: &CountickError) -> String {
        match err {
            CountickError::MemoryPressure(_) => {
                format!("{err}. Try a shorter duration or free up memory and retry.")
            }
            CountickError::RenderSurface(_) => {
                format!("{err}. Reload the rendering surface and try again.")
            }
            CountickError::NoEncoderAvailable(_) => format!(
                "{err}. This runtime lacks WebM codec support; install an ffmpeg build with libvpx."
            ),
            CountickError::DeadlineExceeded(_) => {
                format!("{err}. Raise the deadline or request a shorter duration.")
            }
            _ => format!("sticker generation failed: {err}"),
        }
    }

    fn generate_inner(
        &mut self,
        duration: u32,
        sink: &mut ProgressSink<'_>,
    ) -> CountickResult<GenerateOutput> {
        let total_required = u64::from(duration) + 1;
        let start = Instant::now();
        sink.emit(GeneratePhase::CacheCheck, 0.0);

        // Exact repeat: the duration tier already holds the full sequence.
        if let Some(clip_frames) = self.cache.clip(duration) {
            tracing::debug!(duration, "duration cache hit");
            let frames = clip_frames.to_vec();
            let clip = self.encode_sequence(&frames, 0.0, sink)?;
            return Ok(self.finish(
                clip,
                GenerateStats {
                    frames_total: total_required,
                    frames_rendered: 0,
                    frames_from_cache: total_required,
                    source: GenerateSource::CacheExact,
                },
            ));
        }

        let analysis = self.cache.analyze(duration);
        tracing::debug!(
            duration,
            cached = analysis.cached_count,
            hit_rate = analysis.hit_rate,
            donor = ?analysis.donor,
            "cache analysis"
        );

        // Full second-tier coverage: assemble and skip rendering entirely.
        if analysis.need_generation == 0 {
            let frames = self.cache.assemble(duration)?;
            self.cache.put_clip(duration, frames.clone())?;
            let clip = self.encode_sequence(&frames, 0.0, sink)?;
            return Ok(self.finish(
                clip,
                GenerateStats {
                    frames_total: total_required,
                    frames_rendered: 0,
                    frames_from_cache: total_required,
                    source: GenerateSource::CacheExact,
                },
            ));
        }

        // Donor reuse: a longer cached clip covers this request. Duration 0 bypasses
        // extraction (degenerate stride) and falls through to a single-frame render.
        if duration > 0
            && let Some(donor_duration) = analysis.donor
        {
            let donor_frames = self
                .cache
                .clip(donor_duration)
                .map(|frames| frames.to_vec())
                .ok_or_else(|| {
                    CountickError::extraction(format!(
                        "analysis reported donor {donor_duration} but the clip is gone"
                    ))
                })?;
            let frames = FrameCache::extract_subset(donor_duration, &donor_frames, duration)?;
            tracing::debug!(duration, donor_duration, "served by donor extraction");
            self.cache.put_clip(duration, frames.clone())?;
            let clip = self.encode_sequence(&frames, 0.0, sink)?;
            return Ok(self.finish(
                clip,
                GenerateStats {
                    frames_total: total_required,
                    frames_rendered: 0,
                    frames_from_cache: total_required,
                    source: GenerateSource::DonorExtract,
                },
            ));
        }

        // Trim path: slice the master asset instead of rendering. Any failure falls back.
        if let Some(trimmer) = self.trimmer.as_mut()
            && trimmer.can_handle(duration)
        {
            sink.emit(GeneratePhase::TrimPath, 0.0);
            let outcome = trimmer.trim(duration, &mut |p| sink.emit(GeneratePhase::TrimPath, p));
            match (outcome.success, outcome.clip) {
                (true, Some(clip)) => {
                    tracing::debug!(duration, size = clip.size(), "served by master trim");
                    return Ok(self.finish(
                        clip,
                        GenerateStats {
                            frames_total: total_required,
                            frames_rendered: 0,
                            frames_from_cache: 0,
                            source: GenerateSource::Trimmed,
                        },
                    ));
                }
                _ => {
                    tracing::warn!(
                        duration,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "trim path failed, falling back to rendering"
                    );
                }
            }
        }

        // Render path: only the gaps when the renderer supports partial requests.
        let missing: Vec<u32> = if self.renderer.supports_partial() {
            analysis.missing
        } else {
            (0..=duration).collect()
        };
        let rendered_count = missing.len() as u64;

        let direct = total_required < self.opts.chunk_threshold as u64;
        if direct {
            self.render_direct(&missing, sink)?;
        } else {
            self.render_chunked(&missing, total_required, start, sink)?;
        }

        let frames = self.cache.assemble(duration)?;
        self.cache.put_clip(duration, frames.clone())?;
        let encode_band = if direct { 50.0 } else { 100.0 };
        let clip = self.encode_sequence(&frames, encode_band, sink)?;
        Ok(self.finish(
            clip,
            GenerateStats {
                frames_total: total_required,
                frames_rendered: rendered_count,
                frames_from_cache: total_required - rendered_count,
                source: GenerateSource::Rendered,
            },
        ))
    }

    /// Render `missing` on the out-of-line worker; progress maps to the 0–50 band.
    ///
    /// The worker handle terminates its thread on drop, so success and every early-error
    /// return leave no orphaned worker behind.
    fn render_direct(&mut self, missing: &[u32], sink: &mut ProgressSink<'_>) -> CountickResult<()> {
        sink.emit(GeneratePhase::DirectRender, 0.0);
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;

        let worker = RenderWorker::spawn(self.renderer.clone());
        worker.request(WorkerRequest::Generate {
            seconds: missing.to_vec(),
            worker_id,
        })?;

        let frames = loop {
            match worker.responses().recv() {
                Ok(WorkerResponse::Progress { progress, worker_id: id }) if id == worker_id => {
                    sink.emit(GeneratePhase::DirectRender, progress * 0.5);
                }
                Ok(WorkerResponse::Complete { frames, worker_id: id }) if id == worker_id => {
                    break frames;
                }
                Ok(WorkerResponse::Error { error, .. }) => {
                    return Err(CountickError::render_surface(error));
                }
                Ok(_) => {}
                Err(_) => {
                    return Err(CountickError::render_surface(
                        "render worker channel disconnected",
                    ));
                }
            }
        };

        for (s, frame) in frames {
            self.cache.put_frame(s, frame);
        }
        Ok(())
    }

    /// Render `missing` in memory-adapted chunks in the calling thread, pausing between
    /// chunks so the allocator gets a reclamation window.
    fn render_chunked(
        &mut self,
        missing: &[u32],
        total_required: u64,
        start: Instant,
        sink: &mut ProgressSink<'_>,
    ) -> CountickResult<()> {
        sink.emit(GeneratePhase::ChunkedRender, 0.0);
        let mut pressure = MemoryPressure::classify(self.probe.used_fraction());
        if pressure >= MemoryPressure::Warning {
            tracing::warn!(?pressure, "memory degraded before chunked render");
        }
        let mut cfg = MemoryConfig::for_pressure(pressure);

        let renderer = self.renderer.clone();
        let total_missing = missing.len();
        let already_cached = total_required - total_missing as u64;
        let mut done = 0usize;
        let mut chunk_index = 0usize;

        while done < total_missing {
            if let Some(deadline) = self.opts.deadline
                && start.elapsed() > deadline
            {
                return Err(CountickError::deadline(format!(
                    "chunked render exceeded {deadline:?} after {done}/{total_missing} frames"
                )));
            }
            if chunk_index > 0 && chunk_index.is_multiple_of(self.opts.pressure_check_chunks.max(1))
            {
                pressure = MemoryPressure::classify(self.probe.used_fraction());
                let next = MemoryConfig::for_pressure(pressure);
                if next != cfg {
                    tracing::debug!(
                        ?pressure,
                        chunk_size = next.chunk_size,
                        "memory pressure changed, adapting chunks"
                    );
                    cfg = next;
                }
            }

            let end = (done + cfg.chunk_size).min(total_missing);
            for &s in &missing[done..end] {
                let frame = renderer.render(s).map_err(|e| {
                    if pressure >= MemoryPressure::Critical {
                        CountickError::memory_pressure(format!(
                            "rendering failed under {pressure:?} memory pressure: {e}"
                        ))
                    } else {
                        e
                    }
                })?;
                self.cache.put_frame(s, Arc::new(frame));
            }
            done = end;

            let overall = (already_cached + done as u64) as f32 / total_required as f32 * 100.0;
            sink.emit(GeneratePhase::ChunkedRender, overall);

            if done < total_missing && !cfg.inter_chunk_pause.is_zero() {
                std::thread::sleep(cfg.inter_chunk_pause);
            }
            chunk_index += 1;
        }
        Ok(())
    }

    /// Drive the encoder chain, remapping its 0–100 progress into the remaining band.
    fn encode_sequence(
        &self,
        frames: &[Arc<FrameRgba>],
        band_start: f32,
        sink: &mut ProgressSink<'_>,
    ) -> CountickResult<EncodedClip> {
        sink.emit(GeneratePhase::Encode, band_start);
        let job = EncodeJob::new(frames, self.opts.fps)?;
        let span = 100.0 - band_start;
        let preferred = self.opts.preferred_encoder.as_deref();
        self.chain.encode(&job, &self.caps, preferred, &mut |p| {
            sink.emit(GeneratePhase::Encode, band_start + p / 100.0 * span);
        })
    }

    fn finish(&self, clip: EncodedClip, stats: GenerateStats) -> GenerateOutput {
        let within_size_limit = self.opts.max_output_bytes.is_none_or(|m| clip.size() <= m);
        if !within_size_limit {
            tracing::warn!(
                size = clip.size(),
                limit = ?self.opts.max_output_bytes,
                "encoded clip exceeds the configured size bound"
            );
        }
        GenerateOutput {
            clip,
            stats,
            within_size_limit,
        }
    }
}

struct ProgressSink<'a> {
    cb: &'a mut dyn FnMut(Progress),
    last: f32,
}

impl ProgressSink<'_> {
    fn emit(&mut self, phase: GeneratePhase, overall: f32) {
        self.last = overall;
        (self.cb)(Progress { phase, overall });
    }
}
