use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::encode::ffmpeg::{TempFileGuard, is_ffmpeg_on_path, temp_media_path};
use crate::encode::{EncodedClip, WEBM_VP9_MIME};
use crate::foundation::core::{Fps, STICKER_DIM, STICKER_FPS};
use crate::foundation::error::{CountickError, CountickResult};

/// Length of the pre-rendered master asset: one hour minus one second.
pub const MAX_TRIM_DURATION_SECS: u32 = 3599;

/// WebM files start with the EBML magic.
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Result of a trim attempt.
///
/// Stage failures populate `error` instead of propagating, so the orchestrator falls back to
/// full rendering without a catch around an error type.
#[derive(Clone, Debug)]
pub struct TrimOutcome {
    /// The trimmed clip on success.
    pub clip: Option<EncodedClip>,
    /// Blob size in bytes (0 on failure).
    pub size: usize,
    /// Whether the trim produced a clip.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl TrimOutcome {
    fn succeeded(clip: EncodedClip) -> Self {
        Self {
            size: clip.size(),
            clip: Some(clip),
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            clip: None,
            size: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Alternate fast path: slice a bounded-length pre-rendered master clip instead of rendering.
///
/// Strictly an optimization — every failure here is recoverable by the render path, and the
/// orchestrator treats it that way.
pub struct MasterClipTrimmer {
    asset_path: PathBuf,
    max_trim_secs: u32,
    fps: Fps,
    master: Option<Vec<u8>>,
}

impl MasterClipTrimmer {
    /// Create a trimmer over the master asset at `asset_path` with the default bound.
    pub fn new(asset_path: impl Into<PathBuf>) -> Self {
        Self::with_bound(asset_path, MAX_TRIM_DURATION_SECS)
    }

    /// Create a trimmer with an explicit duration bound (the master asset's length).
    pub fn with_bound(asset_path: impl Into<PathBuf>, max_trim_secs: u32) -> Self {
        Self {
            asset_path: asset_path.into(),
            max_trim_secs,
            fps: STICKER_FPS,
            master: None,
        }
    }

    /// Whether a duration is inside the master asset's bound.
    pub fn can_handle(&self, duration: u32) -> bool {
        duration > 0 && duration <= self.max_trim_secs
    }

    /// The configured duration bound.
    pub fn max_trim_secs(&self) -> u32 {
        self.max_trim_secs
    }

    /// Fetch and memoize the master asset, validating the WebM magic.
    fn master_bytes(&mut self) -> CountickResult<&[u8]> {
        if self.master.is_none() {
            let bytes = std::fs::read(&self.asset_path).map_err(|e| {
                CountickError::trim_unavailable(format!(
                    "failed to read master asset '{}': {e}",
                    self.asset_path.display()
                ))
            })?;
            if bytes.len() < EBML_MAGIC.len() || bytes[..EBML_MAGIC.len()] != EBML_MAGIC {
                return Err(CountickError::trim_unavailable(format!(
                    "master asset '{}' is not a WebM file",
                    self.asset_path.display()
                )));
            }
            tracing::debug!(bytes = bytes.len(), "master asset cached");
            self.master = Some(bytes);
        }
        match &self.master {
            Some(bytes) => Ok(bytes),
            None => Err(CountickError::trim_unavailable("master asset cache empty")),
        }
    }

    /// Slice `[0, duration]` out of the master asset and re-encode it to the sticker format.
    ///
    /// Output is constrained to the sticker dimensions and frame rate and tagged with the same
    /// WebM/VP9 container as the render path.
    pub fn trim(&mut self, duration: u32, progress: &mut dyn FnMut(f32)) -> TrimOutcome {
        if !self.can_handle(duration) {
            return TrimOutcome::failed(
                CountickError::invalid_duration(format!(
                    "trim supports 1..={} seconds, got {duration}",
                    self.max_trim_secs
                ))
                .to_string(),
            );
        }
        progress(5.0);

        if !is_ffmpeg_on_path() {
            return TrimOutcome::failed("ffmpeg is required for trimming but was not found on PATH");
        }

        let master = match self.master_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return TrimOutcome::failed(e.to_string()),
        };
        progress(25.0);

        let in_path = temp_media_path("trim_in", "webm");
        let in_guard = TempFileGuard(Some(in_path.clone()));
        if let Err(e) = std::fs::write(&in_path, master) {
            return TrimOutcome::failed(format!("failed to stage master asset: {e}"));
        }

        let out_path = temp_media_path("trim_out", "webm");
        let out_guard = TempFileGuard(Some(out_path.clone()));

        // A countdown from `duration` covers duration + 1 one-second frames.
        let keep_secs = duration + 1;
        let result = Command::new("ffmpeg")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(&in_path)
            .args([
                "-t",
                &keep_secs.to_string(),
                "-vf",
                &format!("scale={STICKER_DIM}:{STICKER_DIM}"),
                "-r",
                &format!("{}/{}", self.fps.num, self.fps.den),
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuva420p",
                "-crf",
                "30",
                "-b:v",
                "0",
                "-auto-alt-ref",
                "0",
                "-an",
                "-f",
                "webm",
            ])
            .arg(&out_path)
            .output();
        progress(90.0);

        let output = match result {
            Ok(out) => out,
            Err(e) => return TrimOutcome::failed(format!("failed to run ffmpeg: {e}")),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return TrimOutcome::failed(format!(
                "ffmpeg trim exited with status {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let bytes = match std::fs::read(&out_path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return TrimOutcome::failed("trim produced an empty output"),
            Err(e) => return TrimOutcome::failed(format!("failed to read trim output: {e}")),
        };
        drop(in_guard);
        drop(out_guard);
        progress(100.0);

        TrimOutcome::succeeded(EncodedClip {
            bytes,
            mime: WEBM_VP9_MIME,
        })
    }
}
