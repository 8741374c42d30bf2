use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::encode::{
    EncodeJob, EncodeStrategy, EncodedClip, EncoderCapabilities, WEBM_VP8_MIME, WEBM_VP9_MIME,
};
use crate::foundation::error::{CountickError, CountickResult};

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe the codec encoders the system `ffmpeg` build offers.
///
/// Returns an empty descriptor when `ffmpeg` is not on `PATH`. Call once and pass the value
/// into the session; there is no process-global cache.
pub fn probe_capabilities() -> EncoderCapabilities {
    if !is_ffmpeg_on_path() {
        return EncoderCapabilities::default();
    }
    let output = match Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(out) if out.status.success() => out,
        _ => return EncoderCapabilities::default(),
    };

    // Encoder listing rows look like " V....D libvpx-vp9    libvpx VP9 encoder".
    let text = String::from_utf8_lossy(&output.stdout);
    let names = text.lines().filter_map(|line| {
        let mut fields = line.split_whitespace();
        let flags = fields.next()?;
        if !flags.starts_with('V') {
            return None;
        }
        fields.next().map(str::to_owned)
    });
    EncoderCapabilities::new(names)
}

/// VP9 WebM at quality settings. First choice of the default chain.
pub struct Vp9QualityEncoder;

impl EncodeStrategy for Vp9QualityEncoder {
    fn name(&self) -> &'static str {
        "vp9-quality"
    }

    fn is_supported(&self, caps: &EncoderCapabilities) -> bool {
        caps.supports("libvpx-vp9")
    }

    fn encode(
        &self,
        job: &EncodeJob<'_>,
        progress: &mut dyn FnMut(f32),
    ) -> CountickResult<EncodedClip> {
        encode_rawvideo_webm(
            job,
            progress,
            &[
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
                "-row-mt",
                "1",
            ],
            WEBM_VP9_MIME,
        )
    }
}

/// VP9 WebM at realtime deadline. Faster and slightly larger output than quality mode.
pub struct Vp9RealtimeEncoder;

impl EncodeStrategy for Vp9RealtimeEncoder {
    fn name(&self) -> &'static str {
        "vp9-realtime"
    }

    fn is_supported(&self, caps: &EncoderCapabilities) -> bool {
        caps.supports("libvpx-vp9")
    }

    fn encode(
        &self,
        job: &EncodeJob<'_>,
        progress: &mut dyn FnMut(f32),
    ) -> CountickResult<EncodedClip> {
        encode_rawvideo_webm(
            job,
            progress,
            &[
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuva420p",
                "-deadline",
                "realtime",
                "-cpu-used",
                "8",
                "-crf",
                "34",
                "-b:v",
                "0",
                "-auto-alt-ref",
                "0",
            ],
            WEBM_VP9_MIME,
        )
    }
}

/// VP8 WebM. Last resort for `ffmpeg` builds without the VP9 encoder.
pub struct Vp8Encoder;

impl EncodeStrategy for Vp8Encoder {
    fn name(&self) -> &'static str {
        "vp8"
    }

    fn is_supported(&self, caps: &EncoderCapabilities) -> bool {
        caps.supports("libvpx")
    }

    fn encode(
        &self,
        job: &EncodeJob<'_>,
        progress: &mut dyn FnMut(f32),
    ) -> CountickResult<EncodedClip> {
        encode_rawvideo_webm(
            job,
            progress,
            &[
                "-c:v",
                "libvpx",
                "-pix_fmt",
                "yuva420p",
                "-crf",
                "12",
                "-b:v",
                "1M",
                "-auto-alt-ref",
                "0",
            ],
            WEBM_VP8_MIME,
        )
    }
}

/// Stream the job's frames into a spawned `ffmpeg` as rawvideo RGBA and read back the WebM.
///
/// The input `-r` rate gives frame `i` timestamp `i * den/num` seconds exactly; at 1 fps that
/// is `i` seconds with 1-second durations. The scratch surface is cleared before each frame and
/// frames are written straight-alpha so transparency survives into `yuva420p`. The child
/// process, its stderr drain and the output temp file are released on every exit path.
fn encode_rawvideo_webm(
    job: &EncodeJob<'_>,
    progress: &mut dyn FnMut(f32),
    codec_args: &[&str],
    mime: &'static str,
) -> CountickResult<EncodedClip> {
    let out_path = temp_media_path("encode", "webm");
    let out_guard = TempFileGuard(Some(out_path.clone()));

    let mut cmd = Command::new("ffmpeg");
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd.args([
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &format!("{}x{}", job.width, job.height),
        "-r",
        &format!("{}/{}", job.fps.num, job.fps.den),
        "-i",
        "pipe:0",
        "-an",
    ]);
    cmd.args(codec_args);
    cmd.args(["-f", "webm"]);
    cmd.arg(&out_path);

    let child = cmd.spawn().map_err(|e| {
        CountickError::encoding(format!(
            "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
        ))
    })?;
    let mut child = ChildGuard(Some(child));

    let mut stdin = child
        .inner()?
        .stdin
        .take()
        .ok_or_else(|| CountickError::encoding("failed to open ffmpeg stdin (unexpected)"))?;
    let mut stderr = child
        .inner()?
        .stderr
        .take()
        .ok_or_else(|| CountickError::encoding("failed to open ffmpeg stderr (unexpected)"))?;
    let stderr_drain = std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok::<_, std::io::Error>(bytes)
    });

    let mut scratch = vec![0u8; (job.width as usize) * (job.height as usize) * 4];
    let total = job.frames.len();
    for (i, frame) in job.frames.iter().enumerate() {
        scratch.fill(0);
        if frame.premultiplied {
            unpremultiply_to_straight_rgba8(&mut scratch, &frame.data)?;
        } else {
            scratch.copy_from_slice(&frame.data);
        }

        use std::io::Write as _;
        stdin.write_all(&scratch).map_err(|e| {
            CountickError::encoding(format!("failed to write frame {i} to ffmpeg stdin: {e}"))
        })?;
        progress((i + 1) as f32 / total as f32 * 100.0);
    }
    drop(stdin);

    let status = child
        .take()?
        .wait()
        .map_err(|e| CountickError::encoding(format!("failed to wait for ffmpeg: {e}")))?;
    let stderr_bytes = stderr_drain
        .join()
        .map_err(|_| CountickError::encoding("ffmpeg stderr drain thread panicked"))?
        .map_err(|e| CountickError::encoding(format!("ffmpeg stderr read failed: {e}")))?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        return Err(CountickError::encoding(format!(
            "ffmpeg exited with status {}: {}",
            status,
            stderr.trim()
        )));
    }

    let bytes = std::fs::read(&out_path)
        .map_err(|e| CountickError::encoding(format!("failed to read encoded output: {e}")))?;
    drop(out_guard);
    if bytes.is_empty() {
        return Err(CountickError::encoding("ffmpeg produced an empty output"));
    }
    Ok(EncodedClip { bytes, mime })
}

/// Convert premultiplied RGBA8 into straight-alpha RGBA8.
///
/// Fully transparent pixels come out as transparent black so the cleared background is
/// preserved end-to-end.
pub(crate) fn unpremultiply_to_straight_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
) -> CountickResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(CountickError::encoding(
            "unpremultiply expects equal-length rgba8 buffers",
        ));
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 0 {
            d.fill(0);
            continue;
        }
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        d[0] = ((u16::from(s[0]) * 255 + a / 2) / a).min(255) as u8;
        d[1] = ((u16::from(s[1]) * 255 + a / 2) / a).min(255) as u8;
        d[2] = ((u16::from(s[2]) * 255 + a / 2) / a).min(255) as u8;
        d[3] = a as u8;
    }
    Ok(())
}

/// Build a unique path in the system temp directory for an intermediate media file.
pub(crate) fn temp_media_path(stage: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "countick_{stage}_{}_{}.{ext}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

/// Removes the named file on drop.
pub(crate) struct TempFileGuard(pub(crate) Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Kills the child on drop unless it was taken for a clean wait.
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn inner(&mut self) -> CountickResult<&mut Child> {
        self.0
            .as_mut()
            .ok_or_else(|| CountickError::encoding("ffmpeg child already finalized"))
    }

    fn take(&mut self) -> CountickResult<Child> {
        self.0
            .take()
            .ok_or_else(|| CountickError::encoding("ffmpeg child already finalized"))
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpremultiply_alpha_0_is_transparent_black() {
        let src = vec![12u8, 34, 56, 0];
        let mut dst = vec![255u8; 4];
        unpremultiply_to_straight_rgba8(&mut dst, &src).unwrap();
        assert_eq!(dst, vec![0, 0, 0, 0]);
    }

    #[test]
    fn unpremultiply_alpha_255_is_identity() {
        let src = vec![1u8, 2, 3, 255];
        let mut dst = vec![0u8; 4];
        unpremultiply_to_straight_rgba8(&mut dst, &src).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn unpremultiply_half_alpha_restores_color() {
        // 100 premultiplied at alpha 128 is ~199 straight.
        let src = vec![100u8, 0, 0, 128];
        let mut dst = vec![0u8; 4];
        unpremultiply_to_straight_rgba8(&mut dst, &src).unwrap();
        assert_eq!(dst[3], 128);
        assert!((198..=200).contains(&dst[0]), "got {}", dst[0]);
    }

    #[test]
    fn unpremultiply_rejects_mismatched_buffers() {
        let src = vec![0u8; 8];
        let mut dst = vec![0u8; 4];
        assert!(unpremultiply_to_straight_rgba8(&mut dst, &src).is_err());
    }

    #[test]
    fn temp_paths_are_distinct() {
        let a = temp_media_path("encode", "webm");
        let b = temp_media_path("encode", "webm");
        assert_ne!(a, b);
    }

    #[test]
    fn strategies_gate_on_their_codec() {
        let vp9 = EncoderCapabilities::default().with_encoder("libvpx-vp9");
        let vp8 = EncoderCapabilities::default().with_encoder("libvpx");

        assert!(Vp9QualityEncoder.is_supported(&vp9));
        assert!(!Vp9QualityEncoder.is_supported(&vp8));
        assert!(Vp9RealtimeEncoder.is_supported(&vp9));
        assert!(Vp8Encoder.is_supported(&vp8));
        assert!(!Vp8Encoder.is_supported(&vp9));
    }
}
