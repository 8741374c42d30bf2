use crate::foundation::error::{CountickError, CountickResult};
use std::path::Path;

/// Side length of a sticker frame in pixels. Frames are always square.
pub const STICKER_DIM: u32 = 512;

/// Frame rate of the sticker format: one frame per remaining-seconds value.
///
/// At 1 fps, frame `i` carries timestamp `i` seconds and duration exactly 1 second. Downstream
/// playback relies on this being integral, not rounded.
pub const STICKER_FPS: Fps = Fps { num: 1, den: 1 };

/// A rendered frame as RGBA8 pixels.
///
/// Frames are straight (non-premultiplied) alpha by default; the `premultiplied` flag makes the
/// convention explicit at API boundaries. A frame is immutable once produced and is shared
/// between cache tiers behind `Arc`.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRgba {
    /// Create a fully transparent frame.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 4],
            premultiplied: false,
        }
    }

    /// Byte length of the pixel payload.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Write the frame as a PNG for debugging and previews.
    pub fn write_png(&self, path: impl AsRef<Path>) -> CountickResult<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                CountickError::render_surface("frame data length does not match width*height*4")
            })?;
        img.save(path.as_ref())
            .map_err(|e| CountickError::render_surface(format!("failed to write PNG: {e}")))?;
        Ok(())
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> CountickResult<Self> {
        if num == 0 {
            return Err(CountickError::invalid_duration("Fps num must be > 0"));
        }
        if den == 0 {
            return Err(CountickError::invalid_duration("Fps den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }
}

/// Format a remaining-seconds value the way the timer face displays it.
///
/// Values below one minute render as the bare number; everything else renders as zero-padded
/// `MM:SS`, where the minutes field is total minutes and may exceed 59.
pub fn format_remaining(secs: u32) -> String {
    if secs < 60 {
        secs.to_string()
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_remaining_below_a_minute_is_bare() {
        assert_eq!(format_remaining(0), "0");
        assert_eq!(format_remaining(9), "9");
        assert_eq!(format_remaining(59), "59");
    }

    #[test]
    fn format_remaining_at_and_above_a_minute_is_mm_ss() {
        assert_eq!(format_remaining(60), "01:00");
        assert_eq!(format_remaining(61), "01:01");
        assert_eq!(format_remaining(599), "09:59");
        assert_eq!(format_remaining(3599), "59:59");
        // Minutes are total minutes, not wrapped at an hour.
        assert_eq!(format_remaining(3700), "61:40");
    }

    #[test]
    fn fps_rejects_zero_components() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(1, 0).is_err());
        assert_eq!(STICKER_FPS.frame_duration_secs(), 1.0);
    }

    #[test]
    fn transparent_frame_is_zeroed() {
        let f = FrameRgba::transparent(4, 4);
        assert_eq!(f.byte_len(), 64);
        assert!(f.data.iter().all(|&b| b == 0));
        assert!(!f.premultiplied);
    }
}
