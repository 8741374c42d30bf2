use crate::foundation::core::{FrameRgba, STICKER_DIM, format_remaining};
use crate::foundation::error::CountickResult;

/// External collaborator that rasterizes one frame per remaining-seconds value.
///
/// Treated as a pure function of the remaining value plus a fixed canvas size and digit policy:
/// rendering the same value twice must produce identical pixels, which is what makes cached
/// frames interchangeable with fresh ones.
pub trait FrameRenderer: Send + Sync {
    /// Render the frame for one remaining-seconds value.
    fn render(&self, remaining_secs: u32) -> CountickResult<FrameRgba>;

    /// Whether the renderer can be asked for an arbitrary subset of values.
    ///
    /// When `false`, the orchestrator renders whole ranges instead of only cache gaps.
    fn supports_partial(&self) -> bool {
        true
    }
}

/// Built-in renderer drawing the countdown as seven-segment block digits.
///
/// White opaque digits on a fully transparent background; no font machinery. Used by the CLI
/// and the test suite — production deployments supply their own [`FrameRenderer`].
#[derive(Clone, Copy, Debug)]
pub struct BlockDigitRenderer {
    width: u32,
    height: u32,
}

impl BlockDigitRenderer {
    /// Renderer at the sticker dimensions.
    pub fn new() -> Self {
        Self::with_size(STICKER_DIM, STICKER_DIM)
    }

    /// Renderer at explicit dimensions (tests use small frames).
    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for BlockDigitRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRenderer for BlockDigitRenderer {
    fn render(&self, remaining_secs: u32) -> CountickResult<FrameRgba> {
        let mut frame = FrameRgba::transparent(self.width, self.height);
        draw_text_centered(&mut frame, &format_remaining(remaining_secs));
        Ok(frame)
    }
}

/// Segment bitmasks per digit, bits: 0=top, 1=top-right, 2=bottom-right, 3=bottom,
/// 4=bottom-left, 5=top-left, 6=middle.
const DIGIT_SEGMENTS: [u8; 10] = [
    0b0111111, // 0
    0b0000110, // 1
    0b1011011, // 2
    0b1001111, // 3
    0b1100110, // 4
    0b1101101, // 5
    0b1111101, // 6
    0b0000111, // 7
    0b1111111, // 8
    0b1101111, // 9
];

/// Glyph cell proportions, in thousandths of the cell height.
const SEG_THICKNESS: u32 = 140;

fn draw_text_centered(frame: &mut FrameRgba, text: &str) {
    let glyphs = text.len() as u32;
    if glyphs == 0 {
        return;
    }

    // Cell layout: glyph width is 60% of its height, with a 20%-of-width gap between glyphs.
    let avail_w = frame.width * 9 / 10;
    let avail_h = frame.height * 6 / 10;
    let cell_h = avail_h.min(avail_w * 1000 / (glyphs * 720).max(1));
    let cell_w = cell_h * 6 / 10;
    let gap = cell_w / 5;
    let text_w = glyphs * cell_w + (glyphs - 1) * gap;
    let x0 = frame.width.saturating_sub(text_w) / 2;
    let y0 = frame.height.saturating_sub(cell_h) / 2;

    for (i, ch) in text.chars().enumerate() {
        let cx = x0 + i as u32 * (cell_w + gap);
        match ch {
            '0'..='9' => {
                let mask = DIGIT_SEGMENTS[(ch as u8 - b'0') as usize];
                draw_segments(frame, cx, y0, cell_w, cell_h, mask);
            }
            ':' => draw_colon(frame, cx, y0, cell_w, cell_h),
            _ => {}
        }
    }
}

fn draw_segments(frame: &mut FrameRgba, x: u32, y: u32, w: u32, h: u32, mask: u8) {
    let t = (h * SEG_THICKNESS / 1000).max(1);
    let half = h / 2;
    // (bit, x, y, w, h) per segment.
    let rects = [
        (0u8, x, y, w, t),
        (1, x + w - t, y, t, half),
        (2, x + w - t, y + half, t, h - half),
        (3, x, y + h - t, w, t),
        (4, x, y + half, t, h - half),
        (5, x, y, t, half),
        (6, x, y + half - t / 2, w, t),
    ];
    for (bit, rx, ry, rw, rh) in rects {
        if mask & (1 << bit) != 0 {
            fill_rect(frame, rx, ry, rw, rh);
        }
    }
}

fn draw_colon(frame: &mut FrameRgba, x: u32, y: u32, w: u32, h: u32) {
    let t = (h * SEG_THICKNESS / 1000).max(1);
    let cx = x + w / 2 - t / 2;
    fill_rect(frame, cx, y + h / 3 - t / 2, t, t);
    fill_rect(frame, cx, y + 2 * h / 3 - t / 2, t, t);
}

fn fill_rect(frame: &mut FrameRgba, x: u32, y: u32, w: u32, h: u32) {
    let x1 = (x + w).min(frame.width);
    let y1 = (y + h).min(frame.height);
    for row in y.min(frame.height)..y1 {
        for col in x..x1 {
            let off = ((row * frame.width + col) * 4) as usize;
            frame.data[off..off + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque_pixels(frame: &FrameRgba) -> usize {
        frame.data.chunks_exact(4).filter(|px| px[3] == 255).count()
    }

    #[test]
    fn rendering_is_deterministic_per_value() {
        let r = BlockDigitRenderer::with_size(64, 64);
        let a = r.render(42).unwrap();
        let b = r.render(42).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn different_values_render_differently() {
        let r = BlockDigitRenderer::with_size(64, 64);
        let a = r.render(1).unwrap();
        let b = r.render(2).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn background_stays_transparent() {
        let r = BlockDigitRenderer::with_size(64, 64);
        let f = r.render(8).unwrap();
        let opaque = opaque_pixels(&f);
        assert!(opaque > 0, "digits must draw something");
        assert!(
            opaque < (64 * 64) / 2,
            "most of the canvas must stay transparent"
        );
        assert!(!f.premultiplied);
    }

    #[test]
    fn minute_values_span_wider_than_second_values() {
        let r = BlockDigitRenderer::with_size(128, 128);
        let short = r.render(5).unwrap();
        let long = r.render(65).unwrap(); // "01:05"
        assert!(opaque_span(&long) > opaque_span(&short));
    }

    fn opaque_span(frame: &FrameRgba) -> u32 {
        let mut min_col = frame.width;
        let mut max_col = 0;
        for (i, px) in frame.data.chunks_exact(4).enumerate() {
            if px[3] == 255 {
                let col = i as u32 % frame.width;
                min_col = min_col.min(col);
                max_col = max_col.max(col);
            }
        }
        max_col.saturating_sub(min_col)
    }

    #[test]
    fn partial_requests_are_supported_by_default() {
        assert!(BlockDigitRenderer::new().supports_partial());
    }
}
