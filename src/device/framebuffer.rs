//! Software framebuffer used to render stand-in phone screens.
//!
//! The scripted device draws one of these per capture so that everything
//! downstream (artifact writing, dimension checks on model coordinates) sees
//! a real PNG of the configured resolution.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

use super::{DeviceError, DeviceResult};

const STATUS_BAR: [u8; 3] = [32, 32, 40];
const BACKGROUND: [u8; 3] = [24, 24, 28];
const TEXT: [u8; 3] = [230, 230, 230];
const ACCENT: [u8; 3] = [124, 92, 232];

/// RGB pixel buffer with basic drawing primitives
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    width: u32,
    height: u32,
    /// Row-major, 3 bytes per pixel
    buffer: Vec<u8>,
}

impl MockFramebuffer {
    /// Create a framebuffer initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0u8; (width * height * 3) as usize],
        }
    }

    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Render a stand-in app screen: status bar, a title line and a stack of
    /// labelled buttons.
    pub fn phone_screen(width: u32, height: u32, title: &str, buttons: &[&str]) -> Self {
        let mut fb = Self::with_color(width, height, BACKGROUND);
        let scale = (width / 360).max(1);
        fb.draw_rect(0, 0, width, 24 * scale, STATUS_BAR);
        fb.draw_text(16 * scale, 40 * scale, title, TEXT, BACKGROUND, scale);

        let mut y = 96 * scale;
        for label in buttons {
            fb.draw_rect(16 * scale, y, width.saturating_sub(32 * scale), 40 * scale, ACCENT);
            fb.draw_text(28 * scale, y + 16 * scale, label, TEXT, ACCENT, scale);
            y += 56 * scale;
            if y >= height {
                break;
            }
        }
        fb
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle, clipped to the buffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text with font8x8 glyphs, each pixel blown up to `scale`x`scale`.
    /// Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3], scale: u32) {
        let scale = scale.max(1);
        let mut cursor_x = x;
        for ch in text.chars() {
            self.draw_char(cursor_x, y, ch, fg, bg, scale);
            cursor_x += 8 * scale;
            if cursor_x >= self.width {
                break;
            }
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3], scale: u32) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            for bit in 0..8u32 {
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.draw_rect(x + bit * scale, y + row_idx as u32 * scale, scale, scale, color);
            }
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> DeviceResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| DeviceError::Io(std::io::Error::other("framebuffer size mismatch")))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .map_err(|e| DeviceError::Io(std::io::Error::other(format!("Failed to encode PNG: {}", e))))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_black() {
        let fb = MockFramebuffer::new(100, 50);
        assert_eq!(fb.get_pixel(0, 0), [0, 0, 0]);
        assert_eq!(fb.get_pixel(99, 49), [0, 0, 0]);
    }

    #[test]
    fn test_draw_rect_is_clipped() {
        let mut fb = MockFramebuffer::new(20, 20);
        fb.draw_rect(15, 15, 10, 10, [255, 0, 0]);
        assert_eq!(fb.get_pixel(14, 14), [0, 0, 0]);
        assert_eq!(fb.get_pixel(19, 19), [255, 0, 0]);
    }

    #[test]
    fn test_scaled_text_has_foreground_pixels() {
        let mut fb = MockFramebuffer::new(64, 32);
        fb.draw_text(0, 0, "H", [255, 255, 255], [0, 0, 0], 2);
        let lit = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .filter(|&(x, y)| fb.get_pixel(x, y) == [255, 255, 255])
            .count();
        assert!(lit > 0);
        // Scaled glyph pixels come in 2x2 blocks
        assert_eq!(lit % 4, 0);
    }

    #[test]
    fn test_phone_screen_png_has_requested_dimensions() {
        let fb = MockFramebuffer::phone_screen(360, 800, "Welcome", &["Create a vault"]);
        let png = fb.to_png().unwrap();
        assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (360, 800));
    }
}
