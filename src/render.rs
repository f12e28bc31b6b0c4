//! Renders alien text to a PNG with a TrueType glyph font.

use crate::{Result, XenoglyphError};
use fontdue::{Font, FontSettings};
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::path::Path;

pub const FONT_SIZE: f32 = 32.0;
pub const MAX_WIDTH: u32 = 800;
const LINE_GAP: u32 = 4;
const BOTTOM_MARGIN: u32 = 10;

/// Greedy word wrap. Words wider than `max_width` are broken between
/// characters; `measure` returns the pixel advance of a string.
pub fn wrap_lines(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if measure(word) > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            for c in word.chars() {
                let mut candidate = current.clone();
                candidate.push(c);
                if current.is_empty() || measure(&candidate) <= max_width {
                    current = candidate;
                } else {
                    lines.push(std::mem::replace(&mut current, c.to_string()));
                }
            }
        } else if current.is_empty() {
            current = word.to_string();
        } else {
            let candidate = format!("{current} {word}");
            if measure(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Image height for `lines` lines of `line_height` px.
pub fn canvas_height(lines: usize, line_height: u32) -> u32 {
    (line_height + LINE_GAP) * lines as u32 + BOTTOM_MARGIN
}

/// Glyph font plus an optional fallback for characters it lacks.
pub struct GlyphRenderer {
    primary: Font,
    fallback: Option<Font>,
    size: f32,
    max_width: u32,
}

impl std::fmt::Debug for GlyphRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphRenderer")
            .field("fallback", &self.fallback.is_some())
            .field("size", &self.size)
            .field("max_width", &self.max_width)
            .finish()
    }
}

fn parse_font(bytes: Vec<u8>) -> Result<Font> {
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| XenoglyphError::Render(format!("failed to parse font: {e}")))
}

impl GlyphRenderer {
    pub fn from_bytes(primary: Vec<u8>, fallback: Option<Vec<u8>>) -> Result<Self> {
        Ok(Self {
            primary: parse_font(primary)?,
            fallback: fallback.map(parse_font).transpose()?,
            size: FONT_SIZE,
            max_width: MAX_WIDTH,
        })
    }

    pub fn load(primary: impl AsRef<Path>, fallback: Option<&Path>) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| {
                XenoglyphError::Render(format!("failed to read font file {}: {e}", path.display()))
            })
        };
        let primary = read(primary.as_ref())?;
        let fallback = fallback.map(read).transpose()?;
        Self::from_bytes(primary, fallback)
    }

    fn font_for(&self, c: char) -> &Font {
        match &self.fallback {
            Some(fallback)
                if self.primary.lookup_glyph_index(c) == 0 && fallback.lookup_glyph_index(c) != 0 =>
            {
                fallback
            }
            _ => &self.primary,
        }
    }

    fn measure(&self, s: &str) -> u32 {
        let advance: f32 = s
            .chars()
            .map(|c| self.font_for(c).metrics(c, self.size).advance_width)
            .sum();
        advance.round().max(0.0) as u32
    }

    /// White text on black, wrapped to the renderer width.
    pub fn render(&self, text: &str) -> Result<GrayImage> {
        let line_metrics = self
            .primary
            .horizontal_line_metrics(self.size)
            .ok_or_else(|| XenoglyphError::Render("font has no horizontal metrics".into()))?;
        let ascent = line_metrics.ascent.ceil() as i32;
        let line_height = (line_metrics.ascent - line_metrics.descent).ceil().max(1.0) as u32;

        let lines = wrap_lines(text, self.max_width, |s| self.measure(s));
        let mut canvas = GrayImage::new(self.max_width, canvas_height(lines.len(), line_height));

        let mut baseline = ascent;
        for line in &lines {
            self.draw_line(&mut canvas, line, baseline);
            baseline += (line_height + LINE_GAP) as i32;
        }
        Ok(canvas)
    }

    fn draw_line(&self, canvas: &mut GrayImage, line: &str, baseline: i32) {
        let mut pen_x = 0.0f32;
        for c in line.chars() {
            let (metrics, bitmap) = self.font_for(c).rasterize(c, self.size);
            let x0 = pen_x.round() as i32 + metrics.xmin;
            let y0 = baseline - metrics.height as i32 - metrics.ymin;
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let (x, y) = (x0 + gx as i32, y0 + gy as i32);
                    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
                        continue;
                    }
                    let coverage = bitmap[gy * metrics.width + gx];
                    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                    *pixel = Luma([pixel.0[0].max(coverage)]);
                }
            }
            pen_x += metrics.advance_width;
        }
    }

    /// [`GlyphRenderer::render`] encoded as PNG.
    pub fn render_png(&self, text: &str) -> Result<Vec<u8>> {
        let image = self.render(text)?;
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| XenoglyphError::Render(format!("failed to encode PNG: {e}")))?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_px(s: &str) -> u32 {
        s.chars().count() as u32 * 10
    }

    #[test]
    fn words_fill_lines_greedily() {
        assert_eq!(wrap_lines("aa bb cc", 50, ten_px), vec!["aa bb", "cc"]);
        assert_eq!(wrap_lines("  aa   bb ", 80, ten_px), vec!["aa bb"]);
    }

    #[test]
    fn overlong_words_break_between_characters() {
        assert_eq!(
            wrap_lines("x abcdefghijkl y", 50, ten_px),
            vec!["x", "abcde", "fghij", "kl y"]
        );
    }

    #[test]
    fn a_glyph_wider_than_the_line_still_gets_a_line() {
        assert_eq!(wrap_lines("☂☂", 5, ten_px), vec!["☂", "☂"]);
    }

    #[test]
    fn empty_text_has_no_lines() {
        assert!(wrap_lines(" \n\t", 800, ten_px).is_empty());
        assert_eq!(canvas_height(0, 38), 10);
        assert_eq!(canvas_height(2, 38), 94);
    }

    const MONO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSansMono.ttf");
    const SANS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSans.ttf");

    fn line_height(renderer: &GlyphRenderer) -> u32 {
        let metrics = renderer.primary.horizontal_line_metrics(FONT_SIZE).unwrap();
        (metrics.ascent - metrics.descent).ceil() as u32
    }

    fn lit_rows(image: &GrayImage) -> Vec<u32> {
        (0..image.height())
            .filter(|&y| (0..image.width()).any(|x| image.get_pixel(x, y).0[0] > 0))
            .collect()
    }

    #[test]
    fn single_line_sits_in_the_first_band() {
        let renderer = GlyphRenderer::load(MONO, None).unwrap();
        let lh = line_height(&renderer);
        let image = renderer.render("☂☔☀").unwrap();
        assert_eq!(image.dimensions(), (MAX_WIDTH, canvas_height(1, lh)));

        let rows = lit_rows(&image);
        assert!(!rows.is_empty());
        assert!(rows[0] < lh, "{rows:?}");
    }

    #[test]
    fn glyphs_rest_on_the_baseline() {
        let renderer = GlyphRenderer::load(MONO, None).unwrap();
        let ascent = renderer.primary.horizontal_line_metrics(FONT_SIZE).unwrap().ascent.ceil() as u32;
        let rows = lit_rows(&renderer.render("xxx").unwrap());
        let (top, bottom) = (rows[0], rows[rows.len() - 1]);
        assert!(bottom <= ascent && bottom + 3 >= ascent, "bottom {bottom}, ascent {ascent}");
        assert!(top > ascent / 3, "x-height glyph starts at {top}");
    }

    #[test]
    fn long_text_wraps_onto_stacked_lines() {
        let renderer = GlyphRenderer::load(MONO, None).unwrap();
        let lh = line_height(&renderer);
        let text = "☂☔☀☁ ".repeat(40);
        let lines = wrap_lines(&text, MAX_WIDTH, |s| renderer.measure(s));
        assert!(lines.len() >= 3, "{lines:?}");
        assert!(lines.iter().all(|l| renderer.measure(l) <= MAX_WIDTH));

        let image = renderer.render(&text).unwrap();
        assert_eq!(image.height(), canvas_height(lines.len(), lh));
        let rows = lit_rows(&image);
        for band in 0..lines.len() as u32 {
            let top = band * (lh + LINE_GAP);
            assert!(rows.iter().any(|&y| y >= top && y < top + lh), "band {band} is empty");
        }
    }

    #[test]
    fn fallback_is_used_only_for_missing_glyphs() {
        let renderer = GlyphRenderer::load(MONO, Some(Path::new(SANS))).unwrap();
        let fallback = renderer.fallback.as_ref().unwrap();
        // U+2042 is in the proportional face only.
        assert!(std::ptr::eq(renderer.font_for('⁂'), fallback));
        assert!(std::ptr::eq(renderer.font_for('☂'), &renderer.primary));
        assert!(std::ptr::eq(renderer.font_for('a'), &renderer.primary));

        let plain = GlyphRenderer::load(MONO, None).unwrap();
        assert!(std::ptr::eq(plain.font_for('⁂'), &plain.primary));

        let image = renderer.render("⁂").unwrap();
        assert!(!lit_rows(&image).is_empty());
    }

    #[test]
    fn png_output_decodes_to_the_rendered_size() {
        let renderer = GlyphRenderer::load(MONO, None).unwrap();
        let png = renderer.render_png("☐☋☁").unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), MAX_WIDTH);
        assert_eq!(decoded.height(), canvas_height(1, line_height(&renderer)));
    }

    #[test]
    fn garbage_font_is_a_render_error() {
        let err = GlyphRenderer::from_bytes(b"not a font".to_vec(), None).unwrap_err();
        assert!(matches!(err, XenoglyphError::Render(_)));
        let err = GlyphRenderer::load("/nonexistent/alien.ttf", None).unwrap_err();
        assert!(matches!(err, XenoglyphError::Render(_)));
    }
}
