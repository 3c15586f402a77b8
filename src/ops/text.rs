use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};

use crate::error::{HostError, HostResult};
use crate::host::Justification;

/// Lay out a single line of text, returning positioned glyphs and metrics.
/// Glyph positions are relative to the anchor, with `y = 0` on the baseline.
/// Returns `(glyphs, total_width, ascent, descent)`.
pub fn layout_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    justification: Justification,
    kerning: bool,
) -> (Vec<(GlyphId, f32, f32)>, f32, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let descent = scaled.descent();

    // First pass: compute glyph positions (left-aligned at x=0)
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if kerning && let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, 0.0));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    let total_width = cursor_x;

    let offset = match justification {
        Justification::Left => 0.0,
        Justification::Center => -total_width * 0.5,
        Justification::Right => -total_width,
    };

    for glyph in &mut glyphs {
        glyph.1 += offset;
    }

    (glyphs, total_width, ascent, descent)
}

/// RGBA buffer produced by [`rasterize_text`], placed at `(off_x, off_y)`.
pub struct RasterizedText {
    pub buf: Vec<u8>,
    pub buf_w: u32,
    pub buf_h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl RasterizedText {
    fn empty() -> Self {
        Self { buf: Vec::new(), buf_w: 0, buf_h: 0, off_x: 0, off_y: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.buf_w == 0 || self.buf_h == 0
    }
}

/// Rasterize a line of text into an RGBA buffer clipped to the canvas.
///
/// `(origin_x, origin_y)` is the baseline anchor in canvas coordinates; the
/// justification decides whether the anchor is the left edge, centre or
/// right edge of the line.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    justification: Justification,
    kerning: bool,
    origin_x: f32,
    origin_y: f32,
    color: [u8; 4],
    canvas_w: u32,
    canvas_h: u32,
) -> RasterizedText {
    let (glyphs, _, _, _) = layout_text(font, text, font_size, justification, kerning);
    if glyphs.is_empty() {
        return RasterizedText::empty();
    }

    // Bounding box of all glyphs using glyph_bounds (no outlining needed)
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return RasterizedText::empty();
    }

    let pad = 2.0;
    let x0 = ((origin_x + min_x - pad).floor() as i32).max(0);
    let y0 = ((origin_y + min_y - pad).floor() as i32).max(0);
    let x1 = ((origin_x + max_x + pad).ceil() as i32).min(canvas_w as i32);
    let y1 = ((origin_y + max_y + pad).ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;
    if buf_w == 0 || buf_h == 0 {
        return RasterizedText::empty();
    }

    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];
    for &(glyph_id, gx, gy) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin_x + gx, origin_y + gy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let b = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let ix = (b.min.x as i32 + px as i32) - x0;
            let iy = (b.min.y as i32 + py as i32) - y0;
            if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                let idx = iy as usize * buf_w as usize + ix as usize;
                coverage[idx] = coverage[idx].max(cov);
            }
        });
    }

    let mut buf = vec![0u8; coverage.len() * 4];
    for (i, &cov) in coverage.iter().enumerate() {
        if cov > 0.001 {
            let idx = i * 4;
            buf[idx] = color[0];
            buf[idx + 1] = color[1];
            buf[idx + 2] = color[2];
            buf[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
        }
    }

    RasterizedText { buf, buf_w, buf_h, off_x: x0, off_y: y0 }
}

/// Load a font from a TTF/OTF file.
pub fn load_font_file(path: &Path) -> HostResult<FontArc> {
    let bytes = std::fs::read(path)
        .map_err(|e| HostError::FontUnavailable(format!("{}: {}", path.display(), e)))?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| HostError::FontUnavailable(format!("{}: {}", path.display(), e)))
}

/// Load an installed font by PostScript name (e.g. `ArialMT`), falling back
/// to the family of the same name and then to the system sans-serif.
pub fn load_system_font(name: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::{Source, SystemSource};

    let source = SystemSource::new();
    let handle = source.select_by_postscript_name(name).ok().or_else(|| {
        source
            .select_best_match(
                &[FamilyName::Title(name.to_string()), FamilyName::SansSerif],
                &Properties::new(),
            )
            .ok()
    })?;

    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Resolved fonts, keyed by requested name.
///
/// An override file, when configured, answers every request.
#[derive(Default)]
pub struct FontBook {
    override_path: Option<PathBuf>,
    cache: HashMap<String, FontArc>,
}

impl FontBook {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self { override_path, cache: HashMap::new() }
    }

    pub fn resolve(&mut self, name: &str) -> HostResult<FontArc> {
        if let Some(font) = self.cache.get(name) {
            return Ok(font.clone());
        }
        let font = match &self.override_path {
            Some(path) => load_font_file(path)?,
            None => load_system_font(name).ok_or_else(|| HostError::FontUnavailable(name.to_string()))?,
        };
        tracing::debug!(font = name, "resolved font");
        self.cache.insert(name.to_string(), font.clone());
        Ok(font)
    }
}
