use std::sync::Arc;

use image::{GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::host::{LayerId, TextItem};

/// Default document resolution (pixels per inch).
pub const DEFAULT_RESOLUTION: f64 = 72.0;

/// Highest accepted document resolution (pixels per inch).
pub const MAX_RESOLUTION: f64 = 10_000.0;

/// Maximum supported canvas dimension in pixels (per axis).
pub const MAX_CANVAS_DIM: u32 = 32_768;

// ============================================================================
// TILED IMAGE – sparse 64×64 chunk storage (Vec-indexed for speed)
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// A pixel with zero alpha, returned by reference for missing chunks.
static TRANSPARENT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Sparse tiled image backed by a flat `Vec<Option<Arc<RgbaImage>>>`.
/// Chunk coordinates are mapped to a flat index via `cy * chunks_per_row + cx`.
///
/// Chunks are wrapped in `Arc` for copy-on-write semantics: `clone()` only
/// bumps reference counts, so undo snapshots are cheap, and mutations COW-clone
/// only the touched chunk.
#[derive(Clone)]
pub struct TiledImage {
    pub width: u32,
    pub height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl TiledImage {
    // ---- construction -------------------------------------------------------

    /// Create an empty (fully transparent) tiled image.
    pub fn new(width: u32, height: u32) -> Self {
        // Clamp dimensions to prevent overflow (max ~256 megapixels)
        let (width, height) = {
            let total = (width as u64) * (height as u64);
            if total > 256_000_000 || width == 0 || height == 0 {
                tracing::warn!(width, height, "TiledImage dimensions out of range, clamped to 1×1");
                (1, 1)
            } else {
                (width, height)
            }
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        let total = (chunks_per_row * chunks_per_col) as usize;
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; total],
        }
    }

    /// Fill the entire image with `color`. A transparent fill costs nothing.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut img = Self::new(width, height);
        if color[3] > 0 {
            img.fill(color);
        }
        img
    }

    /// Import from a flat `RgbaImage`. Only non-transparent chunks are stored.
    /// Chunk conversion is parallelised with rayon.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let width = src.width();
        let height = src.height();
        let mut img = Self::new(width, height);
        if img.width != width || img.height != height {
            return img;
        }

        let chunks_x = img.chunks_per_row as usize;
        let chunks_y = height.div_ceil(CHUNK_SIZE) as usize;
        let total_chunks = chunks_x * chunks_y;
        let src_raw = src.as_raw();

        let chunk_results: Vec<(usize, Option<Arc<RgbaImage>>)> = (0..total_chunks)
            .into_par_iter()
            .map(|flat| {
                let cx = (flat % chunks_x) as u32;
                let cy = (flat / chunks_x) as u32;
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;

                let cw = CHUNK_SIZE.min(width - base_x);
                let ch = CHUNK_SIZE.min(height - base_y);
                let chunk_stride = CHUNK_SIZE as usize * 4;
                let mut chunk_data = vec![0u8; chunk_stride * CHUNK_SIZE as usize];
                let mut has_content = false;

                for ly in 0..ch {
                    let src_start = ((base_y + ly) * width + base_x) as usize * 4;
                    let dst_start = ly as usize * chunk_stride;
                    let byte_len = cw as usize * 4;
                    chunk_data[dst_start..dst_start + byte_len]
                        .copy_from_slice(&src_raw[src_start..src_start + byte_len]);

                    if !has_content {
                        has_content = chunk_data[dst_start..dst_start + byte_len]
                            .chunks_exact(4)
                            .any(|px| px[3] != 0);
                    }
                }

                let chunk = if has_content {
                    RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, chunk_data).map(Arc::new)
                } else {
                    None
                };
                (flat, chunk)
            })
            .collect();

        for (idx, chunk) in chunk_results {
            img.chunks[idx] = chunk;
        }
        img
    }

    /// Flatten back to a contiguous `RgbaImage`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let out_stride = self.width as usize * 4;
        let out_raw: &mut [u8] = &mut out;
        for (cx, cy) in self.chunk_keys() {
            if let Some(chunk) = self.get_chunk(cx, cy) {
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;
                let cw = (CHUNK_SIZE.min(self.width.saturating_sub(base_x))) as usize;
                let ch = CHUNK_SIZE.min(self.height.saturating_sub(base_y));
                let chunk_raw = chunk.as_raw();
                let chunk_stride = CHUNK_SIZE as usize * 4;
                for ly in 0..ch as usize {
                    let src_start = ly * chunk_stride;
                    let src_end = src_start + cw * 4;
                    let dst_start = (base_y as usize + ly) * out_stride + base_x as usize * 4;
                    let dst_end = dst_start + cw * 4;
                    out_raw[dst_start..dst_end].copy_from_slice(&chunk_raw[src_start..src_end]);
                }
            }
        }
        out
    }

    /// Copy of this image shifted by `(dx, dy)` pixels; content pushed past the
    /// edges is dropped.
    pub fn translated(&self, dx: i32, dy: i32) -> TiledImage {
        let flat = self.to_rgba_image();
        let mut out = TiledImage::new(self.width, self.height);
        out.blit_rgba_at(dx, dy, self.width, self.height, flat.as_raw());
        out
    }

    // ---- helpers ------------------------------------------------------------

    #[inline]
    fn chunk_coord(x: u32, y: u32) -> (u32, u32) {
        (x / CHUNK_SIZE, y / CHUNK_SIZE)
    }

    #[inline]
    fn local(x: u32, y: u32) -> (u32, u32) {
        (x % CHUNK_SIZE, y % CHUNK_SIZE)
    }

    #[inline]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel (returns `&TRANSPARENT_PIXEL` for missing chunks).
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        if x >= self.width || y >= self.height {
            return &TRANSPARENT_PIXEL;
        }
        let (cx, cy) = Self::chunk_coord(x, y);
        let (lx, ly) = Self::local(x, y);
        let idx = self.flat_index(cx, cy);
        self.chunks[idx]
            .as_ref()
            .map(|c| c.get_pixel(lx, ly))
            .unwrap_or(&TRANSPARENT_PIXEL)
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let (cx, cy) = Self::chunk_coord(x, y);
        let (lx, ly) = Self::local(x, y);
        let idx = self.flat_index(cx, cy);
        let arc = self.chunks[idx]
            .get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(arc).put_pixel(lx, ly, pixel);
    }

    /// Blit an RGBA sub-image at a given position using bulk chunk row copies.
    pub fn blit_rgba_at(&mut self, dst_x: i32, dst_y: i32, src_w: u32, src_h: u32, data: &[u8]) {
        debug_assert_eq!(data.len(), src_w as usize * src_h as usize * 4);
        let cs = CHUNK_SIZE;

        for sy in 0..src_h {
            let gy = dst_y + sy as i32;
            if gy < 0 || gy as u32 >= self.height {
                continue;
            }
            let gy = gy as u32;

            let src_row_start = sy as usize * src_w as usize * 4;

            // Process contiguous runs of pixels in this row
            let mut sx = 0u32;
            while sx < src_w {
                let gx = dst_x + sx as i32;
                if gx < 0 {
                    sx += 1;
                    continue;
                }
                let gx = gx as u32;
                if gx >= self.width {
                    break;
                }

                let (cx, cy) = Self::chunk_coord(gx, gy);
                let (lx, ly) = Self::local(gx, gy);
                let idx = self.flat_index(cx, cy);

                // How many pixels can we write into this chunk row?
                let run = (cs - lx).min(src_w - sx).min(self.width - gx);

                let src_off = src_row_start + sx as usize * 4;
                let byte_len = run as usize * 4;
                let has_content = data[src_off..src_off + byte_len]
                    .chunks_exact(4)
                    .any(|px| px[3] != 0);

                if has_content {
                    let arc = self.chunks[idx]
                        .get_or_insert_with(|| Arc::new(RgbaImage::new(cs, cs)));
                    let chunk = Arc::make_mut(arc);
                    let dst_off = (ly as usize * cs as usize + lx as usize) * 4;
                    let chunk_raw: &mut [u8] = chunk;
                    chunk_raw[dst_off..dst_off + byte_len]
                        .copy_from_slice(&data[src_off..src_off + byte_len]);
                }

                sx += run;
            }
        }
    }

    /// Read-only access to a chunk (if it exists).
    pub fn get_chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        let idx = self.flat_index(cx, cy);
        self.chunks.get(idx).and_then(|c| c.as_deref())
    }

    /// Place a fully-built chunk at the given chunk coordinate.
    pub fn set_chunk(&mut self, cx: u32, cy: u32, chunk: RgbaImage) {
        let idx = self.flat_index(cx, cy);
        if cx < self.chunks_per_row && idx < self.chunks.len() {
            self.chunks[idx] = Some(Arc::new(chunk));
        }
    }

    /// Iterator over populated chunk coordinates.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cpr = self.chunks_per_row;
        self.chunks.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref().map(|_| ((i as u32) % cpr, (i as u32) / cpr))
        })
    }

    /// Number of populated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    // ---- bulk operations ----------------------------------------------------

    /// Fill every pixel with `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for slot in &mut self.chunks {
            let arc = slot.get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
            let chunk = Arc::make_mut(arc);
            for pixel in chunk.pixels_mut() {
                *pixel = color;
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Memory held by the stored chunks, counted at full size whether or not
    /// a chunk is currently shared with another image.
    pub fn memory_bytes(&self) -> usize {
        let chunk_byte_size = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
        self.chunks.iter().filter(|c| c.is_some()).count() * chunk_byte_size
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
}

impl BlendMode {
    /// Convert to a stable u8 for binary serialization
    pub fn to_u8(&self) -> u8 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Multiply => 1,
            BlendMode::Screen => 2,
        }
    }

    /// Reconstruct from a u8 (defaults to Normal for unknown values)
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => BlendMode::Multiply,
            2 => BlendMode::Screen,
            _ => BlendMode::Normal,
        }
    }
}

/// Live (not yet rasterized) point text on a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayer {
    pub item: TextItem,
    /// Font size in pixels, fixed when the item was set.
    pub size_px: f64,
    /// Baseline origin in canvas pixels.
    pub origin: (f64, f64),
}

#[derive(Clone)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: TiledImage,
    /// `Some` while this is an editable text layer.
    pub text: Option<TextLayer>,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32, fill_color: Rgba<u8>) -> Self {
        Self {
            id: LayerId::new(),
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels: TiledImage::new_filled(width, height, fill_color),
            text: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

pub struct CanvasState {
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub width: u32,
    pub height: u32,
    /// Pixels per inch.
    pub resolution: f64,
    /// Selection mask – 0 = unselected, 255 = fully selected.
    /// Dimensions must match (width, height).
    pub selection_mask: Option<GrayImage>,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Self {
        let white = Rgba([255, 255, 255, 255]);
        let background = Layer::new("Background".to_string(), width, height, white);

        Self {
            layers: vec![background],
            active_layer_index: 0,
            width,
            height,
            resolution: DEFAULT_RESOLUTION,
            selection_mask: None,
        }
    }

    /// Single-layer canvas holding `image`.
    pub fn from_image(image: &RgbaImage, name: &str) -> Self {
        let mut layer = Layer::new(name.to_string(), image.width(), image.height(), Rgba([0, 0, 0, 0]));
        layer.pixels = TiledImage::from_rgba_image(image);
        Self {
            layers: vec![layer],
            active_layer_index: 0,
            width: image.width(),
            height: image.height(),
            resolution: DEFAULT_RESOLUTION,
            selection_mask: None,
        }
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn get_active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    /// Insert `layer` directly above the active layer and activate it.
    pub fn insert_above_active(&mut self, layer: Layer) -> usize {
        let idx = if self.layers.is_empty() {
            0
        } else {
            (self.active_layer_index + 1).min(self.layers.len())
        };
        self.layers.insert(idx, layer);
        self.active_layer_index = idx;
        idx
    }

    /// Move the layer at `from` so it sits directly above the layer at
    /// `target`. The moved layer stays active. Returns its new index.
    pub fn move_layer_above(&mut self, from: usize, target: usize) -> Option<usize> {
        if from >= self.layers.len() || target >= self.layers.len() {
            return None;
        }
        if from == target {
            return Some(from);
        }
        let layer = self.layers.remove(from);
        let target = if target > from { target - 1 } else { target };
        let idx = target + 1;
        self.layers.insert(idx, layer);
        self.active_layer_index = idx;
        Some(idx)
    }

    /// Blend the layer at `idx` into the one below it and remove it.
    /// Returns the index of the merged layer, which becomes active.
    pub fn merge_down(&mut self, idx: usize) -> Option<usize> {
        if idx == 0 || idx >= self.layers.len() {
            return None;
        }
        let upper = self.layers.remove(idx);
        let lower_idx = idx - 1;
        if upper.visible {
            let lower = &mut self.layers[lower_idx];
            let keys: Vec<(u32, u32)> = upper.pixels.chunk_keys().collect();
            for (cx, cy) in keys {
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(self.width.saturating_sub(base_x));
                let ch = CHUNK_SIZE.min(self.height.saturating_sub(base_y));
                for ly in 0..ch {
                    for lx in 0..cw {
                        let (x, y) = (base_x + lx, base_y + ly);
                        let top = *upper.pixels.get_pixel(x, y);
                        if top[3] == 0 {
                            continue;
                        }
                        let base = *lower.pixels.get_pixel(x, y);
                        let blended = Self::blend_pixel_static(base, top, upper.blend_mode, upper.opacity);
                        lower.pixels.put_pixel(x, y, blended);
                    }
                }
            }
        }
        self.active_layer_index = lower_idx;
        Some(lower_idx)
    }

    /// Flatten all visible layers into one image.
    /// Uses chunk-based iteration with rayon parallelism.
    pub fn composite(&self) -> RgbaImage {
        let mut result = RgbaImage::new(self.width, self.height);

        let mut active_chunks: Vec<(u32, u32)> = self
            .layers
            .iter()
            .filter(|l| l.visible)
            .flat_map(|l| l.pixels.chunk_keys())
            .collect();
        active_chunks.sort_unstable();
        active_chunks.dedup();

        let layers = &self.layers;
        let img_w = self.width;
        let img_h = self.height;

        let chunk_results: Vec<_> = active_chunks
            .par_iter()
            .map(|&(cx, cy)| {
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(img_w.saturating_sub(base_x));
                let ch = CHUNK_SIZE.min(img_h.saturating_sub(base_y));

                let mut pixels = vec![Rgba([0u8, 0, 0, 0]); (cw * ch) as usize];

                for layer in layers.iter().filter(|l| l.visible) {
                    let Some(chunk) = layer.pixels.get_chunk(cx, cy) else {
                        continue;
                    };
                    for ly in 0..ch {
                        for lx in 0..cw {
                            let idx = (ly * cw + lx) as usize;
                            let top = *chunk.get_pixel(lx, ly);
                            pixels[idx] =
                                Self::blend_pixel_static(pixels[idx], top, layer.blend_mode, layer.opacity);
                        }
                    }
                }

                (cx, cy, cw, ch, pixels)
            })
            .collect();

        for (cx, cy, cw, ch, pixels) in chunk_results {
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            for ly in 0..ch {
                for lx in 0..cw {
                    result.put_pixel(base_x + lx, base_y + ly, pixels[(ly * cw + lx) as usize]);
                }
            }
        }

        result
    }

    /// Composite `top` over `base` with the given mode and layer opacity.
    pub fn blend_pixel_static(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
        // Fast path: fully transparent top pixel, nothing to blend
        if top[3] == 0 {
            return base;
        }

        // Fast path: Normal blend, full opacity, fully opaque top pixel, just overwrite
        if matches!(mode, BlendMode::Normal) && opacity >= 1.0 && top[3] == 255 {
            return top;
        }

        let opacity = opacity.clamp(0.0, 1.0);
        let channel = |c: u8| c as f32 / 255.0;

        let base_a = channel(base[3]);
        let top_a = channel(top[3]) * opacity;
        let out_a = top_a + base_a * (1.0 - top_a);
        if out_a <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }

        let mut out = [0u8; 4];
        for i in 0..3 {
            let b = channel(base[i]);
            let t = channel(top[i]);
            let blended = match mode {
                BlendMode::Normal => t,
                BlendMode::Multiply => b * t,
                BlendMode::Screen => 1.0 - (1.0 - b) * (1.0 - t),
            };
            // Where the backdrop is empty the layer shows its own colour.
            let mixed = t * (1.0 - base_a) + blended * base_a;
            let c = (mixed * top_a + b * base_a * (1.0 - top_a)) / out_a;
            out[i] = (c * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgba(out)
    }

    // ========================================================================
    // SELECTION HELPERS
    // ========================================================================

    /// Replace the selection with the rectangle spanning pixel edges
    /// `[x1, x2) × [y1, y2)`, clipped to the canvas. An empty rectangle
    /// clears the selection.
    pub fn select_rect(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) {
        let (x1, x2) = (x1.min(x2).min(self.width), x1.max(x2).min(self.width));
        let (y1, y2) = (y1.min(y2).min(self.height), y1.max(y2).min(self.height));
        if x1 == x2 || y1 == y2 {
            self.clear_selection();
            return;
        }
        let mut mask = GrayImage::new(self.width, self.height);
        for y in y1..y2 {
            for x in x1..x2 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        self.selection_mask = Some(mask);
    }

    /// Clear (remove) the current selection.
    pub fn clear_selection(&mut self) {
        self.selection_mask = None;
    }

    /// Returns `true` when there is an active, non-empty selection mask.
    pub fn has_selection(&self) -> bool {
        self.selection_bounds().is_some()
    }

    /// Pixel-edge bounds `(x1, y1, x2, y2)` of the selected area.
    pub fn selection_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let mask = self.selection_mask.as_ref()?;
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x + 1, y + 1),
                Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x + 1), y2.max(y + 1)),
            });
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tiled_image_round_trips_through_rgba() {
        let mut flat = RgbaImage::new(100, 70);
        flat.put_pixel(3, 4, Rgba([1, 2, 3, 255]));
        flat.put_pixel(99, 69, Rgba([9, 8, 7, 128]));
        let tiled = TiledImage::from_rgba_image(&flat);
        assert_eq!(tiled.chunk_count(), 2);
        assert_eq!(*tiled.get_pixel(99, 69), Rgba([9, 8, 7, 128]));
        assert_eq!(tiled.to_rgba_image(), flat);
    }

    #[test]
    fn translated_shifts_content() {
        let mut img = TiledImage::new(10, 10);
        img.put_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let moved = img.translated(3, -1);
        assert_eq!(*moved.get_pixel(5, 1), Rgba([255, 0, 0, 255]));
        assert_eq!(moved.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn selection_bounds_are_pixel_edges() {
        let mut canvas = CanvasState::new(300, 100);
        assert!(!canvas.has_selection());
        canvas.select_rect(10, 20, 210, 70);
        assert_eq!(canvas.selection_bounds(), Some((10, 20, 210, 70)));

        canvas.select_rect(250, 0, 400, 10);
        assert_eq!(canvas.selection_bounds(), Some((250, 0, 300, 10)));

        canvas.select_rect(5, 5, 5, 50);
        assert!(!canvas.has_selection());
    }

    #[test]
    fn insert_move_and_merge_keep_stack_order() {
        let mut canvas = CanvasState::new(8, 8);
        let bg = canvas.layers[0].id;

        let mark = Layer::new("mark".into(), 8, 8, Rgba([0, 0, 0, 0]));
        let mark_id = mark.id;
        canvas.insert_above_active(mark);
        let text = Layer::new("text".into(), 8, 8, Rgba([0, 0, 0, 0]));
        canvas.insert_above_active(text);
        assert_eq!(canvas.active_layer_index, 2);

        // move the top layer to sit above the background
        assert_eq!(canvas.move_layer_above(2, 0), Some(1));
        assert_eq!(canvas.layers[2].id, mark_id);

        // merging the text layer into the background
        canvas.layers[1].pixels.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        assert_eq!(canvas.merge_down(1), Some(0));
        assert_eq!(canvas.layers.len(), 2);
        assert_eq!(canvas.layers[0].id, bg);
        assert_eq!(*canvas.layers[0].pixels.get_pixel(1, 1), Rgba([0, 0, 255, 255]));
        assert_eq!(canvas.merge_down(0), None);
    }

    #[test]
    fn composite_respects_layer_opacity() {
        let mut canvas = CanvasState::new(4, 4);
        let mut top = Layer::new("top".into(), 4, 4, Rgba([0, 0, 0, 0]));
        top.pixels.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        top.opacity = 0.5;
        canvas.insert_above_active(top);

        let flat = canvas.composite();
        assert_eq!(*flat.get_pixel(0, 0), Rgba([128, 128, 128, 255]));
        assert_eq!(*flat.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn blend_over_transparent_keeps_colour() {
        let out = CanvasState::blend_pixel_static(
            Rgba([0, 0, 0, 0]),
            Rgba([200, 100, 50, 255]),
            BlendMode::Multiply,
            0.5,
        );
        assert_eq!(out, Rgba([200, 100, 50, 128]));
    }
}
