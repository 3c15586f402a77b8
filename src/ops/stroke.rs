use image::Rgba;

use crate::canvas::TiledImage;

/// Spacing between pencil stamps along a segment, in pixels.
const STAMP_SPACING: f64 = 0.25;

/// First pixel covered by a stamp of `width` pixels centred on `c`.
#[inline]
fn stamp_start(c: f64, width: u32) -> i64 {
    (c - width as f64 / 2.0 + 0.5).floor() as i64
}

/// Stamp a hard-edged square pencil of `width` pixels centred on `(x, y)`.
fn stamp(img: &mut TiledImage, x: f64, y: f64, width: u32, color: Rgba<u8>) {
    let sx = stamp_start(x, width);
    let sy = stamp_start(y, width);
    for py in sy..sy + width as i64 {
        if py < 0 || py >= img.height() as i64 {
            continue;
        }
        for px in sx..sx + width as i64 {
            if px < 0 || px >= img.width() as i64 {
                continue;
            }
            img.put_pixel(px as u32, py as u32, color);
        }
    }
}

/// Stroke an open polyline with a pencil (no anti-aliasing).
///
/// `points` are canvas pixel coordinates; `width` is the pencil diameter,
/// rounded to whole pixels with a minimum of one.
pub fn pencil_polyline(img: &mut TiledImage, points: &[(f64, f64)], width: f64, color: Rgba<u8>) {
    let width = width.round().max(1.0) as u32;
    match points {
        [] => {}
        [(x, y)] => stamp(img, *x, *y, width, color),
        _ => {
            for pair in points.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                let length = (x1 - x0).hypot(y1 - y0);
                let steps = (length / STAMP_SPACING).ceil().max(1.0) as usize;
                for i in 0..=steps {
                    let t = i as f64 / steps as f64;
                    stamp(img, x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, width, color);
                }
            }
        }
    }
}
