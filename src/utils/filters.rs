//! Stateless per-pixel raster transforms applied to whole buffers.
//!
//! These operate on a buffer copy and leave layering, offsets and history to
//! the caller: snapshot, transform the active layer's buffer, recomposite.

use crate::buffer::PixelBuffer;

/// ITU-R 601 luma, matching `image`'s grayscale weighting.
#[inline]
fn luma(px: [u8; 4]) -> u8 {
    let l = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    l.round().clamp(0.0, 255.0) as u8
}

fn map_pixels(buffer: &PixelBuffer, f: impl Fn([u8; 4]) -> [u8; 4]) -> PixelBuffer {
    let mut out = buffer.clone();
    let (width, height) = out.size();
    for y in 0..height {
        for x in 0..width {
            let px = out.sample(x, y);
            out.set_pixel(x, y, f(px)).expect("coordinates are in range");
        }
    }
    out
}

/// Desaturate to gray, keeping alpha.
pub fn grayscale(buffer: &PixelBuffer) -> PixelBuffer {
    map_pixels(buffer, |px| {
        let l = luma(px);
        [l, l, l, px[3]]
    })
}

/// Invert the color channels, keeping alpha.
pub fn invert(buffer: &PixelBuffer) -> PixelBuffer {
    map_pixels(buffer, |px| [255 - px[0], 255 - px[1], 255 - px[2], px[3]])
}

/// Warm sepia tone: grayscale scaled by (1.2, 0.95, 0.7) per channel.
pub fn sepia(buffer: &PixelBuffer) -> PixelBuffer {
    map_pixels(buffer, |px| {
        let l = luma(px) as f32;
        [
            (l * 1.2).min(255.0) as u8,
            (l * 0.95).min(255.0) as u8,
            (l * 0.7) as u8,
            px[3],
        ]
    })
}

/// Shift every color channel by `value` (−255..=255), keeping alpha.
pub fn brightness(buffer: &PixelBuffer, value: i32) -> PixelBuffer {
    map_pixels(buffer, |px| {
        let adjust = |c: u8| (c as i32 + value).clamp(0, 255) as u8;
        [adjust(px[0]), adjust(px[1]), adjust(px[2]), px[3]]
    })
}
