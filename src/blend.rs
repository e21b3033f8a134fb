use rayon::prelude::*;

use crate::buffer::{PixelBuffer, PixelFormat};

/// Per-pixel channel combination used when a layer is composited over the
/// accumulator. `Normal` is plain alpha-over; the remaining modes use the
/// standard separable blend formulas applied before the alpha interpolation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    Difference,
}

impl BlendMode {
    pub const ALL: [BlendMode; 7] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::Difference,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::HardLight => "Hard Light",
            BlendMode::Difference => "Difference",
        }
    }
}

/// Standard "source over" compositing for straight-alpha pixels.
///
/// `out = src*src_a + dst*dst_a*(1-src_a)`, renormalized by the output
/// alpha. Integer arithmetic with round-to-nearest, so an opaque source
/// passes through bit-exact.
pub fn alpha_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as u32;
    let da = dst[3] as u32;
    let inv = 255 - sa;

    // out alpha scaled by 255 to stay in integers
    let out_a_num = sa * 255 + da * inv;
    if out_a_num == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let num = src[c] as u32 * sa * 255 + dst[c] as u32 * da * inv;
        out[c] = ((num + out_a_num / 2) / out_a_num) as u8;
    }
    out[3] = ((out_a_num + 127) / 255) as u8;
    out
}

/// Composite `src` over `dst` with the given blend mode.
///
/// Non-Normal modes first mix the source channel with the backdrop channel
/// (weighted by backdrop alpha, per the usual separable-blend definition)
/// and then run the same alpha-over interpolation.
pub fn blend_over(src: [u8; 4], dst: [u8; 4], mode: BlendMode) -> [u8; 4] {
    if mode == BlendMode::Normal {
        return alpha_over(src, dst);
    }

    let da = dst[3] as f32 / 255.0;
    let mut mixed = src;
    for c in 0..3 {
        let cs = src[c] as f32 / 255.0;
        let cb = dst[c] as f32 / 255.0;
        let blended = blend_channel(mode, cb, cs);
        let out = (1.0 - da) * cs + da * blended;
        mixed[c] = (out.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    alpha_over(mixed, dst)
}

/// Separable blend function on normalized channels; `cb` is the backdrop,
/// `cs` the source.
fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => blend_channel(BlendMode::HardLight, cs, cb),
        BlendMode::HardLight => {
            if cs <= 0.5 {
                cb * 2.0 * cs
            } else {
                let s = 2.0 * cs - 1.0;
                cb + s - cb * s
            }
        }
        BlendMode::SoftLight => {
            if cs <= 0.5 {
                cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
            } else {
                let d = if cb <= 0.25 {
                    ((16.0 * cb - 12.0) * cb + 4.0) * cb
                } else {
                    cb.sqrt()
                };
                cb + (2.0 * cs - 1.0) * (d - cb)
            }
        }
        BlendMode::Difference => (cb - cs).abs(),
    }
}

/// Composite `src` onto the RGBA accumulator `dst` at the given offset.
///
/// Source pixels falling outside the accumulator are dropped silently.
/// Rows of the accumulator are independent, so they are processed in
/// parallel.
pub fn composite_over(dst: &mut PixelBuffer, src: &PixelBuffer, x_off: i32, y_off: i32, mode: BlendMode) {
    debug_assert_eq!(dst.format(), PixelFormat::Rgba);

    let (dst_w, dst_h) = dst.size();
    let (src_w, src_h) = src.size();

    // Overlap in accumulator coordinates.
    let x0 = x_off.max(0);
    let y0 = y_off.max(0);
    let x1 = (x_off as i64 + src_w as i64).min(dst_w as i64) as i32;
    let y1 = (y_off as i64 + src_h as i64).min(dst_h as i64) as i32;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = dst.stride();
    dst.data_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            if y < y0 || y >= y1 {
                return;
            }
            let src_y = (y - y_off) as u32;
            for x in x0..x1 {
                let src_px = src.sample((x - x_off) as u32, src_y);
                if src_px[3] == 0 {
                    continue;
                }
                let i = x as usize * 4;
                let dst_px = [row[i], row[i + 1], row[i + 2], row[i + 3]];
                let out = blend_over(src_px, dst_px, mode);
                row[i..i + 4].copy_from_slice(&out);
            }
        });
}
