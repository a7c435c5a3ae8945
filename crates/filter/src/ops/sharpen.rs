use rayon::prelude::*;

use scanline_core::prelude::Resolution;

use super::{OpContext, bgra_len};
use crate::catalogue::unsharp_mask;

/// Fixed 3x3 laplacian sharpen.
pub(super) fn sharpen(ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let (w, h) = (res.w as usize, res.h as usize);
    if w < 3 || h < 3 {
        return;
    }
    let len = bgra_len(res);
    let src = ctx.scratch(len);
    src.copy_from_slice(px);
    let src = &*src;

    let row_bytes = w * 4;
    px.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            if y == 0 || y == h - 1 {
                return;
            }
            for x in 1..w - 1 {
                for c in 0..3 {
                    let at = |sx: usize, sy: usize| i32::from(src[(sy * w + sx) * 4 + c]);
                    let value = 5 * at(x, y) - at(x - 1, y) - at(x + 1, y) - at(x, y - 1)
                        - at(x, y + 1);
                    dst_row[x * 4 + c] = value.clamp(0, 255) as u8;
                }
            }
        });
}

/// Unsharp masking: add back the difference between the frame and a box
/// blur of it. Strength is hundredths; radius is stored times ten.
pub(super) fn unsharp_mask(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let strength = f32::from(params[unsharp_mask::STRENGTH]) / 100.0;
    let radius = (f32::from(params[unsharp_mask::RADIUS]) / 10.0).round() as usize;
    if strength == 0.0 || radius == 0 {
        return;
    }

    let (w, h) = (res.w as usize, res.h as usize);
    let len = bgra_len(res);
    // Two scratch planes: the source copy and the blurred copy.
    let scratch = ctx.scratch(len * 2);
    let (src, blurred) = scratch.split_at_mut(len);
    src.copy_from_slice(px);
    box_blur(src, blurred, w, h, radius);
    let (src, blurred) = (&*src, &*blurred);

    let row_bytes = w * 4;
    px.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            for x in 0..w {
                let off = (y * w + x) * 4;
                for c in 0..3 {
                    let original = f32::from(src[off + c]);
                    let soft = f32::from(blurred[off + c]);
                    let value = original + (original - soft) * strength;
                    dst_row[x * 4 + c] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}

fn box_blur(src: &[u8], dst: &mut [u8], w: usize, h: usize, radius: usize) {
    for y in 0..h {
        let y_lo = y.saturating_sub(radius);
        let y_hi = (y + radius).min(h - 1);
        for x in 0..w {
            let x_lo = x.saturating_sub(radius);
            let x_hi = (x + radius).min(w - 1);
            let n = ((y_hi - y_lo + 1) * (x_hi - x_lo + 1)) as u32;
            let mut sum = [0u32; 4];
            for sy in y_lo..=y_hi {
                for sx in x_lo..=x_hi {
                    let off = (sy * w + sx) * 4;
                    for c in 0..4 {
                        sum[c] += u32::from(src[off + c]);
                    }
                }
            }
            let off = (y * w + x) * 4;
            for c in 0..4 {
                dst[off + c] = (sum[c] / n) as u8;
            }
        }
    }
}
