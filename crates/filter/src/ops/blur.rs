use rayon::prelude::*;

use scanline_core::prelude::Resolution;

use super::{OpContext, bgra_len};
use crate::catalogue::blur;

/// Box or gaussian blur. The stored kernel size is the radius times ten;
/// gaussian runs three box passes, the usual approximation.
pub(super) fn apply(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let radius = (f32::from(params[blur::KERNEL_SIZE]) / 10.0).round() as usize;
    if radius == 0 {
        return;
    }
    let passes = if params[blur::TYPE] == blur::TYPE_GAUSSIAN { 3 } else { 1 };
    let len = bgra_len(res);
    let scratch = ctx.scratch(len);
    for _ in 0..passes {
        horizontal_pass(px, scratch, res, radius);
        vertical_pass(scratch, px, res, radius);
    }
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], res: Resolution, radius: usize) {
    let w = res.w as usize;
    let row_bytes = w * 4;
    dst.par_chunks_mut(row_bytes)
        .zip(src.par_chunks(row_bytes))
        .for_each(|(dst_row, src_row)| {
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(w - 1);
                let n = (hi - lo + 1) as u32;
                let mut sum = [0u32; 4];
                for sx in lo..=hi {
                    for c in 0..4 {
                        sum[c] += u32::from(src_row[sx * 4 + c]);
                    }
                }
                for c in 0..4 {
                    dst_row[x * 4 + c] = (sum[c] / n) as u8;
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], res: Resolution, radius: usize) {
    let (w, h) = (res.w as usize, res.h as usize);
    let row_bytes = w * 4;
    dst.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(h - 1);
            let n = (hi - lo + 1) as u32;
            for x in 0..w {
                let mut sum = [0u32; 4];
                for sy in lo..=hi {
                    let off = sy * row_bytes + x * 4;
                    for c in 0..4 {
                        sum[c] += u32::from(src[off + c]);
                    }
                }
                for c in 0..4 {
                    dst_row[x * 4 + c] = (sum[c] / n) as u8;
                }
            }
        });
}
