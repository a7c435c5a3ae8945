use scanline_core::prelude::Resolution;

use super::{OpContext, bgra_len};
use crate::catalogue::{crop, decimate, flip, read_i16, read_u16, rotate};

/// Rotate about the frame center with optional uniform scaling.
///
/// The angle field is tenths of a degree, the scale field hundredths.
/// Destination pixels that map outside the source become opaque black.
pub(super) fn rotate(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let angle = f32::from(read_i16(params, rotate::ANGLE)) / 10.0;
    let scale = f32::from(read_i16(params, rotate::SCALE)) / 100.0;
    if angle == 0.0 && (scale - 1.0).abs() < f32::EPSILON {
        return;
    }
    if scale <= 0.0 {
        px.chunks_exact_mut(4).for_each(|p| p.copy_from_slice(&[0, 0, 0, 255]));
        return;
    }

    let (w, h) = (res.w as usize, res.h as usize);
    let len = bgra_len(res);
    let src = ctx.scratch(len);
    src.copy_from_slice(px);

    let rad = -angle.to_radians();
    let (sin, cos) = rad.sin_cos();
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    for y in 0..h {
        for x in 0..w {
            let dx = (x as f32 + 0.5) - cx;
            let dy = (y as f32 + 0.5) - cy;
            let sx = (dx * cos - dy * sin) / scale + cx;
            let sy = (dx * sin + dy * cos) / scale + cy;
            let dst_off = (y * w + x) * 4;
            if sx >= 0.0 && sy >= 0.0 && (sx as usize) < w && (sy as usize) < h {
                let src_off = (sy as usize * w + sx as usize) * 4;
                px[dst_off..dst_off + 4].copy_from_slice(&src[src_off..src_off + 4]);
            } else {
                px[dst_off..dst_off + 4].copy_from_slice(&[0, 0, 0, 255]);
            }
        }
    }
}

/// Cut a region out of the frame and, depending on the scaler field,
/// stretch it back over the full frame or paste it at the origin.
pub(super) fn crop(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let (w, h) = (res.w as usize, res.h as usize);
    let x0 = usize::from(read_u16(params, crop::X)).min(w.saturating_sub(1));
    let y0 = usize::from(read_u16(params, crop::Y)).min(h.saturating_sub(1));
    let cw = usize::from(read_u16(params, crop::WIDTH)).clamp(1, w - x0);
    let ch = usize::from(read_u16(params, crop::HEIGHT)).clamp(1, h - y0);

    // Lift the region out before the frame is overwritten.
    let region_len = cw * ch * 4;
    let region = ctx.scratch(region_len);
    for y in 0..ch {
        let src_off = ((y0 + y) * w + x0) * 4;
        let dst_off = y * cw * 4;
        region[dst_off..dst_off + cw * 4].copy_from_slice(&px[src_off..src_off + cw * 4]);
    }

    match params[crop::SCALER] {
        crop::SCALER_NEAREST => nearest_stretch(region, cw, ch, px, w, h),
        crop::SCALER_NONE => {
            px.fill(0);
            for y in 0..ch.min(h) {
                let src_off = y * cw * 4;
                let dst_off = y * w * 4;
                let run = cw.min(w) * 4;
                px[dst_off..dst_off + run].copy_from_slice(&region[src_off..src_off + run]);
            }
        }
        _ => bilinear_stretch(region, cw, ch, px, w, h),
    }
}

fn nearest_stretch(src: &[u8], sw: usize, sh: usize, dst: &mut [u8], dw: usize, dh: usize) {
    for y in 0..dh {
        let sy = y * sh / dh;
        for x in 0..dw {
            let sx = x * sw / dw;
            let s = (sy * sw + sx) * 4;
            let d = (y * dw + x) * 4;
            let pixel = [src[s], src[s + 1], src[s + 2], src[s + 3]];
            dst[d..d + 4].copy_from_slice(&pixel);
        }
    }
}

fn bilinear_stretch(src: &[u8], sw: usize, sh: usize, dst: &mut [u8], dw: usize, dh: usize) {
    for y in 0..dh {
        let fy = ((y as f32 + 0.5) * sh as f32 / dh as f32 - 0.5).max(0.0);
        let y0 = (fy as usize).min(sh - 1);
        let y1 = (y0 + 1).min(sh - 1);
        let ty = fy - y0 as f32;
        for x in 0..dw {
            let fx = ((x as f32 + 0.5) * sw as f32 / dw as f32 - 0.5).max(0.0);
            let x0 = (fx as usize).min(sw - 1);
            let x1 = (x0 + 1).min(sw - 1);
            let tx = fx - x0 as f32;
            let d = (y * dw + x) * 4;
            for c in 0..4 {
                let p00 = f32::from(src[(y0 * sw + x0) * 4 + c]);
                let p10 = f32::from(src[(y0 * sw + x1) * 4 + c]);
                let p01 = f32::from(src[(y1 * sw + x0) * 4 + c]);
                let p11 = f32::from(src[(y1 * sw + x1) * 4 + c]);
                let top = p00 + (p10 - p00) * tx;
                let bottom = p01 + (p11 - p01) * tx;
                dst[d + c] = (top + (bottom - top) * ty).round() as u8;
            }
        }
    }
}

/// Mirror the frame across one or both axes.
pub(super) fn flip(params: &[u8], _ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let (w, h) = (res.w as usize, res.h as usize);
    let row_bytes = w * 4;
    let axis = params[flip::AXIS];

    if axis == flip::AXIS_VERTICAL || axis == flip::AXIS_BOTH {
        for y in 0..h / 2 {
            let (top, rest) = px.split_at_mut((h - 1 - y) * row_bytes);
            top[y * row_bytes..(y + 1) * row_bytes].swap_with_slice(&mut rest[..row_bytes]);
        }
    }
    if axis == flip::AXIS_HORIZONTAL || axis == flip::AXIS_BOTH {
        for row in px.chunks_exact_mut(row_bytes) {
            for x in 0..w / 2 {
                let (a, b) = (x * 4, (w - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }
}

/// Pixelate by flattening `factor`-sized blocks to one value.
pub(super) fn decimate(params: &[u8], px: &mut [u8], res: Resolution) {
    let factor = usize::from(params[decimate::FACTOR]).max(2);
    let (w, h) = (res.w as usize, res.h as usize);
    let average = params[decimate::TYPE] == decimate::TYPE_AVERAGE;

    let mut by = 0;
    while by < h {
        let bh = factor.min(h - by);
        let mut bx = 0;
        while bx < w {
            let bw = factor.min(w - bx);
            let value = if average {
                let mut sum = [0u32; 4];
                for y in by..by + bh {
                    for x in bx..bx + bw {
                        let off = (y * w + x) * 4;
                        for c in 0..4 {
                            sum[c] += u32::from(px[off + c]);
                        }
                    }
                }
                let n = (bw * bh) as u32;
                [
                    (sum[0] / n) as u8,
                    (sum[1] / n) as u8,
                    (sum[2] / n) as u8,
                    (sum[3] / n) as u8,
                ]
            } else {
                let off = (by * w + bx) * 4;
                [px[off], px[off + 1], px[off + 2], px[off + 3]]
            };
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let off = (y * w + x) * 4;
                    px[off..off + 4].copy_from_slice(&value);
                }
            }
            bx += factor;
        }
        by += factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{FilterKind, PARAM_BLOB_LEN, write_i16};

    #[test]
    fn rotate_half_turn_reverses_the_frame() {
        let res = Resolution::new(2, 1, 32);
        let mut px = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut params = [0u8; PARAM_BLOB_LEN];
        write_i16(&mut params, rotate::ANGLE, 1800);
        write_i16(&mut params, rotate::SCALE, 100);
        let mut ctx = OpContext::new();
        super::rotate(&params, &mut ctx, &mut px, res);
        assert_eq!(px, vec![5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn identity_rotate_leaves_pixels_alone() {
        let res = Resolution::new(3, 3, 32);
        let mut px: Vec<u8> = (0..36).collect();
        let original = px.clone();
        let params = FilterKind::Rotate.default_params();
        let mut ctx = OpContext::new();
        super::rotate(&params, &mut ctx, &mut px, res);
        assert_eq!(px, original);
    }

    #[test]
    fn vertical_flip_swaps_rows() {
        let res = Resolution::new(1, 2, 32);
        let mut px = vec![1, 2, 3, 4, 9, 9, 9, 9];
        let params = FilterKind::Flip.default_params();
        let mut ctx = OpContext::new();
        super::flip(&params, &mut ctx, &mut px, res);
        assert_eq!(px, vec![9, 9, 9, 9, 1, 2, 3, 4]);
    }
}
