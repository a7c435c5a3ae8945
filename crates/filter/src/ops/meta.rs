//! Diagnostic overlays: frame-delta histogram and unique-frame counter.

use std::time::Instant;

use scanline_core::prelude::Resolution;

use super::OpContext;
use crate::catalogue::unique_count;

/// Draw a histogram of per-pixel change against the previous frame along
/// the bottom of the image.
pub(super) fn delta_histogram(ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    if !ctx.has_prev(res) {
        ctx.store_prev(px, res);
        return;
    }

    let mut bins = [0u32; 256];
    for (current, previous) in px.chunks_exact(4).zip(ctx.prev.chunks_exact(4)) {
        let delta = current
            .iter()
            .zip(previous.iter())
            .take(3)
            .map(|(&a, &b)| a.abs_diff(b))
            .max()
            .unwrap_or(0);
        bins[usize::from(delta)] += 1;
    }
    ctx.store_prev(px, res);

    let peak = bins.iter().copied().max().unwrap_or(0).max(1);
    let (w, h) = (res.w as usize, res.h as usize);
    let graph_h = (h / 4).max(1);
    for x in 0..w {
        let bin = x * 256 / w;
        let bar = (bins[bin] as usize * graph_h).div_ceil(peak as usize);
        for i in 0..bar.min(graph_h) {
            let y = h - 1 - i;
            let off = (y * w + x) * 4;
            px[off..off + 4].copy_from_slice(&[64, 255, 64, 255]);
        }
    }
}

/// Count frames that differ from their predecessor and draw the most
/// recent one-second tally into the chosen corner.
pub(super) fn unique_count(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let threshold = params[unique_count::THRESHOLD];

    if ctx.has_prev(res) {
        let is_unique = px
            .chunks_exact(4)
            .zip(ctx.prev.chunks_exact(4))
            .any(|(current, previous)| {
                current
                    .iter()
                    .zip(previous.iter())
                    .take(3)
                    .any(|(&a, &b)| a.abs_diff(b) > threshold)
            });
        if is_unique {
            ctx.unique_in_window += 1;
        }
    }
    ctx.store_prev(px, res);

    let now = Instant::now();
    match ctx.window_start {
        Some(start) if now.duration_since(start).as_secs_f32() >= 1.0 => {
            ctx.unique_shown = ctx.unique_in_window;
            ctx.unique_in_window = 0;
            ctx.window_start = Some(now);
        }
        None => ctx.window_start = Some(now),
        _ => {}
    }

    draw_counter(ctx.unique_shown, params[unique_count::CORNER], px, res);
}

// 3x5 digit glyphs, one row per byte, low three bits used.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

const GLYPH_SCALE: usize = 3;
const MARGIN: usize = 6;

fn draw_counter(value: u32, corner: u8, px: &mut [u8], res: Resolution) {
    let digits: Vec<usize> = value
        .to_string()
        .bytes()
        .map(|b| usize::from(b - b'0'))
        .collect();
    let glyph_w = 3 * GLYPH_SCALE + GLYPH_SCALE; // glyph plus spacing
    let text_w = digits.len() * glyph_w;
    let text_h = 5 * GLYPH_SCALE;

    let (w, h) = (res.w as usize, res.h as usize);
    if w < text_w + 2 * MARGIN || h < text_h + 2 * MARGIN {
        return;
    }
    let x0 = match corner {
        unique_count::CORNER_TOP_RIGHT | unique_count::CORNER_BOTTOM_RIGHT => {
            w - MARGIN - text_w
        }
        _ => MARGIN,
    };
    let y0 = match corner {
        unique_count::CORNER_BOTTOM_LEFT | unique_count::CORNER_BOTTOM_RIGHT => {
            h - MARGIN - text_h
        }
        _ => MARGIN,
    };

    for (i, &digit) in digits.iter().enumerate() {
        let gx = x0 + i * glyph_w;
        for (row, bits) in DIGITS[digit].iter().enumerate() {
            for col in 0..3 {
                let lit = bits & (0b100 >> col) != 0;
                for sy in 0..GLYPH_SCALE {
                    for sx in 0..GLYPH_SCALE {
                        let x = gx + col * GLYPH_SCALE + sx;
                        let y = y0 + row * GLYPH_SCALE + sy;
                        let off = (y * w + x) * 4;
                        let color = if lit { [255, 255, 255, 255] } else { [0, 0, 0, 255] };
                        px[off..off + 4].copy_from_slice(&color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{FilterKind, PARAM_BLOB_LEN};

    #[test]
    fn histogram_draws_nothing_on_the_first_frame() {
        let res = Resolution::new(8, 8, 32);
        let mut px = vec![10u8; 8 * 8 * 4];
        let original = px.clone();
        let mut ctx = OpContext::new();
        delta_histogram(&mut ctx, &mut px, res);
        assert_eq!(px, original);
    }

    #[test]
    fn histogram_marks_identical_frames_in_the_zero_bin() {
        let res = Resolution::new(8, 8, 32);
        let mut px = vec![10u8; 8 * 8 * 4];
        let mut ctx = OpContext::new();
        delta_histogram(&mut ctx, &mut px, res);
        delta_histogram(&mut ctx, &mut px, res);
        // All deltas are zero, so only the leftmost columns light up.
        assert_eq!(&px[(7 * 8) * 4..(7 * 8) * 4 + 4], &[64, 255, 64, 255]);
        let right = ((8 - 1) + 7 * 8) * 4;
        assert_eq!(&px[right..right + 4], &[10, 10, 10, 10]);
    }

    #[test]
    fn counter_renders_in_the_requested_corner() {
        let res = Resolution::new(64, 64, 32);
        let mut px = vec![10u8; 64 * 64 * 4];
        let mut params = FilterKind::UniqueCount.default_params();
        params[unique_count::CORNER] = unique_count::CORNER_TOP_LEFT;
        let mut ctx = OpContext::new();
        unique_count(&params, &mut ctx, &mut px, res);
        // The zero glyph's top-left block is lit white.
        let off = (MARGIN * 64 + MARGIN) * 4;
        assert_eq!(&px[off..off + 4], &[255, 255, 255, 255]);
    }

    #[test]
    fn changed_frames_are_counted() {
        let res = Resolution::new(16, 16, 32);
        let mut ctx = OpContext::new();
        let params = [0u8; PARAM_BLOB_LEN]; // threshold 0
        let mut a = vec![0u8; 16 * 16 * 4];
        unique_count(&params, &mut ctx, &mut a, res);
        let mut b = vec![50u8; 16 * 16 * 4];
        unique_count(&params, &mut ctx, &mut b, res);
        assert_eq!(ctx.unique_in_window, 1);
    }
}
