use rayon::prelude::*;

use scanline_core::prelude::Resolution;

use super::OpContext;
use crate::catalogue::{denoise_nlm, denoise_temporal};

/// Hold pixels at their previous value while they stay within the noise
/// threshold of it; larger changes pass through and become the new
/// reference.
pub(super) fn temporal(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    if !ctx.has_prev(res) {
        ctx.store_prev(px, res);
        return;
    }
    let threshold = params[denoise_temporal::THRESHOLD];
    for (current, reference) in px.chunks_exact_mut(4).zip(ctx.prev.chunks_exact_mut(4)) {
        let delta = current
            .iter()
            .zip(reference.iter())
            .take(3)
            .map(|(&a, &b)| a.abs_diff(b))
            .max()
            .unwrap_or(0);
        if delta <= threshold {
            current.copy_from_slice(reference);
        } else {
            reference.copy_from_slice(current);
        }
    }
}

/// Single-frame non-local-means denoise.
///
/// Patch similarity is measured on luminance; the same weights smooth all
/// three color channels. Window sizes come from the blob but are capped so
/// a pathological configuration cannot stall the pipeline.
pub(super) fn nonlocal_means(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let h_luma = f32::from(params[denoise_nlm::H].max(1));
    let h_color = f32::from(params[denoise_nlm::H_COLOR].max(1));
    let template_r = (usize::from(params[denoise_nlm::TEMPLATE_WINDOW]) / 2).clamp(1, 3);
    let search_r = (usize::from(params[denoise_nlm::SEARCH_WINDOW]) / 2).clamp(1, 10);

    let (w, h) = (res.w as usize, res.h as usize);
    if w <= 2 * (template_r + search_r) || h <= 2 * (template_r + search_r) {
        return;
    }

    // Luminance plane for patch comparison.
    let luma: Vec<f32> = px
        .chunks_exact(4)
        .map(|p| 0.114 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.299 * f32::from(p[2]))
        .collect();

    let src = ctx.scratch(px.len());
    src.copy_from_slice(px);
    let src = &*src;
    let luma = &luma;

    let norm = 1.0 / ((2 * template_r + 1).pow(2) as f32);
    let row_bytes = w * 4;
    px.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            for x in 0..w {
                let mut weight_sum = 0.0f32;
                let mut acc = [0.0f32; 3];
                let y_lo = y.saturating_sub(search_r);
                let y_hi = (y + search_r).min(h - 1);
                let x_lo = x.saturating_sub(search_r);
                let x_hi = (x + search_r).min(w - 1);
                for sy in y_lo..=y_hi {
                    for sx in x_lo..=x_hi {
                        let dist = patch_distance(luma, w, h, (x, y), (sx, sy), template_r) * norm;
                        let weight = (-dist / (h_luma * h_luma)).exp();
                        if weight < 1e-4 {
                            continue;
                        }
                        let off = (sy * w + sx) * 4;
                        for c in 0..3 {
                            acc[c] += weight * f32::from(src[off + c]);
                        }
                        weight_sum += weight;
                    }
                }
                if weight_sum > 0.0 {
                    let off = x * 4;
                    let blend = (h_color / 255.0).clamp(0.0, 1.0);
                    for c in 0..3 {
                        let denoised = acc[c] / weight_sum;
                        let original = f32::from(src[(y * w + x) * 4 + c]);
                        dst_row[off + c] =
                            (original + (denoised - original) * blend.max(0.2)).round() as u8;
                    }
                }
            }
        });
}

fn patch_distance(
    luma: &[f32],
    w: usize,
    h: usize,
    a: (usize, usize),
    b: (usize, usize),
    radius: usize,
) -> f32 {
    let mut sum = 0.0f32;
    let r = radius as isize;
    for dy in -r..=r {
        for dx in -r..=r {
            let ax = (a.0 as isize + dx).clamp(0, w as isize - 1) as usize;
            let ay = (a.1 as isize + dy).clamp(0, h as isize - 1) as usize;
            let bx = (b.0 as isize + dx).clamp(0, w as isize - 1) as usize;
            let by = (b.1 as isize + dy).clamp(0, h as isize - 1) as usize;
            let d = luma[ay * w + ax] - luma[by * w + bx];
            sum += d * d;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{FilterKind, PARAM_BLOB_LEN};

    #[test]
    fn temporal_passes_large_changes_through() {
        let res = Resolution::new(1, 1, 32);
        let mut ctx = OpContext::new();
        let mut params = [0u8; PARAM_BLOB_LEN];
        params[denoise_temporal::THRESHOLD] = 5;

        let mut first = vec![10, 10, 10, 255];
        temporal(&params, &mut ctx, &mut first, res);

        let mut second = vec![200, 200, 200, 255];
        temporal(&params, &mut ctx, &mut second, res);
        assert_eq!(second, vec![200, 200, 200, 255]);

        // The reference moved with the scene change.
        let mut third = vec![203, 198, 201, 255];
        temporal(&params, &mut ctx, &mut third, res);
        assert_eq!(third, vec![200, 200, 200, 255]);
    }

    #[test]
    fn nlm_smooths_uniform_noise_without_destroying_edges() {
        let res = Resolution::new(16, 16, 32);
        let mut px = vec![0u8; 16 * 16 * 4];
        // Left half dark, right half bright, one noisy pixel per half.
        for y in 0..16 {
            for x in 0..16 {
                let off = (y * 16 + x) * 4;
                let v = if x < 8 { 20 } else { 220 };
                px[off..off + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        px[(8 * 16 + 3) * 4] = 40;

        let mut params = FilterKind::DenoiseNonlocalMeans.default_params();
        // Tighten the windows so they fit the small test frame.
        params[denoise_nlm::TEMPLATE_WINDOW] = 3;
        params[denoise_nlm::SEARCH_WINDOW] = 7;
        let mut ctx = OpContext::new();
        nonlocal_means(&params, &mut ctx, &mut px, res);

        // The noisy pixel moved toward its neighborhood.
        let denoised = px[(8 * 16 + 3) * 4];
        assert!(denoised < 40);
        // The bright side is still bright.
        assert!(px[(8 * 16 + 12) * 4] > 180);
    }
}
