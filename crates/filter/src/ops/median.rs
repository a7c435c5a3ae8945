use rayon::prelude::*;

use scanline_core::prelude::Resolution;

use super::{OpContext, bgra_len};
use crate::catalogue::median;

/// Per-channel median over a square window. The stored kernel size is the
/// full window width (odd); a kernel of 1 or less is a no-op.
pub(super) fn apply(params: &[u8], ctx: &mut OpContext, px: &mut [u8], res: Resolution) {
    let kernel = usize::from(params[median::KERNEL_SIZE]);
    if kernel <= 1 {
        return;
    }
    let radius = kernel / 2;
    let (w, h) = (res.w as usize, res.h as usize);
    let len = bgra_len(res);
    let src = ctx.scratch(len);
    src.copy_from_slice(px);
    let src = &*src;

    let row_bytes = w * 4;
    px.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let y_lo = y.saturating_sub(radius);
            let y_hi = (y + radius).min(h - 1);
            let mut window: Vec<u8> = Vec::with_capacity(kernel * kernel);
            for x in 0..w {
                let x_lo = x.saturating_sub(radius);
                let x_hi = (x + radius).min(w - 1);
                for c in 0..3 {
                    window.clear();
                    for sy in y_lo..=y_hi {
                        for sx in x_lo..=x_hi {
                            window.push(src[(sy * w + sx) * 4 + c]);
                        }
                    }
                    window.sort_unstable();
                    dst_row[x * 4 + c] = window[window.len() / 2];
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::PARAM_BLOB_LEN;

    #[test]
    fn median_removes_an_isolated_speck() {
        let res = Resolution::new(3, 3, 32);
        let mut px = vec![0u8; 36];
        for chunk in px.chunks_exact_mut(4) {
            chunk[3] = 255;
        }
        px[4 * 4 + 1] = 200; // green speck in the middle

        let mut params = [0u8; PARAM_BLOB_LEN];
        params[median::KERNEL_SIZE] = 3;
        let mut ctx = OpContext::new();
        super::apply(&params, &mut ctx, &mut px, res);
        assert_eq!(px[4 * 4 + 1], 0);
        // Alpha is untouched.
        assert_eq!(px[4 * 4 + 3], 255);
    }
}
