//! In-place image operators behind the filter catalogue.
//!
//! Every operator works on tightly-packed 32-bit BGRA pixels. Operators that
//! need to look back at earlier frames (temporal denoise, delta histogram,
//! unique count) keep that history in an [`OpContext`] the caller owns per
//! graph node, so the operators themselves stay stateless.

use std::time::Instant;

use scanline_core::prelude::Resolution;

use crate::catalogue::FilterKind;

mod blur;
mod denoise;
mod geometry;
mod median;
mod meta;
mod sharpen;

/// Per-node scratch and temporal state for the operators.
#[derive(Default)]
pub struct OpContext {
    /// Previous frame, for temporal operators.
    pub(crate) prev: Vec<u8>,
    pub(crate) prev_res: Resolution,
    /// General-purpose pixel scratch.
    pub(crate) scratch: Vec<u8>,
    /// Unique-count sampling window.
    pub(crate) window_start: Option<Instant>,
    pub(crate) unique_in_window: u32,
    pub(crate) unique_shown: u32,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `prev` holds a frame of the given resolution.
    pub(crate) fn has_prev(&self, res: Resolution) -> bool {
        self.prev_res.same_extent(&res) && self.prev.len() == bgra_len(res)
    }

    /// Remember `px` as the previous frame.
    pub(crate) fn store_prev(&mut self, px: &[u8], res: Resolution) {
        self.prev.clear();
        self.prev.extend_from_slice(px);
        self.prev_res = res;
    }

    /// Borrow a scratch buffer of at least `len` bytes.
    pub(crate) fn scratch(&mut self, len: usize) -> &mut [u8] {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        &mut self.scratch[..len]
    }
}

/// Byte length of a tightly-packed BGRA frame.
pub(crate) fn bgra_len(res: Resolution) -> usize {
    res.w as usize * res.h as usize * 4
}

/// Apply one catalogue filter in place. Gates are inert markers.
pub fn apply(
    kind: FilterKind,
    params: &[u8],
    ctx: &mut OpContext,
    px: &mut [u8],
    res: Resolution,
) {
    if px.len() < bgra_len(res) || res.w == 0 || res.h == 0 {
        return;
    }
    let px = &mut px[..bgra_len(res)];
    match kind {
        FilterKind::InputGate | FilterKind::OutputGate => {}
        FilterKind::Blur => blur::apply(params, ctx, px, res),
        FilterKind::Rotate => geometry::rotate(params, ctx, px, res),
        FilterKind::Crop => geometry::crop(params, ctx, px, res),
        FilterKind::Flip => geometry::flip(params, ctx, px, res),
        FilterKind::Decimate => geometry::decimate(params, px, res),
        FilterKind::Median => median::apply(params, ctx, px, res),
        FilterKind::DenoiseTemporal => denoise::temporal(params, ctx, px, res),
        FilterKind::DenoiseNonlocalMeans => denoise::nonlocal_means(params, ctx, px, res),
        FilterKind::Sharpen => sharpen::sharpen(ctx, px, res),
        FilterKind::UnsharpMask => sharpen::unsharp_mask(params, ctx, px, res),
        FilterKind::DeltaHistogram => meta::delta_histogram(ctx, px, res),
        FilterKind::UniqueCount => meta::unique_count(params, ctx, px, res),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{self, PARAM_BLOB_LEN, write_u16};

    fn solid_frame(w: u32, h: u32, bgra: [u8; 4]) -> (Vec<u8>, Resolution) {
        let res = Resolution::new(w, h, 32);
        let mut px = vec![0u8; bgra_len(res)];
        for chunk in px.chunks_exact_mut(4) {
            chunk.copy_from_slice(&bgra);
        }
        (px, res)
    }

    #[test]
    fn gates_leave_the_frame_untouched() {
        let (mut px, res) = solid_frame(4, 4, [10, 20, 30, 255]);
        let original = px.clone();
        let mut ctx = OpContext::new();
        for kind in [FilterKind::InputGate, FilterKind::OutputGate] {
            apply(kind, &kind.default_params(), &mut ctx, &mut px, res);
        }
        assert_eq!(px, original);
    }

    #[test]
    fn short_buffer_is_ignored() {
        let res = Resolution::new(8, 8, 32);
        let mut px = vec![0u8; 16];
        let mut ctx = OpContext::new();
        apply(
            FilterKind::Flip,
            &FilterKind::Flip.default_params(),
            &mut ctx,
            &mut px,
            res,
        );
        assert!(px.iter().all(|&b| b == 0));
    }

    #[test]
    fn flip_both_reverses_pixel_order() {
        let res = Resolution::new(2, 2, 32);
        let mut px: Vec<u8> = (0..16).collect();
        let mut params = [0u8; PARAM_BLOB_LEN];
        params[catalogue::flip::AXIS] = catalogue::flip::AXIS_BOTH;
        let mut ctx = OpContext::new();
        apply(FilterKind::Flip, &params, &mut ctx, &mut px, res);
        let expected: Vec<u8> = vec![
            12, 13, 14, 15, 8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3,
        ];
        assert_eq!(px, expected);
    }

    #[test]
    fn decimate_average_flattens_blocks() {
        let res = Resolution::new(2, 2, 32);
        // Two black and two white pixels in one 2x2 block.
        let mut px = vec![
            0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 255, 255, 255, 255, 255,
        ];
        let mut params = [0u8; PARAM_BLOB_LEN];
        params[catalogue::decimate::FACTOR] = 2;
        params[catalogue::decimate::TYPE] = catalogue::decimate::TYPE_AVERAGE;
        let mut ctx = OpContext::new();
        apply(FilterKind::Decimate, &params, &mut ctx, &mut px, res);
        for chunk in px.chunks_exact(4) {
            assert_eq!(&chunk[..3], &[127, 127, 127]);
        }
    }

    #[test]
    fn crop_without_scaling_pastes_at_origin() {
        let res = Resolution::new(4, 1, 32);
        let mut px: Vec<u8> = (0..16).collect();
        let mut params = [0u8; PARAM_BLOB_LEN];
        write_u16(&mut params, catalogue::crop::X, 2);
        write_u16(&mut params, catalogue::crop::Y, 0);
        write_u16(&mut params, catalogue::crop::WIDTH, 2);
        write_u16(&mut params, catalogue::crop::HEIGHT, 1);
        params[catalogue::crop::SCALER] = catalogue::crop::SCALER_NONE;
        let mut ctx = OpContext::new();
        apply(FilterKind::Crop, &params, &mut ctx, &mut px, res);
        assert_eq!(&px[0..8], &[8, 9, 10, 11, 12, 13, 14, 15]);
        assert!(px[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn temporal_denoise_holds_steady_pixels() {
        let (mut first, res) = solid_frame(2, 2, [100, 100, 100, 255]);
        let mut ctx = OpContext::new();
        let params = FilterKind::DenoiseTemporal.default_params();
        apply(FilterKind::DenoiseTemporal, &params, &mut ctx, &mut first, res);

        // Second frame wiggles by less than the threshold; output should
        // snap back to the reference.
        let (mut second, _) = solid_frame(2, 2, [102, 99, 101, 255]);
        apply(FilterKind::DenoiseTemporal, &params, &mut ctx, &mut second, res);
        assert_eq!(&second[..4], &[100, 100, 100, 255]);
    }
}
