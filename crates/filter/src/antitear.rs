//! Per-frame tear detection and reconstruction.
//!
//! A capture device that samples mid-refresh delivers frames whose upper
//! part belongs to a newer screen update than the rest. The reconstructor
//! compares each incoming frame against the previous one, copies freshly
//! updated row bands into an internal buffer, and only presents the buffer
//! once every row has been refreshed, suppressing the partial frames in
//! between.

use scanline_core::prelude::Resolution;

/// Anti-tearing reconstructor; an opaque per-frame operator.
///
/// [`apply`](AntiTear::apply) returns the reconstructed buffer, the input
/// unchanged, or `None` when the frame should be suppressed.
///
/// # Example
/// ```rust
/// use scanline_core::prelude::Resolution;
/// use scanline_filter::AntiTear;
///
/// let mut at = AntiTear::new();
/// let res = Resolution::new(4, 4, 32);
/// let frame = vec![0u8; res.frame_bytes()];
/// // Disabled by default: the input passes straight through.
/// assert!(at.apply(&frame, res).is_some());
/// ```
pub struct AntiTear {
    enabled: bool,
    threshold: u8,
    step: usize,
    matches_required: usize,
    buffer: Vec<u8>,
    prev: Vec<u8>,
    tracked: Resolution,
    row_fresh: Vec<bool>,
}

impl Default for AntiTear {
    fn default() -> Self {
        Self::new()
    }
}

impl AntiTear {
    pub fn new() -> Self {
        Self {
            enabled: false,
            threshold: 3,
            step: 1,
            matches_required: 11,
            buffer: Vec::new(),
            prev: Vec::new(),
            tracked: Resolution::default(),
            row_fresh: Vec::new(),
        }
    }

    /// Turn reconstruction on or off. Disabled, `apply` is a pass-through.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Per-channel delta above which a pixel counts as changed.
    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    /// Sample every `step`-th column when comparing rows.
    pub fn set_step(&mut self, step: usize) {
        self.step = step.max(1);
    }

    /// Changed samples a row needs before it counts as updated.
    pub fn set_matches_required(&mut self, matches: usize) {
        self.matches_required = matches.max(1);
    }

    /// Drop all reconstruction state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.prev.clear();
        self.row_fresh.clear();
        self.tracked = Resolution::default();
    }

    /// Process one frame of tightly-packed BGRA pixels.
    pub fn apply<'a>(&'a mut self, px: &'a [u8], res: Resolution) -> Option<&'a [u8]> {
        if !self.enabled {
            return Some(px_pass(self, px, res));
        }
        let len = res.w as usize * res.h as usize * 4;
        if px.len() < len {
            return None;
        }
        let px = &px[..len];

        if !self.tracked.same_extent(&res) || self.prev.len() != len {
            self.start_tracking(px, res);
            return Some(px_pass(self, px, res));
        }

        let h = res.h as usize;
        let changed: Vec<bool> = (0..h).map(|y| self.row_changed(px, res, y)).collect();
        self.prev.copy_from_slice(px);

        let changed_count = changed.iter().filter(|&&c| c).count();
        if changed_count == 0 {
            // A stable scene has nothing to reconstruct.
            return Some(px_pass(self, px, res));
        }
        if changed_count == h {
            // The whole frame refreshed at once; it is already tear-free.
            self.buffer.copy_from_slice(px);
            self.row_fresh.iter_mut().for_each(|f| *f = false);
            return Some(&self.buffer);
        }

        let row_bytes = res.w as usize * 4;
        for (y, _) in changed.iter().enumerate().filter(|&(_, c)| *c) {
            let off = y * row_bytes;
            self.buffer[off..off + row_bytes].copy_from_slice(&px[off..off + row_bytes]);
            self.row_fresh[y] = true;
        }

        if self.row_fresh.iter().all(|&f| f) {
            self.row_fresh.iter_mut().for_each(|f| *f = false);
            Some(&self.buffer)
        } else {
            None
        }
    }

    fn start_tracking(&mut self, px: &[u8], res: Resolution) {
        self.tracked = res;
        self.prev.clear();
        self.prev.extend_from_slice(px);
        self.buffer.clear();
        self.buffer.extend_from_slice(px);
        self.row_fresh = vec![false; res.h as usize];
    }

    fn row_changed(&self, px: &[u8], res: Resolution, y: usize) -> bool {
        let w = res.w as usize;
        let row = y * w * 4;
        let sampled = w.div_ceil(self.step);
        let required = self.matches_required.min(sampled);
        let mut matches = 0usize;
        let mut x = 0usize;
        while x < w {
            let off = row + x * 4;
            let differs = (0..3).any(|c| px[off + c].abs_diff(self.prev[off + c]) > self.threshold);
            if differs {
                matches += 1;
                if matches >= required {
                    return true;
                }
            }
            x += self.step;
        }
        false
    }
}

// The pass-through arm still refreshes the reference frame so that
// re-enabling reconstruction mid-stream starts from current data.
fn px_pass<'a>(at: &mut AntiTear, px: &'a [u8], res: Resolution) -> &'a [u8] {
    if at.enabled && at.tracked.same_extent(&res) && at.prev.len() == px.len() {
        at.prev.copy_from_slice(px);
    }
    px
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(res: Resolution, top: u8, bottom: u8) -> Vec<u8> {
        let (w, h) = (res.w as usize, res.h as usize);
        let mut px = vec![0u8; w * h * 4];
        for y in 0..h {
            let v = if y < h / 2 { top } else { bottom };
            for x in 0..w {
                let off = (y * w + x) * 4;
                px[off..off + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        px
    }

    #[test]
    fn disabled_is_a_pass_through() {
        let res = Resolution::new(4, 4, 32);
        let mut at = AntiTear::new();
        let px = frame(res, 7, 7);
        assert_eq!(at.apply(&px, res), Some(&px[..]));
    }

    #[test]
    fn torn_pair_reassembles_into_one_frame() {
        let res = Resolution::new(16, 8, 32);
        let mut at = AntiTear::new();
        at.set_enabled(true);
        at.set_matches_required(4);

        // Reference frame: all zeros.
        let zero = frame(res, 0, 0);
        assert!(at.apply(&zero, res).is_some());

        // Tear: the new content (50) has only reached the top half.
        let torn = frame(res, 50, 0);
        assert_eq!(at.apply(&torn, res), None);

        // The rest arrives; the reconstruction is complete.
        let complete = frame(res, 50, 50);
        let out = at.apply(&complete, res).expect("reconstructed frame");
        assert!(out.chunks_exact(4).all(|p| p[0] == 50));
    }

    #[test]
    fn full_refresh_passes_without_suppression() {
        let res = Resolution::new(8, 4, 32);
        let mut at = AntiTear::new();
        at.set_enabled(true);
        at.set_matches_required(2);

        let a = frame(res, 10, 10);
        assert!(at.apply(&a, res).is_some());
        let b = frame(res, 90, 90);
        let out = at.apply(&b, res).expect("whole-frame refresh");
        assert!(out.chunks_exact(4).all(|p| p[0] == 90));
    }

    #[test]
    fn stable_scene_is_never_suppressed() {
        let res = Resolution::new(8, 4, 32);
        let mut at = AntiTear::new();
        at.set_enabled(true);
        let px = frame(res, 5, 5);
        assert!(at.apply(&px, res).is_some());
        assert!(at.apply(&px, res).is_some());
    }
}
