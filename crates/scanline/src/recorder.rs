//! The recording sink's contract.

use scanline_core::prelude::Resolution;

/// A consumer of scaled output frames with a fixed video resolution.
///
/// While a recorder reports itself active, the scaler's target size is
/// locked to [`video_resolution`](Recorder::video_resolution) and every
/// produced frame is pushed here before the display sees it.
pub trait Recorder: Send {
    fn is_active(&self) -> bool;
    fn video_resolution(&self) -> Resolution;
    fn push_frame(&mut self, px: &[u8], res: Resolution);
}

/// Placeholder recorder that never activates.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn is_active(&self) -> bool {
        false
    }

    fn video_resolution(&self) -> Resolution {
        Resolution::default()
    }

    fn push_frame(&mut self, _px: &[u8], _res: Resolution) {}
}
