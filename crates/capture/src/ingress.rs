use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use scanline_core::prelude::{MAX_BIT_DEPTH, MAX_FRAME_BYTES, PixelBuffer, Resolution};

use crate::event::{CaptureEvent, SignalState};

/// Single-slot frame handoff between driver callbacks and the pipeline.
///
/// Frames the device delivers while the previous one is still unprocessed
/// are dropped without taking the mutex; only the `captured`/`processed`
/// equality matters, so all counters are relaxed atomics and wrap freely.
/// The slot's contents are fenced by the ingress mutex, which every callback
/// and every pipeline-side accessor holds for its duration.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
/// use scanline_capture::prelude::*;
/// use scanline_core::prelude::Resolution;
///
/// let ingress = CaptureIngress::new(Arc::new(AtomicBool::new(false)));
/// ingress.on_frame(&[0u8; 16], Resolution::new(2, 2, 32));
/// assert_eq!(ingress.next_event(), CaptureEvent::NewFrame);
/// ingress.mark_processed();
/// assert_eq!(ingress.next_event(), CaptureEvent::None);
/// ```
pub struct CaptureIngress {
    captured: AtomicU32,
    processed: AtomicU32,
    skipped: AtomicU32,
    skip_next: AtomicU32,
    exit_requested: Arc<AtomicBool>,
    state: Mutex<IngressState>,
}

struct IngressState {
    slot: PixelBuffer,
    resolution: Resolution,
    receiving: bool,
    woke_up: bool,
    new_mode: bool,
    lost: bool,
    invalid: bool,
    // Read by `next_event` for priority-order parity but never armed; the
    // invalid condition is tracked purely as the steady `invalid` flag.
    became_invalid: bool,
    unrecoverable: bool,
}

impl CaptureIngress {
    /// Allocate the ingress with a slot sized for the largest legal frame.
    pub fn new(exit_requested: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self {
            captured: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
            skip_next: AtomicU32::new(0),
            exit_requested,
            state: Mutex::new(IngressState {
                slot: PixelBuffer::with_capacity(MAX_FRAME_BYTES),
                resolution: Resolution::new(640, 480, 32),
                receiving: true,
                woke_up: false,
                new_mode: false,
                lost: false,
                invalid: false,
                became_invalid: false,
                unrecoverable: false,
            }),
        })
    }

    /// Driver callback: a frame has been captured.
    ///
    /// Runs on the driver's thread. If the previous frame has not been
    /// processed yet the new one is counted as skipped without touching the
    /// mutex; otherwise the data is copied into the slot, bounded by the
    /// slot's capacity.
    pub fn on_frame(&self, data: &[u8], resolution: Resolution) {
        if self.captured.load(Ordering::Relaxed) != self.processed.load(Ordering::Relaxed) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            self.captured.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut st = self.state.lock();

        let rejected = self.exit_requested.load(Ordering::Relaxed)
            || data.is_empty()
            || resolution.bpp > MAX_BIT_DEPTH
            || !st.slot.is_allocated();
        if !rejected {
            st.slot.copy_bounded(data, resolution.frame_bytes());
            st.resolution = resolution;
        } else if resolution.bpp > MAX_BIT_DEPTH {
            warn!(bpp = resolution.bpp, "frame rejected: bit depth above maximum");
        }

        // Count the frame even when rejected so the device is not treated
        // as perpetually ahead of the pipeline.
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Driver callback: the input video mode changed.
    pub fn on_mode_changed(&self) {
        let mut st = self.state.lock();
        if self.exit_requested.load(Ordering::Relaxed) {
            return;
        }
        st.woke_up = !st.receiving;
        st.new_mode = true;
        st.invalid = false;
    }

    /// Driver callback: the device cannot make sense of the signal.
    ///
    /// Drivers apply their own invalid-signal handling before calling this.
    pub fn on_invalid_signal(&self) {
        let mut st = self.state.lock();
        if self.exit_requested.load(Ordering::Relaxed) {
            return;
        }
        st.invalid = true;
    }

    /// Driver callback: the input signal disappeared.
    ///
    /// Drivers apply their own no-signal handling before calling this.
    pub fn on_no_signal(&self) {
        self.state.lock().lost = true;
    }

    /// Driver callback: the device hit an unrecoverable error.
    pub fn on_error(&self) {
        self.state.lock().unrecoverable = true;
    }

    /// Decide the most recent capture event and advance the signal state
    /// accordingly. The order of the branches is the state machine; first
    /// match wins.
    pub fn next_event(&self) -> CaptureEvent {
        let mut st = self.state.lock();

        if st.unrecoverable {
            return CaptureEvent::UnrecoverableError;
        }
        if st.new_mode {
            st.new_mode = false;
            st.receiving = true;
            st.invalid = false;
            return CaptureEvent::NewVideoMode;
        }
        if st.lost {
            st.lost = false;
            st.receiving = false;
            return CaptureEvent::NoSignal;
        }
        if !st.receiving {
            return CaptureEvent::Sleep;
        }
        if st.became_invalid {
            st.became_invalid = false;
            st.receiving = false;
            st.invalid = true;
            return CaptureEvent::InvalidSignal;
        }
        if st.invalid {
            return CaptureEvent::Sleep;
        }
        if self.captured.load(Ordering::Relaxed) != self.processed.load(Ordering::Relaxed) {
            return CaptureEvent::NewFrame;
        }
        CaptureEvent::None
    }

    /// Mark the slot's frame as consumed and retire one pending skip.
    pub fn mark_processed(&self) {
        let _guard = self.state.lock();
        self.processed
            .store(self.captured.load(Ordering::Relaxed), Ordering::Relaxed);
        let _ = self
            .skip_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Ask for the next `n` frames to be withheld from display.
    pub fn skip_frames(&self, n: u32) {
        self.skip_next.fetch_add(n, Ordering::Relaxed);
    }

    /// Whether the frame currently in the slot should be withheld.
    pub fn should_skip_next(&self) -> bool {
        self.skip_next.load(Ordering::Relaxed) > 0
    }

    /// Borrow the slot's frame under the ingress mutex.
    ///
    /// The closure receives the frame's resolution and its bytes, bounded to
    /// the frame size.
    pub fn with_frame<R>(&self, f: impl FnOnce(Resolution, &[u8]) -> R) -> R {
        let st = self.state.lock();
        let len = st.slot.bounded(st.resolution.frame_bytes());
        f(st.resolution, &st.slot.as_slice()[..len])
    }

    /// Resolution the most recent accepted frame arrived in.
    pub fn latest_resolution(&self) -> Resolution {
        self.state.lock().resolution
    }

    /// Current signal condition.
    pub fn signal_state(&self) -> SignalState {
        let st = self.state.lock();
        if st.invalid {
            SignalState::InvalidSignal
        } else if !st.receiving {
            SignalState::NoSignal
        } else {
            SignalState::Receiving
        }
    }

    /// Whether the current signal followed a no-signal period.
    pub fn signal_woke_up(&self) -> bool {
        self.state.lock().woke_up
    }

    /// Frames the device offered while the pipeline was busy.
    pub fn missed_frames(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Whether any frame has been missed since the last reset.
    pub fn has_missed_frames(&self) -> bool {
        self.missed_frames() > 0
    }

    /// Reset the missed-frame counter.
    pub fn reset_missed_frames(&self) {
        self.skipped.store(0, Ordering::Relaxed);
    }

    /// Release the slot's backing memory during shutdown.
    pub fn release(&self) {
        self.state.lock().slot.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress() -> Arc<CaptureIngress> {
        CaptureIngress::new(Arc::new(AtomicBool::new(false)))
    }

    fn frame_bytes(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn back_to_back_frames_drop_all_but_the_first() {
        let ing = ingress();
        let data = frame_bytes(2 * 2 * 4);
        for _ in 0..4 {
            ing.on_frame(&data, Resolution::new(2, 2, 32));
        }
        assert_eq!(ing.captured.load(Ordering::Relaxed), 4);
        assert_eq!(ing.processed.load(Ordering::Relaxed), 0);
        assert_eq!(ing.missed_frames(), 3);
    }

    #[test]
    fn mark_processed_restores_equality() {
        let ing = ingress();
        ing.on_frame(&frame_bytes(16), Resolution::new(2, 2, 32));
        assert_eq!(ing.next_event(), CaptureEvent::NewFrame);
        ing.mark_processed();
        assert_eq!(
            ing.captured.load(Ordering::Relaxed),
            ing.processed.load(Ordering::Relaxed)
        );
        assert_eq!(ing.next_event(), CaptureEvent::None);
    }

    #[test]
    fn overdeep_frame_is_rejected_but_counted() {
        let ing = ingress();
        ing.on_frame(&frame_bytes(16), Resolution::new(2, 2, 64));
        assert_eq!(ing.captured.load(Ordering::Relaxed), 1);
        // The slot was not written; the frame still advances the counter so
        // the next real frame is accepted.
        assert_eq!(ing.next_event(), CaptureEvent::NewFrame);
        ing.mark_processed();
        let data = frame_bytes(16);
        ing.on_frame(&data, Resolution::new(2, 2, 32));
        ing.with_frame(|res, px| {
            assert_eq!(res, Resolution::new(2, 2, 32));
            assert_eq!(px, &data[..]);
        });
    }

    #[test]
    fn event_priority_mode_change_over_frame() {
        let ing = ingress();
        ing.on_frame(&frame_bytes(16), Resolution::new(2, 2, 32));
        ing.on_mode_changed();
        assert_eq!(ing.next_event(), CaptureEvent::NewVideoMode);
        assert_eq!(ing.next_event(), CaptureEvent::NewFrame);
    }

    #[test]
    fn signal_loss_then_sleep_until_mode_change() {
        let ing = ingress();
        ing.on_no_signal();
        assert_eq!(ing.next_event(), CaptureEvent::NoSignal);
        assert_eq!(ing.signal_state(), SignalState::NoSignal);
        assert_eq!(ing.next_event(), CaptureEvent::Sleep);
        assert_eq!(ing.next_event(), CaptureEvent::Sleep);

        ing.on_mode_changed();
        assert_eq!(ing.next_event(), CaptureEvent::NewVideoMode);
        assert_eq!(ing.signal_state(), SignalState::Receiving);
        assert!(ing.signal_woke_up());
    }

    #[test]
    fn invalid_signal_is_a_steady_sleep() {
        let ing = ingress();
        ing.on_invalid_signal();
        assert_eq!(ing.signal_state(), SignalState::InvalidSignal);
        assert_eq!(ing.next_event(), CaptureEvent::Sleep);

        // A mode change clears the condition.
        ing.on_mode_changed();
        assert_eq!(ing.next_event(), CaptureEvent::NewVideoMode);
        assert_eq!(ing.signal_state(), SignalState::Receiving);
    }

    #[test]
    fn unrecoverable_error_sticks() {
        let ing = ingress();
        ing.on_error();
        ing.on_mode_changed();
        assert_eq!(ing.next_event(), CaptureEvent::UnrecoverableError);
        assert_eq!(ing.next_event(), CaptureEvent::UnrecoverableError);
    }

    #[test]
    fn skip_counter_floors_at_zero() {
        let ing = ingress();
        ing.skip_frames(2);
        assert!(ing.should_skip_next());
        ing.mark_processed();
        ing.mark_processed();
        assert!(!ing.should_skip_next());
        ing.mark_processed();
        assert!(!ing.should_skip_next());
    }

    #[test]
    fn frames_are_ignored_after_exit_request() {
        let exit = Arc::new(AtomicBool::new(false));
        let ing = CaptureIngress::new(exit.clone());
        exit.store(true, Ordering::Relaxed);
        ing.on_frame(&frame_bytes(16), Resolution::new(2, 2, 32));
        assert_eq!(ing.captured.load(Ordering::Relaxed), 1);
        ing.with_frame(|_, px| assert!(px.iter().all(|&b| b == 0)));
    }
}
