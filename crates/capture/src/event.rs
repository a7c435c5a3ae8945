use scanline_core::prelude::Resolution;

/// The most urgent thing that has happened on the capture side, as reported
/// by [`CaptureIngress::next_event`](crate::CaptureIngress::next_event).
///
/// The pipeline consumes exactly one event per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Nothing happened since the last tick.
    None,
    /// No usable signal; the pipeline should idle.
    Sleep,
    /// A frame is waiting in the ingress slot.
    NewFrame,
    /// The device reported a new input mode.
    NewVideoMode,
    /// The input signal was lost.
    NoSignal,
    /// The device cannot lock onto the current signal.
    InvalidSignal,
    /// The device hit an error it cannot recover from.
    UnrecoverableError,
}

/// Signal condition as tracked by the event state machine.
///
/// Only `next_event` transitions this; callbacks merely raise flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalState {
    #[default]
    Receiving,
    NoSignal,
    InvalidSignal,
}

/// Snapshot of the incoming signal's properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSignal {
    pub resolution: Resolution,
    /// Vertical refresh in Hz.
    pub refresh_rate: u32,
    pub interlaced: bool,
    pub digital: bool,
    /// True when this signal followed a no-signal period.
    pub woke_up: bool,
}
