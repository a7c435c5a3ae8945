#![doc = include_str!("../README.md")]

pub use scanline_capture as capture;
pub use scanline_core as core;
pub use scanline_filter as filter;

pub mod disk;
pub mod engine;
pub mod mode_store;
#[cfg(feature = "preview")]
pub mod preview;
pub mod recorder;
pub mod scaler;

pub mod prelude {
    pub use crate::disk::DiskError;
    pub use crate::engine::{Engine, EngineConfig, EngineError, TickOutcome};
    pub use crate::mode_store::ModeStore;
    #[cfg(feature = "preview")]
    pub use crate::preview::PreviewWindow;
    pub use crate::recorder::{NullRecorder, Recorder};
    pub use crate::scaler::{AspectMode, SCALER_NAMES, Scaler, ScalerKind, scaler_names};
    pub use scanline_capture::prelude::*;
    pub use scanline_core::prelude::*;
    pub use scanline_filter::prelude::*;
}
