#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod format;
pub mod params;
pub mod status;

pub mod prelude {
    pub use crate::{
        buffer::PixelBuffer,
        format::{
            MAX_BIT_DEPTH, MAX_FRAME_BYTES, MAX_OUTPUT_BPP, MAX_OUTPUT_HEIGHT, MAX_OUTPUT_WIDTH,
            MIN_OUTPUT_HEIGHT, MIN_OUTPUT_WIDTH, PixelFormat, Resolution,
        },
        params::{ColorParams, GeometryParams, MIN_VER_POS, ModeParams, ResolutionAlias},
        status::{StatusBus, StatusEvent},
    };
}
