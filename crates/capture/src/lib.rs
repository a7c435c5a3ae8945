#![doc = include_str!("../README.md")]

use std::sync::Arc;

use scanline_core::prelude::{ColorParams, GeometryParams, PixelFormat, Resolution};

pub mod event;
pub mod ingress;
pub mod virtual_driver;

pub use event::{CaptureEvent, InputSignal, SignalState};
pub use ingress::CaptureIngress;
pub use virtual_driver::VirtualDriver;

/// Highest input channel index any driver may expose.
pub const MAX_INPUT_CHANNELS: u32 = 2;

/// Errors surfaced by capture drivers and the engine's driver wrappers.
///
/// # Example
/// ```rust
/// use scanline_capture::DriverError;
///
/// let err = DriverError::InvalidChannel(7);
/// assert_eq!(err.code(), "invalid_channel");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to load the capture driver")]
    LoadFailed,
    #[error("driver call failed: {0}")]
    CallFailed(String),
    #[error("input channel {0} is out of bounds")]
    InvalidChannel(u32),
    #[error("bit depth {0} is not supported")]
    InvalidBitDepth(u32),
    #[error("device maximum capture resolution {max} exceeds the frame buffer")]
    IncompatibleDevice { max: Resolution },
    #[error("the capture device reported an unrecoverable error")]
    Unrecoverable,
}

impl DriverError {
    /// Stable string code for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::LoadFailed => "load_failed",
            DriverError::CallFailed(_) => "call_failed",
            DriverError::InvalidChannel(_) => "invalid_channel",
            DriverError::InvalidBitDepth(_) => "invalid_bit_depth",
            DriverError::IncompatibleDevice { .. } => "incompatible_device",
            DriverError::Unrecoverable => "unrecoverable",
        }
    }
}

/// Identifying strings reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub model_name: String,
    pub driver_version: String,
    pub firmware_version: String,
}

/// Capabilities the device advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverFeatures {
    pub component: bool,
    pub composite: bool,
    pub dvi: bool,
    pub svideo: bool,
    pub vga: bool,
    pub yuv: bool,
    pub dma: bool,
    pub deinterlace: bool,
}

/// Adapter over a vendor capture API.
///
/// `load` must succeed before any other call. Every setter returns a
/// `Result`; on failure the previous value remains in force on the device
/// and the caller decides whether to surface or retry. Callbacks are routed
/// through the [`CaptureIngress`] handed to `register_callbacks`; drivers
/// that have their own invalid-/no-signal handling apply it before invoking
/// the ingress. `stop` unregisters the callbacks.
pub trait CaptureDriver: Send {
    // Lifecycle.
    fn load(&mut self) -> Result<(), DriverError>;
    fn free(&mut self) -> Result<(), DriverError>;
    fn open_input(&mut self, channel: u32) -> Result<(), DriverError>;
    fn close_input(&mut self) -> Result<(), DriverError>;
    fn start(&mut self) -> Result<(), DriverError>;
    fn stop(&mut self) -> Result<(), DriverError>;
    fn pause(&mut self) -> Result<(), DriverError>;
    fn resume(&mut self) -> Result<(), DriverError>;
    fn register_callbacks(&mut self, ingress: Arc<CaptureIngress>) -> Result<(), DriverError>;

    // Capture configuration.
    fn set_frame_dropping(&mut self, drop: u32) -> Result<(), DriverError>;
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), DriverError>;
    fn pixel_format(&self) -> PixelFormat;
    fn capture_resolution(&self) -> Result<Resolution, DriverError>;
    /// Force the device into the given capture resolution. Asking for the
    /// resolution already in effect is refused.
    fn force_resolution(&mut self, r: Resolution) -> Result<(), DriverError>;

    // Color controls.
    fn set_brightness(&mut self, value: i32) -> Result<(), DriverError>;
    fn set_contrast(&mut self, value: i32) -> Result<(), DriverError>;
    #[allow(clippy::too_many_arguments)]
    fn set_colour_balance(
        &mut self,
        red_bright: i32,
        green_bright: i32,
        blue_bright: i32,
        red_contr: i32,
        green_contr: i32,
        blue_contr: i32,
    ) -> Result<(), DriverError>;
    fn color_params(&self) -> Result<ColorParams, DriverError>;
    fn default_color_params(&self) -> ColorParams;
    fn min_color_params(&self) -> ColorParams;
    fn max_color_params(&self) -> ColorParams;

    // Geometry controls.
    fn set_phase(&mut self, value: i32) -> Result<(), DriverError>;
    fn set_black_level(&mut self, value: i32) -> Result<(), DriverError>;
    fn set_hor_pos(&mut self, value: i32) -> Result<(), DriverError>;
    fn set_ver_pos(&mut self, value: i32) -> Result<(), DriverError>;
    fn set_hor_scale(&mut self, value: i32) -> Result<(), DriverError>;
    fn geometry_params(&self) -> Result<GeometryParams, DriverError>;
    fn default_geometry_params(&self) -> GeometryParams;
    fn min_geometry_params(&self) -> GeometryParams;
    fn max_geometry_params(&self) -> GeometryParams;

    // Introspection.
    fn num_inputs(&self) -> Result<u32, DriverError>;
    fn min_capture_resolution(&self) -> Resolution;
    fn max_capture_resolution(&self) -> Resolution;
    fn info(&self) -> DriverInfo;
    fn features(&self) -> DriverFeatures;
    fn signal(&self) -> Result<InputSignal, DriverError>;
    fn frame_rate(&self) -> Result<u32, DriverError>;
}

pub mod prelude {
    pub use crate::{
        CaptureDriver, CaptureEvent, CaptureIngress, DriverError, DriverFeatures, DriverInfo,
        InputSignal, MAX_INPUT_CHANNELS, SignalState, VirtualDriver,
    };
}
