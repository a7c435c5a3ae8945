//! Synthetic capture device that emits a moving test pattern.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use scanline_core::prelude::{
    ColorParams, GeometryParams, MAX_OUTPUT_HEIGHT, MAX_OUTPUT_WIDTH, PixelFormat, Resolution,
};

use crate::{
    CaptureDriver, CaptureIngress, DriverError, DriverFeatures, DriverInfo, InputSignal,
    MAX_INPUT_CHANNELS, SignalState,
};

struct VirtualState {
    resolution: Resolution,
    format: PixelFormat,
    paused: bool,
    offset: u32,
}

/// In-memory [`CaptureDriver`] for test benches and hardware-less machines.
///
/// Honors the full driver contract: channel bounds, parameter ranges, the
/// refusal to force the resolution already in effect, and callback routing
/// through a registered [`CaptureIngress`]. While started, a worker thread
/// plays the role of the vendor callback thread and delivers a moving
/// gradient pattern at the configured refresh rate; tests can instead call
/// [`pump_frame`](VirtualDriver::pump_frame) for deterministic delivery.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
/// use scanline_capture::prelude::*;
///
/// let mut driver = VirtualDriver::headless();
/// let ingress = CaptureIngress::new(Arc::new(AtomicBool::new(false)));
/// driver.load().unwrap();
/// driver.open_input(0).unwrap();
/// driver.register_callbacks(ingress.clone()).unwrap();
/// driver.pump_frame();
/// assert_eq!(ingress.next_event(), CaptureEvent::NewFrame);
/// ```
pub struct VirtualDriver {
    loaded: bool,
    channel: Option<u32>,
    active: bool,
    frame_drop: u32,
    color: ColorParams,
    geometry: GeometryParams,
    refresh_rate: u32,
    shared: Arc<Mutex<VirtualState>>,
    ingress: Option<Arc<CaptureIngress>>,
    worker: Option<thread::JoinHandle<()>>,
    worker_stop: Arc<AtomicBool>,
}

impl VirtualDriver {
    /// A driver whose worker thread runs at the given refresh rate.
    pub fn new(refresh_rate: u32) -> Self {
        Self {
            loaded: false,
            channel: None,
            active: false,
            frame_drop: 0,
            color: DEFAULT_COLOR,
            geometry: DEFAULT_GEOMETRY,
            refresh_rate,
            shared: Arc::new(Mutex::new(VirtualState {
                resolution: Resolution::new(640, 480, 32),
                format: PixelFormat::Rgb888,
                paused: false,
                offset: 0,
            })),
            ingress: None,
            worker: None,
            worker_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A driver with no worker thread; frames arrive only via `pump_frame`.
    pub fn headless() -> Self {
        Self::new(0)
    }

    /// Deliver one test-pattern frame through the registered ingress.
    pub fn pump_frame(&self) {
        if let Some(ingress) = &self.ingress {
            let mut st = self.shared.lock();
            if st.paused {
                return;
            }
            let (data, resolution) = render_pattern(&mut st);
            drop(st);
            ingress.on_frame(&data, resolution);
        }
    }

    /// Simulate a mode change announced by the device.
    pub fn trigger_mode_change(&self) {
        if let Some(ingress) = &self.ingress {
            ingress.on_mode_changed();
        }
    }

    /// Simulate losing the input signal.
    pub fn trigger_no_signal(&self) {
        if let Some(ingress) = &self.ingress {
            ingress.on_no_signal();
        }
    }

    /// Simulate a signal the device cannot lock onto.
    pub fn trigger_invalid_signal(&self) {
        if let Some(ingress) = &self.ingress {
            ingress.on_invalid_signal();
        }
    }

    /// Simulate an unrecoverable device error.
    pub fn trigger_error(&self) {
        if let Some(ingress) = &self.ingress {
            ingress.on_error();
        }
    }

    fn require_loaded(&self) -> Result<(), DriverError> {
        if self.loaded {
            Ok(())
        } else {
            Err(DriverError::CallFailed("driver not loaded".into()))
        }
    }

    fn check_range(name: &str, value: i32, min: i32, max: i32) -> Result<(), DriverError> {
        if value < min || value > max {
            return Err(DriverError::CallFailed(format!(
                "{name} value {value} outside [{min}, {max}]"
            )));
        }
        Ok(())
    }
}

impl Drop for VirtualDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

const DEFAULT_COLOR: ColorParams = ColorParams {
    bright: 32,
    contr: 128,
    red_bright: 128,
    green_bright: 128,
    blue_bright: 128,
    red_contr: 128,
    green_contr: 128,
    blue_contr: 128,
};

const MIN_COLOR: ColorParams = ColorParams {
    bright: 0,
    contr: 0,
    red_bright: 0,
    green_bright: 0,
    blue_bright: 0,
    red_contr: 0,
    green_contr: 0,
    blue_contr: 0,
};

const MAX_COLOR: ColorParams = ColorParams {
    bright: 63,
    contr: 255,
    red_bright: 255,
    green_bright: 255,
    blue_bright: 255,
    red_contr: 255,
    green_contr: 255,
    blue_contr: 255,
};

const DEFAULT_GEOMETRY: GeometryParams = GeometryParams {
    phase: 0,
    black_level: 8,
    hor_pos: 100,
    ver_pos: 11,
    hor_scale: 900,
};

// The reported ver_pos minimum sits below the value the engine is willing to
// write, mirroring hardware that corrupts capture near its own minimum.
const MIN_GEOMETRY: GeometryParams = GeometryParams {
    phase: 0,
    black_level: 0,
    hor_pos: 1,
    ver_pos: 1,
    hor_scale: 100,
};

const MAX_GEOMETRY: GeometryParams = GeometryParams {
    phase: 31,
    black_level: 255,
    hor_pos: 1200,
    ver_pos: 63,
    hor_scale: 4095,
};

impl CaptureDriver for VirtualDriver {
    fn load(&mut self) -> Result<(), DriverError> {
        self.loaded = true;
        Ok(())
    }

    fn free(&mut self) -> Result<(), DriverError> {
        self.require_loaded()?;
        self.loaded = false;
        Ok(())
    }

    fn open_input(&mut self, channel: u32) -> Result<(), DriverError> {
        self.require_loaded()?;
        if channel >= MAX_INPUT_CHANNELS {
            return Err(DriverError::InvalidChannel(channel));
        }
        self.channel = Some(channel);
        Ok(())
    }

    fn close_input(&mut self) -> Result<(), DriverError> {
        self.require_loaded()?;
        self.channel = None;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.require_loaded()?;
        if self.channel.is_none() {
            return Err(DriverError::CallFailed("no input channel open".into()));
        }
        let Some(ingress) = self.ingress.clone() else {
            return Err(DriverError::CallFailed("callbacks not registered".into()));
        };
        self.active = true;
        if self.refresh_rate > 0 && self.worker.is_none() {
            self.worker_stop.store(false, Ordering::Relaxed);
            let stop = self.worker_stop.clone();
            let shared = self.shared.clone();
            let interval = Duration::from_micros(1_000_000 / u64::from(self.refresh_rate.max(1)));
            self.worker = Some(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    {
                        let mut st = shared.lock();
                        if !st.paused {
                            let (data, resolution) = render_pattern(&mut st);
                            drop(st);
                            ingress.on_frame(&data, resolution);
                        }
                    }
                    thread::sleep(interval);
                }
            }));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.worker_stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.active = false;
        self.ingress = None;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DriverError> {
        self.require_loaded()?;
        self.shared.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DriverError> {
        self.require_loaded()?;
        self.shared.lock().paused = false;
        Ok(())
    }

    fn register_callbacks(&mut self, ingress: Arc<CaptureIngress>) -> Result<(), DriverError> {
        self.require_loaded()?;
        self.ingress = Some(ingress);
        Ok(())
    }

    fn set_frame_dropping(&mut self, drop: u32) -> Result<(), DriverError> {
        self.require_loaded()?;
        if drop >= 100 {
            return Err(DriverError::CallFailed(format!(
                "frame drop {drop} outside [0, 100)"
            )));
        }
        self.frame_drop = drop;
        Ok(())
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), DriverError> {
        self.require_loaded()?;
        let mut st = self.shared.lock();
        st.format = format;
        st.resolution.bpp = format.storage_bpp();
        Ok(())
    }

    fn pixel_format(&self) -> PixelFormat {
        self.shared.lock().format
    }

    fn capture_resolution(&self) -> Result<Resolution, DriverError> {
        self.require_loaded()?;
        Ok(self.shared.lock().resolution)
    }

    fn force_resolution(&mut self, r: Resolution) -> Result<(), DriverError> {
        self.require_loaded()?;
        let mut st = self.shared.lock();
        if st.resolution.same_extent(&r) {
            debug!(%r, "refusing to force the resolution already in effect");
            return Err(DriverError::CallFailed("resolution already set".into()));
        }
        let min = self.min_capture_resolution();
        let max = self.max_capture_resolution();
        if r.w < min.w || r.h < min.h || r.w > max.w || r.h > max.h {
            return Err(DriverError::CallFailed(format!(
                "resolution {} x {} outside device limits",
                r.w, r.h
            )));
        }
        st.resolution.w = r.w;
        st.resolution.h = r.h;
        Ok(())
    }

    fn set_brightness(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range("brightness", value, MIN_COLOR.bright, MAX_COLOR.bright)?;
        self.color.bright = value;
        Ok(())
    }

    fn set_contrast(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range("contrast", value, MIN_COLOR.contr, MAX_COLOR.contr)?;
        self.color.contr = value;
        Ok(())
    }

    fn set_colour_balance(
        &mut self,
        red_bright: i32,
        green_bright: i32,
        blue_bright: i32,
        red_contr: i32,
        green_contr: i32,
        blue_contr: i32,
    ) -> Result<(), DriverError> {
        self.require_loaded()?;
        for (name, value) in [
            ("red brightness", red_bright),
            ("green brightness", green_bright),
            ("blue brightness", blue_bright),
            ("red contrast", red_contr),
            ("green contrast", green_contr),
            ("blue contrast", blue_contr),
        ] {
            Self::check_range(name, value, 0, 255)?;
        }
        self.color.red_bright = red_bright;
        self.color.green_bright = green_bright;
        self.color.blue_bright = blue_bright;
        self.color.red_contr = red_contr;
        self.color.green_contr = green_contr;
        self.color.blue_contr = blue_contr;
        Ok(())
    }

    fn color_params(&self) -> Result<ColorParams, DriverError> {
        self.require_loaded()?;
        Ok(self.color)
    }

    fn default_color_params(&self) -> ColorParams {
        DEFAULT_COLOR
    }

    fn min_color_params(&self) -> ColorParams {
        MIN_COLOR
    }

    fn max_color_params(&self) -> ColorParams {
        MAX_COLOR
    }

    fn set_phase(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range("phase", value, MIN_GEOMETRY.phase, MAX_GEOMETRY.phase)?;
        self.geometry.phase = value;
        Ok(())
    }

    fn set_black_level(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range(
            "black level",
            value,
            MIN_GEOMETRY.black_level,
            MAX_GEOMETRY.black_level,
        )?;
        self.geometry.black_level = value;
        Ok(())
    }

    fn set_hor_pos(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range(
            "horizontal position",
            value,
            MIN_GEOMETRY.hor_pos,
            MAX_GEOMETRY.hor_pos,
        )?;
        self.geometry.hor_pos = value;
        Ok(())
    }

    fn set_ver_pos(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range(
            "vertical position",
            value,
            MIN_GEOMETRY.ver_pos,
            MAX_GEOMETRY.ver_pos,
        )?;
        self.geometry.ver_pos = value;
        Ok(())
    }

    fn set_hor_scale(&mut self, value: i32) -> Result<(), DriverError> {
        self.require_loaded()?;
        Self::check_range(
            "horizontal scale",
            value,
            MIN_GEOMETRY.hor_scale,
            MAX_GEOMETRY.hor_scale,
        )?;
        self.geometry.hor_scale = value;
        Ok(())
    }

    fn geometry_params(&self) -> Result<GeometryParams, DriverError> {
        self.require_loaded()?;
        Ok(self.geometry)
    }

    fn default_geometry_params(&self) -> GeometryParams {
        DEFAULT_GEOMETRY
    }

    fn min_geometry_params(&self) -> GeometryParams {
        MIN_GEOMETRY
    }

    fn max_geometry_params(&self) -> GeometryParams {
        MAX_GEOMETRY
    }

    fn num_inputs(&self) -> Result<u32, DriverError> {
        self.require_loaded()?;
        Ok(MAX_INPUT_CHANNELS)
    }

    fn min_capture_resolution(&self) -> Resolution {
        Resolution::new(160, 120, 16)
    }

    fn max_capture_resolution(&self) -> Resolution {
        Resolution::new(MAX_OUTPUT_WIDTH, MAX_OUTPUT_HEIGHT, 32)
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            model_name: "Virtual pattern source".into(),
            driver_version: env!("CARGO_PKG_VERSION").into(),
            firmware_version: "0".into(),
        }
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures {
            dvi: true,
            vga: true,
            ..DriverFeatures::default()
        }
    }

    fn signal(&self) -> Result<InputSignal, DriverError> {
        self.require_loaded()?;
        let Some(ingress) = &self.ingress else {
            return Err(DriverError::CallFailed("callbacks not registered".into()));
        };
        if ingress.signal_state() != SignalState::Receiving {
            return Err(DriverError::CallFailed(
                "no signal is being received".into(),
            ));
        }
        Ok(InputSignal {
            resolution: self.shared.lock().resolution,
            refresh_rate: self.refresh_rate.max(60),
            interlaced: false,
            digital: true,
            woke_up: ingress.signal_woke_up(),
        })
    }

    fn frame_rate(&self) -> Result<u32, DriverError> {
        self.require_loaded()?;
        Ok(self.refresh_rate.max(60))
    }
}

/// Paint the moving gradient pattern in the device's current format.
fn render_pattern(st: &mut VirtualState) -> (Vec<u8>, Resolution) {
    st.offset = st.offset.wrapping_add(1);
    let res = st.resolution;
    let (w, h) = (res.w as usize, res.h as usize);
    let mut data = vec![0u8; res.frame_bytes()];
    match st.format {
        PixelFormat::Rgb888 => {
            for y in 0..h {
                for x in 0..w {
                    let idx = (y * w + x) * 4;
                    data[idx] = ((st.offset as usize + x) % 256) as u8;
                    data[idx + 1] = ((st.offset as usize + y) % 256) as u8;
                    data[idx + 2] = 150;
                    data[idx + 3] = 255;
                }
            }
        }
        PixelFormat::Rgb565 | PixelFormat::Rgb555 => {
            let is_565 = st.format == PixelFormat::Rgb565;
            for y in 0..h {
                for x in 0..w {
                    let b = ((st.offset as usize + x) % 256) as u16;
                    let g = ((st.offset as usize + y) % 256) as u16;
                    let r = 150u16;
                    let packed = if is_565 {
                        ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)
                    } else {
                        ((r >> 3) << 10) | ((g >> 3) << 5) | (b >> 3)
                    };
                    let idx = (y * w + x) * 2;
                    data[idx..idx + 2].copy_from_slice(&packed.to_le_bytes());
                }
            }
        }
    }
    (data, res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureEvent;

    fn opened() -> (VirtualDriver, Arc<CaptureIngress>) {
        let mut driver = VirtualDriver::headless();
        let ingress = CaptureIngress::new(Arc::new(AtomicBool::new(false)));
        driver.load().unwrap();
        driver.open_input(0).unwrap();
        driver.register_callbacks(ingress.clone()).unwrap();
        (driver, ingress)
    }

    #[test]
    fn rejects_out_of_range_channel() {
        let mut driver = VirtualDriver::headless();
        driver.load().unwrap();
        assert!(matches!(
            driver.open_input(MAX_INPUT_CHANNELS),
            Err(DriverError::InvalidChannel(_))
        ));
    }

    #[test]
    fn refuses_forcing_the_current_resolution() {
        let (mut driver, _ingress) = opened();
        let current = driver.capture_resolution().unwrap();
        assert!(driver.force_resolution(current).is_err());
        assert!(driver.force_resolution(Resolution::new(1024, 768, 32)).is_ok());
        assert_eq!(driver.capture_resolution().unwrap().w, 1024);
    }

    #[test]
    fn pumped_frame_reaches_the_ingress() {
        let (driver, ingress) = opened();
        driver.pump_frame();
        assert_eq!(ingress.next_event(), CaptureEvent::NewFrame);
        ingress.with_frame(|res, px| {
            assert_eq!(res.w, 640);
            assert_eq!(px.len(), res.frame_bytes());
            // BGRA: red channel is constant in the pattern.
            assert_eq!(px[2], 150);
            assert_eq!(px[3], 255);
        });
    }

    #[test]
    fn setters_reject_out_of_range_values() {
        let (mut driver, _ingress) = opened();
        assert!(driver.set_brightness(64).is_err());
        assert!(driver.set_brightness(63).is_ok());
        assert!(driver.set_ver_pos(64).is_err());
        assert!(driver.set_ver_pos(1).is_ok());
        assert!(driver.set_frame_dropping(100).is_err());
        assert!(driver.set_frame_dropping(99).is_ok());
    }

    #[test]
    fn sixteen_bit_formats_emit_packed_frames() {
        let (mut driver, ingress) = opened();
        driver.set_pixel_format(PixelFormat::Rgb565).unwrap();
        driver.pump_frame();
        ingress.with_frame(|res, px| {
            assert_eq!(res.bpp, 16);
            assert_eq!(px.len(), res.frame_bytes());
        });
    }
}
