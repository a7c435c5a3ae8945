//! The long-lived engine value that owns every moving part of the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::{debug, error, info, warn};

use scanline_capture::prelude::*;
use scanline_core::prelude::*;
use scanline_filter::{AntiTear, FilterGraph, GraphRuntime};

use crate::disk::{self, DiskError};
use crate::mode_store::ModeStore;
use crate::recorder::Recorder;
use crate::scaler::{Scaler, convert_to_bgra};

/// Startup options for [`Engine::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub input_channel: u32,
    pub frame_drop: u32,
}

/// Errors that can end engine startup or persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Disk(#[from] DiskError),
}

/// What one pipeline tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// An event was consumed; call again soon.
    Processed,
    /// Nothing to do; the caller may yield briefly.
    Idle,
    /// The capture device failed irrecoverably; stop the loop.
    Fatal,
}

/// Owns the capture driver, ingress, mode store, filter graph, anti-tear,
/// scaler, and status bus, and runs the per-tick pipeline over them.
///
/// One `Engine` exists per process, owned by the entry point and passed by
/// reference; there is no global state.
pub struct Engine {
    driver: Box<dyn CaptureDriver>,
    ingress: Arc<CaptureIngress>,
    exit_requested: Arc<AtomicBool>,
    mode_store: ModeStore,
    graph: FilterGraph,
    graph_runtime: GraphRuntime,
    antitear: AntiTear,
    scaler: Scaler,
    status: StatusBus,
    recorder: Option<Box<dyn Recorder>>,
    resolution_requests: ArrayQueue<Resolution>,
    work: Vec<u8>,
    filtered: Vec<u8>,
    shut_down: bool,
}

impl Engine {
    /// Bring the capture chain up: load the driver, open the input, verify
    /// the device fits the frame buffer, route callbacks, start capture.
    pub fn new(
        mut driver: Box<dyn CaptureDriver>,
        status: StatusBus,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        info!("initializing the capture engine");
        driver.load()?;
        driver.open_input(config.input_channel)?;
        driver.set_frame_dropping(config.frame_drop)?;

        let max = driver.max_capture_resolution();
        if max.w > MAX_OUTPUT_WIDTH || max.h > MAX_OUTPUT_HEIGHT {
            return Err(DriverError::IncompatibleDevice { max }.into());
        }

        let exit_requested = Arc::new(AtomicBool::new(false));
        let ingress = CaptureIngress::new(exit_requested.clone());
        driver.register_callbacks(ingress.clone())?;
        driver.start()?;

        Ok(Self {
            driver,
            ingress,
            exit_requested,
            mode_store: ModeStore::new(),
            graph: FilterGraph::new(),
            graph_runtime: GraphRuntime::new(),
            antitear: AntiTear::new(),
            scaler: Scaler::new(),
            status,
            recorder: None,
            resolution_requests: ArrayQueue::new(8),
            work: Vec::new(),
            filtered: Vec::new(),
            shut_down: false,
        })
    }

    /// Consume at most one capture event.
    pub fn tick(&mut self) -> TickOutcome {
        if self.exit_requested.load(Ordering::Relaxed) {
            return TickOutcome::Idle;
        }
        while let Some(to) = self.resolution_requests.pop() {
            self.change_resolution(to);
        }

        match self.ingress.next_event() {
            CaptureEvent::UnrecoverableError => {
                error!("the capture device reported an unrecoverable error");
                self.status.publish(&StatusEvent::NewLogEntry(
                    "unrecoverable capture error; the pipeline is stopping".into(),
                ));
                TickOutcome::Fatal
            }
            CaptureEvent::NewVideoMode => {
                self.apply_new_video_mode();
                TickOutcome::Processed
            }
            CaptureEvent::NoSignal => {
                info!("the input signal was lost");
                self.scaler.clear_output();
                self.status.publish(&StatusEvent::SetNoSignal);
                TickOutcome::Processed
            }
            CaptureEvent::InvalidSignal => {
                info!("the device cannot lock onto the input signal");
                self.scaler.clear_output();
                self.status.publish(&StatusEvent::UpdateCaptureSignalInfo);
                TickOutcome::Processed
            }
            CaptureEvent::NewFrame => {
                self.process_frame();
                TickOutcome::Processed
            }
            CaptureEvent::Sleep | CaptureEvent::None => TickOutcome::Idle,
        }
    }

    fn process_frame(&mut self) {
        if self.ingress.should_skip_next() {
            debug!("withholding a frame from display, as requested");
            self.ingress.mark_processed();
            return;
        }

        let format = self.driver.pixel_format();
        let min = self.driver.min_capture_resolution();
        let max = self.driver.max_capture_resolution();

        let work = &mut self.work;
        let mut frame_res = None;
        self.ingress.with_frame(|res, px| {
            if !matches!(res.bpp, 16 | 24 | 32) {
                warn!(%res, "frame has an incompatible bit depth; ignoring it");
                return;
            }
            if res.w < min.w || res.h < min.h || res.w > max.w || res.h > max.h {
                warn!(%res, "frame size is outside the device's capture limits; ignoring it");
                return;
            }
            frame_res = Some(convert_to_bgra(px, res, format, work));
        });
        let Some(res) = frame_res else {
            self.ingress.mark_processed();
            return;
        };

        let recording = self
            .recorder
            .as_ref()
            .filter(|r| r.is_active())
            .map(|r| r.video_resolution());
        let target = self.scaler.output_resolution(res, recording);

        match self.antitear.apply(&self.work, res) {
            None => {
                self.ingress.mark_processed();
                return;
            }
            Some(frame) => {
                self.filtered.clear();
                self.filtered.extend_from_slice(frame);
            }
        }

        self.graph
            .apply(&mut self.graph_runtime, &mut self.filtered, res, target);
        self.scaler.scale(&self.filtered, res, target);

        if let Some(recorder) = self.recorder.as_mut().filter(|r| r.is_active()) {
            let (px, out_res) = self.scaler.output();
            recorder.push_frame(px, out_res);
        }

        self.ingress.mark_processed();
    }

    /// React to a mode change: resolve aliases, push the stored parameters
    /// to the device, and withhold the first frames of the new mode.
    fn apply_new_video_mode(&mut self) {
        let reported = match self.driver.capture_resolution() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "driver failed to report its capture resolution");
                return;
            }
        };

        let mut active = reported;
        match self.mode_store.resolve_alias(reported) {
            Some(to) if !to.same_extent(&reported) => {
                let wanted = Resolution::new(to.w, to.h, reported.bpp);
                match self.driver.force_resolution(wanted) {
                    Ok(()) => {
                        active = wanted;
                        self.mode_store.set_current_aliased(true);
                    }
                    Err(e) => {
                        debug!(error = %e, "failed to apply an alias");
                        self.mode_store.set_current_aliased(false);
                    }
                }
            }
            // An alias that maps a resolution to itself would be refused by
            // the driver anyway; skip the call.
            Some(_) | None => self.mode_store.set_current_aliased(false),
        }

        self.apply_mode_params(active);
        self.ingress.skip_frames(2);
        info!(%active, "capturer reports a new input mode");

        self.status.publish(&StatusEvent::SetReceivingSignal);
        self.status.publish(&StatusEvent::UpdateCaptureSignalInfo);
        self.status.publish(&StatusEvent::UpdateVideoParams);
        self.status.publish(&StatusEvent::UpdateWindowSize);
    }

    /// Push every stored (or default) parameter for `r` to the device.
    fn apply_mode_params(&mut self, r: Resolution) {
        let defaults = (
            self.driver.default_color_params(),
            self.driver.default_geometry_params(),
        );
        self.mode_store.upsert(r, None, None, defaults, &self.status);
        let params = self.mode_store.params_for(r, defaults);
        debug!(resolution = %r, "applying mode parameters");
        self.write_params(&params);
    }

    fn write_params(&mut self, p: &ModeParams) {
        let floor = self.driver.min_geometry_params().ver_pos.max(MIN_VER_POS);
        let g = p.geometry;
        let c = p.color;
        let writes = [
            ("phase", self.driver.set_phase(g.phase)),
            ("black level", self.driver.set_black_level(g.black_level)),
            ("horizontal scale", self.driver.set_hor_scale(g.hor_scale)),
            ("horizontal position", self.driver.set_hor_pos(g.hor_pos)),
            (
                "vertical position",
                self.driver.set_ver_pos(g.ver_pos.max(floor)),
            ),
            ("brightness", self.driver.set_brightness(c.bright)),
            ("contrast", self.driver.set_contrast(c.contr)),
            (
                "colour balance",
                self.driver.set_colour_balance(
                    c.red_bright,
                    c.green_bright,
                    c.blue_bright,
                    c.red_contr,
                    c.green_contr,
                    c.blue_contr,
                ),
            ),
        ];
        for (name, result) in writes {
            if let Err(e) = result {
                warn!(parameter = name, error = %e, "driver rejected a parameter write");
            }
        }
    }

    fn change_resolution(&mut self, to: Resolution) {
        info!(%to, "changing the capture resolution by request");
        match self.driver.force_resolution(to) {
            Ok(()) => self.apply_new_video_mode(),
            Err(e) => warn!(error = %e, "failed to change the capture resolution"),
        }
    }

    /// Update the device's color parameters for the current mode.
    ///
    /// Ignored while no signal is received. On a driver failure the prior
    /// values stay in force and `false` is returned.
    pub fn set_capture_color_params(&mut self, c: ColorParams) -> bool {
        if self.ingress.signal_state() != SignalState::Receiving {
            debug!("asked to set color params without a signal; ignoring");
            return false;
        }
        let writes = [
            self.driver.set_brightness(c.bright),
            self.driver.set_contrast(c.contr),
            self.driver.set_colour_balance(
                c.red_bright,
                c.green_bright,
                c.blue_bright,
                c.red_contr,
                c.green_contr,
                c.blue_contr,
            ),
        ];
        if let Some(e) = writes.into_iter().find_map(Result::err) {
            warn!(error = %e, "driver rejected the color parameters");
            return false;
        }
        self.remember_current_mode(Some(c), None);
        self.status.publish(&StatusEvent::UpdateVideoParams);
        true
    }

    /// Update the device's signal geometry for the current mode.
    ///
    /// A vertical position below the engine floor is rejected outright,
    /// even when the driver itself would accept it.
    pub fn set_capture_video_params(&mut self, g: GeometryParams) -> bool {
        if self.ingress.signal_state() != SignalState::Receiving {
            debug!("asked to set video params without a signal; ignoring");
            return false;
        }
        let floor = self.driver.min_geometry_params().ver_pos.max(MIN_VER_POS);
        if g.ver_pos < floor {
            warn!(
                ver_pos = g.ver_pos,
                floor, "rejecting a vertical position below the safe floor"
            );
            return false;
        }
        let writes = [
            self.driver.set_phase(g.phase),
            self.driver.set_black_level(g.black_level),
            self.driver.set_hor_pos(g.hor_pos),
            self.driver.set_hor_scale(g.hor_scale),
            self.driver.set_ver_pos(g.ver_pos),
        ];
        if let Some(e) = writes.into_iter().find_map(Result::err) {
            warn!(error = %e, "driver rejected the video parameters");
            return false;
        }
        self.remember_current_mode(None, Some(g));
        self.status.publish(&StatusEvent::UpdateVideoParams);
        true
    }

    fn remember_current_mode(&mut self, c: Option<ColorParams>, g: Option<GeometryParams>) {
        if let Ok(r) = self.driver.capture_resolution() {
            let defaults = (
                self.driver.default_color_params(),
                self.driver.default_geometry_params(),
            );
            self.mode_store.upsert(r, c, g, defaults, &self.status);
        }
    }

    /// Nudge the vertical capture position. Bounds errors return false;
    /// a zero delta is a no-op success.
    pub fn adjust_vertical_offset(&mut self, delta: i32) -> bool {
        if delta == 0 {
            return true;
        }
        let Ok(current) = self.driver.geometry_params() else {
            return false;
        };
        let wanted = current.ver_pos + delta;
        let floor = self.driver.min_geometry_params().ver_pos.max(MIN_VER_POS);
        if wanted < floor || wanted > self.driver.max_geometry_params().ver_pos {
            return false;
        }
        if self.driver.set_ver_pos(wanted).is_ok() {
            self.status.publish(&StatusEvent::UpdateVideoParams);
        }
        true
    }

    /// Nudge the horizontal capture position.
    pub fn adjust_horizontal_offset(&mut self, delta: i32) -> bool {
        if delta == 0 {
            return true;
        }
        let Ok(current) = self.driver.geometry_params() else {
            return false;
        };
        let wanted = current.hor_pos + delta;
        if wanted < self.driver.min_geometry_params().hor_pos
            || wanted > self.driver.max_geometry_params().hor_pos
        {
            return false;
        }
        if self.driver.set_hor_pos(wanted).is_ok() {
            self.status.publish(&StatusEvent::UpdateVideoParams);
        }
        true
    }

    /// Select the capture color depth (24, 16, or 15 bits). One frame is
    /// withheld afterwards to hide the switch-over garbage.
    pub fn set_output_bit_depth(&mut self, bpp: u32) -> Result<(), DriverError> {
        let format = PixelFormat::from_bit_depth(bpp).ok_or(DriverError::InvalidBitDepth(bpp))?;
        self.driver.set_pixel_format(format)?;
        self.ingress.skip_frames(1);
        Ok(())
    }

    /// Replace the alias set; if the current resolution is now aliased, a
    /// resolution switch is queued for the next tick.
    pub fn update_aliases(&mut self, list: Vec<ResolutionAlias>) {
        self.mode_store.set_aliases(list, &self.status);
        if self.ingress.signal_state() == SignalState::Receiving
            && let Ok(current) = self.driver.capture_resolution()
            && let Some(to) = self.mode_store.resolve_alias(current)
            && !to.same_extent(&current)
        {
            let _ = self
                .resolution_requests
                .push(Resolution::new(to.w, to.h, current.bpp));
        }
    }

    pub fn load_aliases(&mut self, path: &Path) -> Result<(), DiskError> {
        let aliases = disk::load_aliases(path)?;
        self.update_aliases(aliases);
        Ok(())
    }

    pub fn save_aliases(&self, path: &Path) -> Result<(), DiskError> {
        disk::save_aliases(path, self.mode_store.aliases())
    }

    pub fn load_mode_params(&mut self, path: &Path) -> Result<(), DiskError> {
        let modes = disk::load_mode_params(path)?;
        self.mode_store.replace_modes(modes, &self.status);
        self.status
            .publish(&StatusEvent::NewModeSettingsSourceFile(path.to_path_buf()));
        // The parameters for the current mode may have changed.
        if self.ingress.signal_state() == SignalState::Receiving
            && let Ok(current) = self.driver.capture_resolution()
        {
            self.apply_mode_params(current);
        }
        Ok(())
    }

    pub fn save_mode_params(&self, path: &Path) -> Result<(), DiskError> {
        disk::save_mode_params(path, self.mode_store.modes())?;
        self.status
            .publish(&StatusEvent::NewModeSettingsSourceFile(path.to_path_buf()));
        Ok(())
    }

    pub fn load_filter_graph(&mut self, path: &Path) -> Result<(), DiskError> {
        let graph = disk::load_filter_graph(path)?;
        self.set_filter_graph(graph);
        Ok(())
    }

    pub fn save_filter_graph(&self, path: &Path) -> Result<(), DiskError> {
        disk::save_filter_graph(path, &self.graph)
    }

    /// Replace the filter graph wholesale; operator state starts fresh and
    /// looping chains are announced on the bus.
    pub fn set_filter_graph(&mut self, mut graph: FilterGraph) {
        let report = graph.rebuild_chains();
        if report.cycles > 0 {
            self.status.publish(&StatusEvent::NewLogEntry(format!(
                "{} filter chain(s) are connected in a loop and stay unusable until disconnected",
                report.cycles
            )));
        }
        self.graph = graph;
        self.graph_runtime.clear();
    }

    pub fn filter_graph(&self) -> &FilterGraph {
        &self.graph
    }

    pub fn set_recorder(&mut self, recorder: Option<Box<dyn Recorder>>) {
        self.recorder = recorder;
    }

    /// Frames the device offered while the pipeline was busy.
    pub fn missed_frame_count(&self) -> u32 {
        self.ingress.missed_frames()
    }

    pub fn reset_missed_frame_count(&self) {
        self.ingress.reset_missed_frames();
    }

    /// Switch to another input channel on the device.
    pub fn set_input_channel(&mut self, channel: u32) -> Result<(), DriverError> {
        if channel >= MAX_INPUT_CHANNELS {
            return Err(DriverError::InvalidChannel(channel));
        }
        self.driver.open_input(channel)
    }

    /// Ask the device to drop `n` of every hundred frames at the source.
    pub fn set_frame_dropping(&mut self, n: u32) -> Result<(), DriverError> {
        self.driver.set_frame_dropping(n)
    }

    /// The capture resolution the device currently reports.
    pub fn capture_resolution(&self) -> Result<Resolution, DriverError> {
        self.driver.capture_resolution()
    }

    /// Identifying strings of the capture device.
    pub fn device_info(&self) -> DriverInfo {
        self.driver.info()
    }

    /// Capabilities the capture device advertises.
    pub fn device_features(&self) -> DriverFeatures {
        self.driver.features()
    }

    /// Snapshot of the incoming signal, when one is being received.
    pub fn input_signal(&self) -> Option<InputSignal> {
        self.driver.signal().ok()
    }

    pub fn ingress(&self) -> Arc<CaptureIngress> {
        self.ingress.clone()
    }

    pub fn status(&self) -> &StatusBus {
        &self.status
    }

    pub fn mode_store(&self) -> &ModeStore {
        &self.mode_store
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn scaler_mut(&mut self) -> &mut Scaler {
        &mut self.scaler
    }

    pub fn antitear_mut(&mut self) -> &mut AntiTear {
        &mut self.antitear
    }

    /// Stop capture, unregister callbacks, and release the frame buffers.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("releasing the capture engine");
        self.exit_requested.store(true, Ordering::Relaxed);
        if let Err(e) = self.driver.stop() {
            warn!(error = %e, "failed to stop capture cleanly");
        }
        if let Err(e) = self.driver.free() {
            warn!(error = %e, "failed to free the capture driver");
        }
        self.ingress.release();
        self.scaler.release();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Wraps the virtual driver and records every parameter write.
    struct RecordingDriver {
        inner: VirtualDriver,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingDriver {
        fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                inner: VirtualDriver::headless(),
                log,
            }
        }

        fn record(&self, entry: String) {
            self.log.lock().push(entry);
        }
    }

    impl CaptureDriver for RecordingDriver {
        fn load(&mut self) -> Result<(), DriverError> {
            self.inner.load()
        }
        fn free(&mut self) -> Result<(), DriverError> {
            self.inner.free()
        }
        fn open_input(&mut self, channel: u32) -> Result<(), DriverError> {
            self.inner.open_input(channel)
        }
        fn close_input(&mut self) -> Result<(), DriverError> {
            self.inner.close_input()
        }
        fn start(&mut self) -> Result<(), DriverError> {
            self.inner.start()
        }
        fn stop(&mut self) -> Result<(), DriverError> {
            self.inner.stop()
        }
        fn pause(&mut self) -> Result<(), DriverError> {
            self.inner.pause()
        }
        fn resume(&mut self) -> Result<(), DriverError> {
            self.inner.resume()
        }
        fn register_callbacks(&mut self, ingress: Arc<CaptureIngress>) -> Result<(), DriverError> {
            self.inner.register_callbacks(ingress)
        }
        fn set_frame_dropping(&mut self, drop: u32) -> Result<(), DriverError> {
            self.inner.set_frame_dropping(drop)
        }
        fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), DriverError> {
            self.inner.set_pixel_format(format)
        }
        fn pixel_format(&self) -> PixelFormat {
            self.inner.pixel_format()
        }
        fn capture_resolution(&self) -> Result<Resolution, DriverError> {
            self.inner.capture_resolution()
        }
        fn force_resolution(&mut self, r: Resolution) -> Result<(), DriverError> {
            self.record(format!("force {}x{}", r.w, r.h));
            self.inner.force_resolution(r)
        }
        fn set_brightness(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("bright {value}"));
            self.inner.set_brightness(value)
        }
        fn set_contrast(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("contr {value}"));
            self.inner.set_contrast(value)
        }
        fn set_colour_balance(
            &mut self,
            rb: i32,
            gb: i32,
            bb: i32,
            rc: i32,
            gc: i32,
            bc: i32,
        ) -> Result<(), DriverError> {
            self.record(format!("balance {rb} {gb} {bb} {rc} {gc} {bc}"));
            self.inner.set_colour_balance(rb, gb, bb, rc, gc, bc)
        }
        fn color_params(&self) -> Result<ColorParams, DriverError> {
            self.inner.color_params()
        }
        fn default_color_params(&self) -> ColorParams {
            self.inner.default_color_params()
        }
        fn min_color_params(&self) -> ColorParams {
            self.inner.min_color_params()
        }
        fn max_color_params(&self) -> ColorParams {
            self.inner.max_color_params()
        }
        fn set_phase(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("phase {value}"));
            self.inner.set_phase(value)
        }
        fn set_black_level(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("black {value}"));
            self.inner.set_black_level(value)
        }
        fn set_hor_pos(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("hpos {value}"));
            self.inner.set_hor_pos(value)
        }
        fn set_ver_pos(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("vpos {value}"));
            self.inner.set_ver_pos(value)
        }
        fn set_hor_scale(&mut self, value: i32) -> Result<(), DriverError> {
            self.record(format!("hscale {value}"));
            self.inner.set_hor_scale(value)
        }
        fn geometry_params(&self) -> Result<GeometryParams, DriverError> {
            self.inner.geometry_params()
        }
        fn default_geometry_params(&self) -> GeometryParams {
            self.inner.default_geometry_params()
        }
        fn min_geometry_params(&self) -> GeometryParams {
            self.inner.min_geometry_params()
        }
        fn max_geometry_params(&self) -> GeometryParams {
            self.inner.max_geometry_params()
        }
        fn num_inputs(&self) -> Result<u32, DriverError> {
            self.inner.num_inputs()
        }
        fn min_capture_resolution(&self) -> Resolution {
            self.inner.min_capture_resolution()
        }
        fn max_capture_resolution(&self) -> Resolution {
            self.inner.max_capture_resolution()
        }
        fn info(&self) -> DriverInfo {
            self.inner.info()
        }
        fn features(&self) -> DriverFeatures {
            self.inner.features()
        }
        fn signal(&self) -> Result<InputSignal, DriverError> {
            self.inner.signal()
        }
        fn frame_rate(&self) -> Result<u32, DriverError> {
            self.inner.frame_rate()
        }
    }

    fn engine_with_log() -> (Engine, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = RecordingDriver::new(log.clone());
        let engine = Engine::new(Box::new(driver), StatusBus::new(), EngineConfig::default())
            .expect("engine");
        (engine, log)
    }

    fn pattern_frame(res: Resolution) -> Vec<u8> {
        let mut data = vec![0u8; res.frame_bytes()];
        for (i, chunk) in data.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&[(i % 251) as u8, 77, 150, 255]);
        }
        data
    }

    #[test]
    fn identity_pipeline_reproduces_the_frame() {
        let (mut engine, _log) = engine_with_log();
        engine.scaler_mut().set_forced_aspect(false);

        let res = Resolution::new(640, 480, 32);
        let frame = pattern_frame(res);
        let ingress = engine.ingress();
        ingress.on_frame(&frame, res);

        assert_eq!(engine.tick(), TickOutcome::Processed);
        let (out, out_res) = engine.scaler().output();
        assert_eq!(out_res, Resolution::new(640, 480, 32));
        assert_eq!(out, &frame[..]);
        assert_eq!(engine.tick(), TickOutcome::Idle);
    }

    #[test]
    fn alias_switch_forces_the_target_resolution() {
        let (mut engine, log) = engine_with_log();

        // The alias points 800x600 at 1024x768; the device still reports
        // 640x480 at this point, so no switch is queued yet.
        engine.update_aliases(vec![ResolutionAlias {
            from: Resolution::new(800, 600, 0),
            to: Resolution::new(1024, 768, 0),
        }]);

        // The device changes mode to 800x600 behind the engine's back.
        engine
            .driver
            .force_resolution(Resolution::new(800, 600, 32))
            .unwrap();
        log.lock().clear();

        engine.ingress().on_mode_changed();
        assert_eq!(engine.tick(), TickOutcome::Processed);

        assert!(log.lock().iter().any(|e| e == "force 1024x768"));
        assert_eq!(
            engine.capture_resolution().unwrap().w,
            1024,
            "the device should now run the alias target"
        );
        assert!(engine.mode_store().is_current_aliased());
        assert!(engine.ingress().should_skip_next());

        // Mode parameters were applied for the alias target.
        assert!(
            engine
                .mode_store()
                .modes()
                .iter()
                .any(|m| m.resolution.same_extent(&Resolution::new(1024, 768, 0)))
        );
    }

    #[test]
    fn repeated_mode_events_write_identical_parameters() {
        let (mut engine, log) = engine_with_log();

        engine.ingress().on_mode_changed();
        assert_eq!(engine.tick(), TickOutcome::Processed);
        let first = std::mem::take(&mut *log.lock());

        engine.ingress().on_mode_changed();
        assert_eq!(engine.tick(), TickOutcome::Processed);
        let second = std::mem::take(&mut *log.lock());

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn ver_pos_below_floor_is_rejected() {
        let (mut engine, log) = engine_with_log();
        // The virtual driver's own minimum is 1, below the engine floor.
        let params = GeometryParams {
            ver_pos: 1,
            ..engine.driver.default_geometry_params()
        };
        log.lock().clear();
        assert!(!engine.set_capture_video_params(params));
        assert!(log.lock().is_empty(), "no write may reach the driver");

        let params = GeometryParams { ver_pos: 2, ..params };
        assert!(engine.set_capture_video_params(params));
    }

    #[test]
    fn signal_loss_blanks_the_output() {
        let (mut engine, _log) = engine_with_log();
        engine.scaler_mut().set_forced_aspect(false);

        let res = Resolution::new(640, 480, 32);
        let ingress = engine.ingress();
        ingress.on_frame(&pattern_frame(res), res);
        engine.tick();

        ingress.on_no_signal();
        assert_eq!(engine.tick(), TickOutcome::Processed);
        let (out, _) = engine.scaler().output();
        assert!(out.iter().all(|&b| b == 0));
        // With the signal gone the pipeline idles.
        assert_eq!(engine.tick(), TickOutcome::Idle);
    }

    #[test]
    fn unrecoverable_error_is_fatal() {
        let (mut engine, _log) = engine_with_log();
        engine.ingress().on_error();
        assert_eq!(engine.tick(), TickOutcome::Fatal);
    }

    #[test]
    fn skipped_frames_are_not_displayed() {
        let (mut engine, _log) = engine_with_log();
        engine.scaler_mut().set_forced_aspect(false);

        let res = Resolution::new(640, 480, 32);
        let ingress = engine.ingress();
        ingress.skip_frames(1);
        ingress.on_frame(&pattern_frame(res), res);
        engine.tick();
        let (out, _) = engine.scaler().output();
        assert!(out.is_empty() || out.iter().all(|&b| b == 0));

        // The next frame goes through.
        ingress.on_frame(&pattern_frame(res), res);
        engine.tick();
        let (out, _) = engine.scaler().output();
        assert!(!out.is_empty());
    }

    #[test]
    fn incompatible_bit_depth_frames_are_dropped_but_counted() {
        let (mut engine, _log) = engine_with_log();
        let res = Resolution::new(640, 480, 8);
        let data = vec![0u8; res.frame_bytes()];
        engine.ingress().on_frame(&data, res);
        assert_eq!(engine.tick(), TickOutcome::Processed);
        // The counter equality was restored, so the pipeline idles next.
        assert_eq!(engine.tick(), TickOutcome::Idle);
    }
}
