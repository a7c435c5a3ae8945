//! Frame rescaling: pixel-format normalisation, aspect padding, and the
//! closed set of up/down interpolators.

use rayon::prelude::*;
use tracing::{debug, warn};

use scanline_core::prelude::{
    MAX_FRAME_BYTES, MAX_OUTPUT_BPP, MAX_OUTPUT_HEIGHT, MAX_OUTPUT_WIDTH, MIN_OUTPUT_HEIGHT,
    MIN_OUTPUT_WIDTH, PixelBuffer, PixelFormat, Resolution,
};

/// User-facing names of the scaling filters, selection order included.
pub const SCALER_NAMES: [&str; 5] = ["Nearest", "Linear", "Area", "Cubic", "Lanczos"];

/// The closed set of interpolators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerKind {
    Nearest,
    Linear,
    Area,
    Cubic,
    Lanczos,
}

impl ScalerKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalerKind::Nearest => "Nearest",
            ScalerKind::Linear => "Linear",
            ScalerKind::Area => "Area",
            ScalerKind::Cubic => "Cubic",
            ScalerKind::Lanczos => "Lanczos",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Nearest" => Some(ScalerKind::Nearest),
            "Linear" => Some(ScalerKind::Linear),
            "Area" => Some(ScalerKind::Area),
            "Cubic" => Some(ScalerKind::Cubic),
            "Lanczos" => Some(ScalerKind::Lanczos),
            _ => None,
        }
    }
}

/// What ratio the aspect padding preserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectMode {
    /// The frame's own width:height.
    #[default]
    Native,
    /// Always 4:3.
    Always4x3,
    /// 4:3 for the classic 720x400 / 640x400 / 320x200 text and VGA modes,
    /// the frame's own ratio otherwise.
    Traditional4x3,
}

/// Scales processed frames into the engine's output buffer.
///
/// Exactly one of the two configured interpolators runs per frame; the
/// upscaler when the target exceeds the source in either axis, the
/// downscaler otherwise.
///
/// # Example
/// ```rust
/// use scanline::scaler::Scaler;
/// use scanline_core::prelude::Resolution;
///
/// let scaler = Scaler::new();
/// let target = scaler.output_resolution(Resolution::new(640, 480, 32), None);
/// assert_eq!(target, Resolution::new(640, 480, 32));
/// ```
pub struct Scaler {
    output: PixelBuffer,
    tmp: PixelBuffer,
    upscaler: ScalerKind,
    downscaler: ScalerKind,
    aspect_mode: AspectMode,
    force_aspect: bool,
    base_resolution: Resolution,
    force_base_resolution: bool,
    output_scaling: f32,
    force_scaling: bool,
    latest_output: Resolution,
}

impl Default for Scaler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scaler {
    pub fn new() -> Self {
        Self {
            output: PixelBuffer::with_capacity(MAX_FRAME_BYTES),
            tmp: PixelBuffer::with_capacity(MAX_FRAME_BYTES),
            upscaler: ScalerKind::Nearest,
            downscaler: ScalerKind::Nearest,
            aspect_mode: AspectMode::Native,
            force_aspect: true,
            base_resolution: Resolution::new(640, 480, 32),
            force_base_resolution: false,
            output_scaling: 1.0,
            force_scaling: false,
            latest_output: Resolution::default(),
        }
    }

    /// Select the upscaler by name; an unknown name falls back to the first
    /// catalogue entry.
    pub fn set_upscaling_filter(&mut self, name: &str) {
        self.upscaler = scaler_for_name(name);
        debug!(name = self.upscaler.name(), "assigned upscaling filter");
    }

    /// Select the downscaler by name; an unknown name falls back to the
    /// first catalogue entry.
    pub fn set_downscaling_filter(&mut self, name: &str) {
        self.downscaler = scaler_for_name(name);
        debug!(name = self.downscaler.name(), "assigned downscaling filter");
    }

    pub fn upscaling_filter(&self) -> ScalerKind {
        self.upscaler
    }

    pub fn downscaling_filter(&self) -> ScalerKind {
        self.downscaler
    }

    pub fn set_aspect_mode(&mut self, mode: AspectMode) {
        self.aspect_mode = mode;
    }

    pub fn aspect_mode(&self) -> AspectMode {
        self.aspect_mode
    }

    pub fn set_forced_aspect(&mut self, enabled: bool) {
        self.force_aspect = enabled;
    }

    pub fn is_forced_aspect(&self) -> bool {
        self.force_aspect
    }

    pub fn set_base_resolution(&mut self, r: Resolution) {
        self.base_resolution = r;
    }

    pub fn base_resolution(&self) -> Resolution {
        self.base_resolution
    }

    pub fn set_force_base_resolution(&mut self, enabled: bool) {
        self.force_base_resolution = enabled;
    }

    pub fn set_output_scaling(&mut self, factor: f32) {
        self.output_scaling = factor.max(0.0);
    }

    pub fn output_scaling(&self) -> f32 {
        self.output_scaling
    }

    pub fn set_force_scaling(&mut self, enabled: bool) {
        self.force_scaling = enabled;
    }

    /// The resolution the scaler will emit for a frame captured at
    /// `capture`, honoring a recorder's fixed resolution when one is given.
    pub fn output_resolution(
        &self,
        capture: Resolution,
        recording: Option<Resolution>,
    ) -> Resolution {
        // While recording, the output must stay locked to the video size.
        if let Some(r) = recording {
            return Resolution::new(r.w, r.h, MAX_OUTPUT_BPP);
        }

        let mut out = if self.force_base_resolution {
            self.base_resolution
        } else {
            capture
        };

        if self.force_scaling {
            out.w = round_half_up(out.w as f32 * self.output_scaling);
            out.h = round_half_up(out.h as f32 * self.output_scaling);
        }

        out.w = out.w.clamp(MIN_OUTPUT_WIDTH, MAX_OUTPUT_WIDTH);
        out.h = out.h.clamp(MIN_OUTPUT_HEIGHT, MAX_OUTPUT_HEIGHT);
        out.bpp = MAX_OUTPUT_BPP;
        out
    }

    /// Scale a 32-bit BGRA frame into the output buffer.
    ///
    /// `target` comes from [`output_resolution`](Self::output_resolution);
    /// the caller has already normalised, anti-torn, and filtered `px`.
    pub fn scale(&mut self, px: &[u8], source: Resolution, target: Resolution) {
        if px.len() < source.frame_bytes() || source.bpp != 32 || source.w == 0 || source.h == 0 {
            warn!(%source, "refusing to scale a malformed frame");
            return;
        }
        if target.frame_bytes() > self.output.capacity() {
            warn!(%target, "refusing to scale past the output buffer");
            return;
        }

        let same_size = source.same_extent(&target);
        if (!self.force_aspect || self.aspect_mode == AspectMode::Native) && same_size {
            self.output.copy_bounded(px, source.frame_bytes());
            self.latest_output = target;
            return;
        }

        let kind = if source.w < target.w || source.h < target.h {
            self.upscaler
        } else {
            self.downscaler
        };

        if self.force_aspect {
            let padded = padded_resolution(source, target, self.aspect_mode);
            if padded.same_extent(&target) {
                resize(kind, px, source, self.output.as_mut_slice(), target);
            } else {
                resize(kind, px, source, self.tmp.as_mut_slice(), padded);
                let inner_len = padded.frame_bytes();
                pad_with_border(
                    &self.tmp.as_slice()[..inner_len],
                    padded,
                    self.output.as_mut_slice(),
                    target,
                );
            }
        } else {
            resize(kind, px, source, self.output.as_mut_slice(), target);
        }
        self.latest_output = target;
    }

    /// Zero the output buffer, e.g. when the signal drops.
    pub fn clear_output(&mut self) {
        self.output.fill(0);
    }

    /// The most recently produced frame.
    pub fn output(&self) -> (&[u8], Resolution) {
        let len = self.output.bounded(self.latest_output.frame_bytes());
        (&self.output.as_slice()[..len], self.latest_output)
    }

    /// Resolution of the frame currently in the output buffer.
    pub fn latest_output_resolution(&self) -> Resolution {
        self.latest_output
    }

    /// Release the scaler's buffers during shutdown.
    pub fn release(&mut self) {
        self.output.release();
        self.tmp.release();
    }
}

/// Names of the available scaling filters, for display.
pub fn scaler_names() -> Vec<&'static str> {
    SCALER_NAMES.to_vec()
}

fn scaler_for_name(name: &str) -> ScalerKind {
    ScalerKind::from_name(name).unwrap_or_else(|| {
        let fallback = ScalerKind::from_name(SCALER_NAMES[0]).unwrap_or(ScalerKind::Nearest);
        warn!(name, fallback = fallback.name(), "unknown scaling filter; using fallback");
        fallback
    })
}

fn round_half_up(value: f32) -> u32 {
    (value + 0.5).floor().max(0.0) as u32
}

/// The largest resolution with the mode's aspect ratio that fits inside
/// `target`.
pub fn padded_resolution(source: Resolution, target: Resolution, mode: AspectMode) -> Resolution {
    let (aw, ah) = match mode {
        AspectMode::Native => source.aspect(),
        AspectMode::Always4x3 => (4, 3),
        AspectMode::Traditional4x3 => {
            let extent = (source.w, source.h);
            if extent == (720, 400) || extent == (640, 400) || extent == (320, 200) {
                (4, 3)
            } else {
                source.aspect()
            }
        }
    };
    let ratio = aw as f32 / ah as f32;
    let mut w = round_half_up(target.h as f32 * ratio);
    let mut h = target.h;
    if w > target.w {
        w = target.w;
        h = round_half_up(target.w as f32 / ratio);
    }
    Resolution::new(w, h, MAX_OUTPUT_BPP)
}

/// Centre `inner` inside a black `target` frame.
fn pad_with_border(inner_px: &[u8], inner: Resolution, out: &mut [u8], target: Resolution) {
    let top = (target.h - inner.h) / 2;
    let left = (target.w - inner.w) / 2;

    let out_len = target.frame_bytes();
    out[..out_len].fill(0);

    let inner_row = inner.w as usize * 4;
    let target_row = target.w as usize * 4;
    for y in 0..inner.h as usize {
        let src_off = y * inner_row;
        let dst_off = (y + top as usize) * target_row + left as usize * 4;
        out[dst_off..dst_off + inner_row].copy_from_slice(&inner_px[src_off..src_off + inner_row]);
    }
}

/// Convert a raw capture frame into tightly-packed 32-bit BGRA.
///
/// When the claimed format and the frame's bit depth disagree, fall back by
/// depth: 32-bit data is treated as RGBA, 24-bit as BGR, anything else as
/// RGB565.
pub fn convert_to_bgra(
    src: &[u8],
    res: Resolution,
    format: PixelFormat,
    dst: &mut Vec<u8>,
) -> Resolution {
    let pixels = res.w as usize * res.h as usize;
    dst.clear();
    dst.resize(pixels * 4, 0);

    match (format, res.bpp) {
        (PixelFormat::Rgb888, 32) => {
            let len = src.len().min(pixels * 4);
            dst[..len].copy_from_slice(&src[..len]);
        }
        (PixelFormat::Rgb565, 16) => unpack_16bit(src, dst, pixels, true),
        (PixelFormat::Rgb555, 15 | 16) => unpack_16bit(src, dst, pixels, false),
        (_, 32) => {
            // RGBA -> BGRA channel swap.
            for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
                out[3] = px[3];
            }
        }
        (_, 24) => {
            for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                out[..3].copy_from_slice(px);
                out[3] = 255;
            }
        }
        _ => unpack_16bit(src, dst, pixels, true),
    }
    Resolution::new(res.w, res.h, 32)
}

fn unpack_16bit(src: &[u8], dst: &mut [u8], pixels: usize, is_565: bool) {
    for (out, px) in dst
        .chunks_exact_mut(4)
        .zip(src.chunks_exact(2))
        .take(pixels)
    {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let (r, g, b) = if is_565 {
            (
                ((v >> 11) & 0x1f) as u8, // 5 bits
                ((v >> 5) & 0x3f) as u8,  // 6 bits
                (v & 0x1f) as u8,
            )
        } else {
            (
                ((v >> 10) & 0x1f) as u8,
                ((v >> 5) & 0x1f) as u8,
                (v & 0x1f) as u8,
            )
        };
        out[0] = expand_5(b);
        out[1] = if is_565 { expand_6(g) } else { expand_5(g) };
        out[2] = expand_5(r);
        out[3] = 255;
    }
}

fn expand_5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn expand_6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

/// Run one interpolator over a BGRA frame.
pub fn resize(kind: ScalerKind, src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    match kind {
        ScalerKind::Nearest => resize_nearest(src, sres, dst, tres),
        ScalerKind::Linear => resize_linear(src, sres, dst, tres),
        ScalerKind::Area => resize_area(src, sres, dst, tres),
        ScalerKind::Cubic => resize_cubic(src, sres, dst, tres),
        ScalerKind::Lanczos => resize_lanczos(src, sres, dst, tres),
    }
}

fn resize_nearest(src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    let (sw, sh) = (sres.w as usize, sres.h as usize);
    let (tw, th) = (tres.w as usize, tres.h as usize);
    let row_bytes = tw * 4;
    dst[..row_bytes * th]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let sy = (y * sh / th).min(sh - 1);
            for x in 0..tw {
                let sx = (x * sw / tw).min(sw - 1);
                let s = (sy * sw + sx) * 4;
                dst_row[x * 4..x * 4 + 4].copy_from_slice(&src[s..s + 4]);
            }
        });
}

fn resize_linear(src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    let (sw, sh) = (sres.w as usize, sres.h as usize);
    let (tw, th) = (tres.w as usize, tres.h as usize);
    let row_bytes = tw * 4;
    dst[..row_bytes * th]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let fy = ((y as f32 + 0.5) * sh as f32 / th as f32 - 0.5).max(0.0);
            let y0 = (fy as usize).min(sh - 1);
            let y1 = (y0 + 1).min(sh - 1);
            let ty = fy - y0 as f32;
            for x in 0..tw {
                let fx = ((x as f32 + 0.5) * sw as f32 / tw as f32 - 0.5).max(0.0);
                let x0 = (fx as usize).min(sw - 1);
                let x1 = (x0 + 1).min(sw - 1);
                let tx = fx - x0 as f32;
                for c in 0..4 {
                    let p00 = f32::from(src[(y0 * sw + x0) * 4 + c]);
                    let p10 = f32::from(src[(y0 * sw + x1) * 4 + c]);
                    let p01 = f32::from(src[(y1 * sw + x0) * 4 + c]);
                    let p11 = f32::from(src[(y1 * sw + x1) * 4 + c]);
                    let top = p00 + (p10 - p00) * tx;
                    let bottom = p01 + (p11 - p01) * tx;
                    dst_row[x * 4 + c] = (top + (bottom - top) * ty).round() as u8;
                }
            }
        });
}

fn resize_area(src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    let (sw, sh) = (sres.w as usize, sres.h as usize);
    let (tw, th) = (tres.w as usize, tres.h as usize);
    if tw >= sw && th >= sh {
        // Area averaging degenerates when magnifying.
        return resize_linear(src, sres, dst, tres);
    }
    let row_bytes = tw * 4;
    dst[..row_bytes * th]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let y_lo = y * sh / th;
            let y_hi = (((y + 1) * sh).div_ceil(th)).min(sh).max(y_lo + 1);
            for x in 0..tw {
                let x_lo = x * sw / tw;
                let x_hi = (((x + 1) * sw).div_ceil(tw)).min(sw).max(x_lo + 1);
                let n = ((y_hi - y_lo) * (x_hi - x_lo)) as u32;
                let mut sum = [0u32; 4];
                for sy in y_lo..y_hi {
                    for sx in x_lo..x_hi {
                        let off = (sy * sw + sx) * 4;
                        for c in 0..4 {
                            sum[c] += u32::from(src[off + c]);
                        }
                    }
                }
                for c in 0..4 {
                    dst_row[x * 4 + c] = (sum[c] / n) as u8;
                }
            }
        });
}

fn catmull_rom(t: f32, p0: f32, p1: f32, p2: f32, p3: f32) -> f32 {
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t * t
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t * t * t)
}

fn resize_cubic(src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    let (sw, sh) = (sres.w as usize, sres.h as usize);
    let (tw, th) = (tres.w as usize, tres.h as usize);
    let sample = |x: isize, y: isize, c: usize| -> f32 {
        let x = x.clamp(0, sw as isize - 1) as usize;
        let y = y.clamp(0, sh as isize - 1) as usize;
        f32::from(src[(y * sw + x) * 4 + c])
    };
    let row_bytes = tw * 4;
    dst[..row_bytes * th]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let fy = (y as f32 + 0.5) * sh as f32 / th as f32 - 0.5;
            let y1 = fy.floor() as isize;
            let ty = fy - y1 as f32;
            for x in 0..tw {
                let fx = (x as f32 + 0.5) * sw as f32 / tw as f32 - 0.5;
                let x1 = fx.floor() as isize;
                let tx = fx - x1 as f32;
                for c in 0..4 {
                    let mut rows = [0.0f32; 4];
                    for (i, row) in rows.iter_mut().enumerate() {
                        let sy = y1 - 1 + i as isize;
                        *row = catmull_rom(
                            tx,
                            sample(x1 - 1, sy, c),
                            sample(x1, sy, c),
                            sample(x1 + 1, sy, c),
                            sample(x1 + 2, sy, c),
                        );
                    }
                    let value = catmull_rom(ty, rows[0], rows[1], rows[2], rows[3]);
                    dst_row[x * 4 + c] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}

fn lanczos3(t: f32) -> f32 {
    if t == 0.0 {
        return 1.0;
    }
    let t = t.abs();
    if t >= 3.0 {
        return 0.0;
    }
    let pi_t = std::f32::consts::PI * t;
    3.0 * pi_t.sin() * (pi_t / 3.0).sin() / (pi_t * pi_t)
}

fn resize_lanczos(src: &[u8], sres: Resolution, dst: &mut [u8], tres: Resolution) {
    let (sw, sh) = (sres.w as usize, sres.h as usize);
    let (tw, th) = (tres.w as usize, tres.h as usize);
    let sample = |x: isize, y: isize, c: usize| -> f32 {
        let x = x.clamp(0, sw as isize - 1) as usize;
        let y = y.clamp(0, sh as isize - 1) as usize;
        f32::from(src[(y * sw + x) * 4 + c])
    };
    let row_bytes = tw * 4;
    dst[..row_bytes * th]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let fy = (y as f32 + 0.5) * sh as f32 / th as f32 - 0.5;
            let y0 = fy.floor() as isize;
            for x in 0..tw {
                let fx = (x as f32 + 0.5) * sw as f32 / tw as f32 - 0.5;
                let x0 = fx.floor() as isize;
                for c in 0..4 {
                    let mut acc = 0.0f32;
                    let mut weight_sum = 0.0f32;
                    for sy in (y0 - 2)..=(y0 + 3) {
                        let wy = lanczos3(fy - sy as f32);
                        if wy == 0.0 {
                            continue;
                        }
                        for sx in (x0 - 2)..=(x0 + 3) {
                            let wx = lanczos3(fx - sx as f32);
                            if wx == 0.0 {
                                continue;
                            }
                            acc += wx * wy * sample(sx, sy, c);
                            weight_sum += wx * wy;
                        }
                    }
                    let value = if weight_sum != 0.0 { acc / weight_sum } else { 0.0 };
                    dst_row[x * 4 + c] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}
