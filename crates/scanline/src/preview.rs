//! Minimal display sink for the scaler's output.

use std::time::Duration;

use minifb::{Key, Window, WindowOptions};

use scanline_core::prelude::Resolution;

/// Small window that shows the engine's output buffer.
///
/// The window also acts as the process's lifetime: closing it (or pressing
/// Escape) ends the pipeline loop.
pub struct PreviewWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl PreviewWindow {
    /// Create the window at a default size; it follows the output size on
    /// the first presented frame.
    pub fn new(title: &str) -> Result<Self, minifb::Error> {
        let (width, height) = (640, 480);
        let mut window = Window::new(title, width, height, WindowOptions::default())?;
        window.set_target_fps(60);
        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// Show a BGRA frame.
    pub fn present(&mut self, px: &[u8], res: Resolution) -> Result<(), minifb::Error> {
        let (w, h) = (res.w as usize, res.h as usize);
        if w == 0 || h == 0 || px.len() < w * h * 4 {
            return self.pump();
        }
        if (w, h) != (self.width, self.height) {
            self.width = w;
            self.height = h;
            self.buffer.resize(w * h, 0);
        }
        for (out, p) in self.buffer.iter_mut().zip(px.chunks_exact(4)) {
            let (b, g, r, a) = (p[0], p[1], p[2], p[3]);
            *out = u32::from(a) << 24 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b);
        }
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
    }

    /// Keep the window responsive when there is no new frame.
    pub fn pump(&mut self) -> Result<(), minifb::Error> {
        self.window.update();
        Ok(())
    }

    /// A polite wait between idle ticks.
    pub fn idle_wait(&self) {
        std::thread::sleep(Duration::from_millis(1));
    }
}
