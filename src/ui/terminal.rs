//! Text-mode surface for the `streamtap` binary
//!
//! A spinner tracks the video (frame count and native size). Log lines are
//! printed above it, since a terminal cannot take lines back.

use super::{ControlState, UiSurface};
use crate::display::Bitmap;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub struct TerminalSurface {
    bar: ProgressBar,
    frames: u64,
    resolution: Option<(u32, u32)>,
    window: Option<(u32, u32)>,
    controls: ControlState,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// A surface that draws nothing and prints log lines to stdout
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        let surface = Self {
            bar,
            frames: 0,
            resolution: None,
            window: None,
            controls: ControlState::IDLE,
        };
        surface.refresh();
        surface
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Size last requested for the video window
    pub fn window(&self) -> Option<(u32, u32)> {
        self.window
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn refresh(&self) {
        let state = if self.controls.stop_enabled {
            "running"
        } else {
            "idle"
        };
        let message = match self.resolution {
            Some((w, h)) => format!("{} | {} frames | {}x{}", state, self.frames, w, h),
            None => format!("{} | waiting for video", state),
        };
        self.bar.set_message(message);
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl UiSurface for TerminalSurface {
    fn resize_to(&mut self, width: u32, height: u32) {
        self.window = Some((width, height));
    }

    fn render_frame(&mut self, bitmap: &Bitmap) {
        self.frames += 1;
        self.resolution = Some((bitmap.width(), bitmap.height()));
        self.refresh();
    }

    fn append_log_line(&mut self, text: &str) {
        if self.bar.is_hidden() {
            println!("{}", text);
        } else {
            self.bar.println(text);
        }
    }

    fn remove_log_lines(&mut self, _count: usize) {}

    fn set_controls(&mut self, controls: ControlState) {
        self.controls = controls;
        self.refresh();
    }

    fn notify_error(&mut self, message: &str) {
        self.bar.suspend(|| eprintln!("Error: {}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodedFrame, PixelFormat};

    #[test]
    fn test_counts_rendered_frames() {
        let mut surface = TerminalSurface::hidden();
        let frame = DecodedFrame::new(4, 2, PixelFormat::Rgb24, vec![0; 24]);
        let bitmap = Bitmap::from_frame(&frame).unwrap();

        surface.resize_to(4, 302);
        surface.set_controls(ControlState::RUNNING);
        surface.render_frame(&bitmap);
        surface.render_frame(&bitmap);

        assert_eq!(surface.frames(), 2);
        assert_eq!(surface.window(), Some((4, 302)));
        surface.finish();
    }
}
