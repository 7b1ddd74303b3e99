//! Recording stand-ins for the UI surface

use crate::display::Bitmap;
use crate::ui::{ControlState, UiSurface};

/// A [`UiSurface`] that records every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub resizes: Vec<(u32, u32)>,
    /// Dimensions of every rendered bitmap, in order
    pub rendered: Vec<(u32, u32)>,
    pub last_bitmap: Option<Bitmap>,
    /// Lines currently visible
    pub log_lines: Vec<String>,
    /// Every line ever appended, including those since removed
    pub log_history: Vec<String>,
    pub removed_batches: Vec<usize>,
    pub controls: Vec<ControlState>,
    pub errors: Vec<String>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_controls(&self) -> Option<ControlState> {
        self.controls.last().copied()
    }

    /// Lines in the full history starting with `prefix`
    pub fn history_matching(&self, prefix: &str) -> Vec<&str> {
        self.log_history
            .iter()
            .filter(|line| line.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }
}

impl UiSurface for RecordingSurface {
    fn resize_to(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }

    fn render_frame(&mut self, bitmap: &Bitmap) {
        self.rendered.push((bitmap.width(), bitmap.height()));
        self.last_bitmap = Some(bitmap.clone());
    }

    fn append_log_line(&mut self, text: &str) {
        self.log_lines.push(text.to_string());
        self.log_history.push(text.to_string());
    }

    fn remove_log_lines(&mut self, count: usize) {
        let count = count.min(self.log_lines.len());
        self.log_lines.drain(..count);
        self.removed_batches.push(count);
    }

    fn set_controls(&mut self, controls: ControlState) {
        self.controls.push(controls);
    }

    fn notify_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
