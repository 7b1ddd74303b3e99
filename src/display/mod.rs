//! Frame presentation on the UI thread

pub mod bitmap;
pub mod mailbox;

pub use bitmap::{Bitmap, FrameConvertError};
pub use mailbox::FrameMailbox;

use crate::decoder::DecodedFrame;
use crate::error::StreamTapError;
use crate::subprocess::LogSink;
use crate::ui::UiSurface;
use std::collections::HashSet;

/// Vertical room reserved below the video for the log view
pub const DEFAULT_LOG_MARGIN: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    #[default]
    AwaitingFirstFrame,
    ResolutionFixed { width: u32, height: u32 },
}

/// Presents decoded frames and owns the session's native resolution.
///
/// The first frame that converts cleanly fixes the native resolution and
/// sizes the surface once. Later frames of another size are still shown
/// but only produce a warning.
#[derive(Debug)]
pub struct DisplaySink {
    state: DisplayState,
    margin: u32,
    mismatched_sizes: HashSet<(u32, u32)>,
    rendered: u64,
}

impl Default for DisplaySink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_MARGIN)
    }
}

impl DisplaySink {
    pub fn new(margin: u32) -> Self {
        Self {
            state: DisplayState::AwaitingFirstFrame,
            margin,
            mismatched_sizes: HashSet::new(),
            rendered: 0,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn native_resolution(&self) -> Option<(u32, u32)> {
        match self.state {
            DisplayState::AwaitingFirstFrame => None,
            DisplayState::ResolutionFixed { width, height } => Some((width, height)),
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    /// Forget the native resolution; called when a new session starts.
    pub fn reset(&mut self) {
        self.state = DisplayState::AwaitingFirstFrame;
        self.mismatched_sizes.clear();
        self.rendered = 0;
    }

    pub fn on_frame(
        &mut self,
        frame: &DecodedFrame,
        surface: &mut dyn UiSurface,
        log: &LogSink,
    ) -> Result<(), FrameConvertError> {
        let bitmap = match Bitmap::from_frame(frame) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                log.append(format!("Error decoding/displaying frame: {}", e));
                tracing::warn!("Dropping frame: {}", StreamTapError::from(e.clone()));
                return Err(e);
            }
        };

        let (width, height) = (bitmap.width(), bitmap.height());
        match self.state {
            DisplayState::AwaitingFirstFrame => {
                self.state = DisplayState::ResolutionFixed { width, height };
                tracing::info!("Native resolution {}x{}", width, height);
                surface.resize_to(width, height.saturating_add(self.margin));
            }
            DisplayState::ResolutionFixed {
                width: native_width,
                height: native_height,
            } if (native_width, native_height) != (width, height) => {
                if self.mismatched_sizes.insert((width, height)) {
                    tracing::warn!(
                        "Frame size {}x{} differs from native {}x{}",
                        width,
                        height,
                        native_width,
                        native_height
                    );
                    log.append(format!(
                        "Warning: frame size {}x{} differs from native resolution {}x{}; display size unchanged",
                        width, height, native_width, native_height
                    ));
                }
            }
            DisplayState::ResolutionFixed { .. } => {}
        }

        surface.render_frame(&bitmap);
        self.rendered += 1;
        Ok(())
    }
}
