//! The UI-thread side of a session
//!
//! Background tasks never touch UI state. They post [`UiEvent`]s through a
//! [`UiDispatcher`] and the thread that owns the [`UiSurface`] drains them
//! with [`SessionController`].

pub mod controller;
pub mod log_view;
pub mod terminal;

pub use controller::{SessionController, SessionSettings};
pub use log_view::LogView;
pub use terminal::TerminalSurface;

use crate::decoder::DecodedFrame;
use crate::display::Bitmap;
use crate::session::{KeySize, SessionId};
use crate::subprocess::ExitCode;
use tokio::sync::mpsc;

/// Enabled state of the Start/Stop controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl ControlState {
    pub const IDLE: ControlState = ControlState {
        start_enabled: true,
        stop_enabled: false,
    };

    pub const RUNNING: ControlState = ControlState {
        start_enabled: false,
        stop_enabled: true,
    };
}

/// Whatever renders the session for the operator.
///
/// All methods are called on the single thread that owns the surface.
pub trait UiSurface {
    fn resize_to(&mut self, width: u32, height: u32);

    fn render_frame(&mut self, bitmap: &Bitmap);

    fn append_log_line(&mut self, text: &str);

    /// Remove the `count` oldest visible log lines
    fn remove_log_lines(&mut self, count: usize);

    fn set_controls(&mut self, controls: ControlState);

    /// Modal-style notification; only used when the backend cannot start
    fn notify_error(&mut self, message: &str);
}

#[derive(Debug)]
pub enum UiEvent {
    LogUpdated,
    /// A frame is waiting in the session's mailbox
    FrameReady(SessionId),
    /// A frame delivered in order, for paced rendering
    Frame(SessionId, DecodedFrame),
    DecodeFinished(SessionId),
    /// `None` when the exit status could not be collected
    SessionEnded(SessionId, Option<ExitCode>),
    StartRequested(KeySize),
    StopRequested,
    Shutdown,
}

/// Post-and-return handle onto the UI thread's event queue
#[derive(Debug, Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event; `false` once the UI side is gone.
    pub fn post(&self, event: UiEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_fails_after_receiver_dropped() {
        let (dispatcher, rx) = UiDispatcher::channel();
        assert!(dispatcher.post(UiEvent::LogUpdated));
        drop(rx);
        assert!(!dispatcher.post(UiEvent::StopRequested));
    }

    #[test]
    fn test_events_arrive_in_post_order() {
        let (dispatcher, mut rx) = UiDispatcher::channel();
        let clone = dispatcher.clone();
        dispatcher.post(UiEvent::StartRequested(KeySize::Aes128));
        clone.post(UiEvent::StopRequested);

        assert!(matches!(
            rx.try_recv(),
            Ok(UiEvent::StartRequested(KeySize::Aes128))
        ));
        assert!(matches!(rx.try_recv(), Ok(UiEvent::StopRequested)));
    }
}
