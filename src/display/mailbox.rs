use crate::decoder::DecodedFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-slot latest-frame handoff between the decode task and the UI.
///
/// A put overwrites whatever frame the UI has not yet taken, so the display
/// never lags the decoder by more than one frame.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<DecodedFrame>>,
    replaced: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`; `true` when the slot was empty and a wakeup is needed.
    pub fn put(&self, frame: DecodedFrame) -> bool {
        let previous = self.lock().replace(frame);
        if previous.is_some() {
            self.replaced.fetch_add(1, Ordering::Relaxed);
        }
        previous.is_none()
    }

    pub fn take(&self) -> Option<DecodedFrame> {
        self.lock().take()
    }

    /// Frames overwritten before the UI took them
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<DecodedFrame>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
