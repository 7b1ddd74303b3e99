use super::UiSurface;
use crate::subprocess::{LogEntry, LogSink};
use std::collections::VecDeque;

/// Keeps the surface's visible log lines in step with a [`LogSink`].
///
/// Entries are numbered in arrival order, so a flush only needs to drop the
/// visible lines the sink has evicted and append those it has not shown yet.
#[derive(Debug, Default)]
pub struct LogView {
    visible: VecDeque<u64>,
}

impl LogView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn flush(&mut self, sink: &LogSink, surface: &mut dyn UiSurface) {
        sink.mark_flushed();
        let snapshot = sink.snapshot();
        self.apply(&snapshot, surface);
    }

    fn apply(&mut self, snapshot: &[LogEntry], surface: &mut dyn UiSurface) {
        let oldest_kept = snapshot.first().map(|e| e.seq);
        let evicted = self
            .visible
            .iter()
            .take_while(|&&seq| oldest_kept.map_or(true, |oldest| seq < oldest))
            .count();
        if evicted > 0 {
            self.visible.drain(..evicted);
            surface.remove_log_lines(evicted);
        }

        let last_shown = self.visible.back().copied();
        for entry in snapshot {
            if last_shown.is_some_and(|seq| entry.seq <= seq) {
                continue;
            }
            surface.append_log_line(&entry.text);
            self.visible.push_back(entry.seq);
        }
    }
}
