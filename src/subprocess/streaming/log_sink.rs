//! Bounded, thread-safe operator log
//!
//! Producers (stderr reader, output tap, decoder, display, supervisor) append
//! from any thread. Exactly one consumer, the UI thread, reads snapshots.
//! Producers never touch UI state: the sink only invokes a notifier when it
//! transitions from "flushed" to "dirty", and the notifier is expected to
//! post-and-return onto the UI dispatch queue.

use super::types::{LogCapacity, LogEntry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

type Notifier = Box<dyn Fn() + Send + Sync>;

struct LogBuffer {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

struct Inner {
    buffer: Mutex<LogBuffer>,
    capacity: LogCapacity,
    flush_pending: AtomicBool,
    dropped: AtomicU64,
    notifier: OnceLock<Notifier>,
}

/// Cloneable handle to the shared operator log
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(LogCapacity::default())
    }
}

impl LogSink {
    pub fn new(capacity: LogCapacity) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(LogBuffer {
                    entries: VecDeque::with_capacity(capacity.capacity + 1),
                    next_seq: 0,
                }),
                capacity,
                flush_pending: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                notifier: OnceLock::new(),
            }),
        }
    }

    /// Install the callback used to schedule a UI flush.
    ///
    /// Only the first notifier is kept.
    pub fn set_notifier(&self, notifier: impl Fn() + Send + Sync + 'static) {
        if self.inner.notifier.set(Box::new(notifier)).is_err() {
            tracing::warn!("Log notifier already installed; ignoring replacement");
        }
    }

    pub fn capacity(&self) -> LogCapacity {
        self.inner.capacity
    }

    /// Append text, one entry per line. Blocks until the buffer lock is free.
    pub fn append(&self, text: impl AsRef<str>) {
        {
            let mut buffer = self.lock();
            self.push_lines(&mut buffer, text.as_ref());
        }
        self.notify();
    }

    /// Append only if the buffer lock is immediately available.
    ///
    /// Returns `false` and counts the text as dropped when it is not.
    pub fn try_append(&self, text: impl AsRef<str>) -> bool {
        let mut buffer = match self.inner.buffer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        self.push_lines(&mut buffer, text.as_ref());
        drop(buffer);
        self.notify();
        true
    }

    /// Entries currently retained, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `try_append` calls that gave up on a busy lock
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Called by the consumer before it reads a snapshot, so appends that
    /// race with the flush schedule another one.
    pub fn mark_flushed(&self) {
        self.inner.flush_pending.store(false, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn push_lines(&self, buffer: &mut LogBuffer, text: &str) {
        let text = text.strip_suffix('\n').unwrap_or(text);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            tracing::debug!(target: "streamtap::log", "{}", line);

            let seq = buffer.next_seq;
            buffer.next_seq += 1;
            buffer.entries.push_back(LogEntry {
                seq,
                text: line.to_string(),
            });

            if buffer.entries.len() > self.inner.capacity.capacity {
                let evict = self.inner.capacity.evict_batch.min(buffer.entries.len());
                buffer.entries.drain(..evict);
            }
        }
    }

    fn notify(&self) {
        if !self.inner.flush_pending.swap(true, Ordering::AcqRel) {
            if let Some(notifier) = self.inner.notifier.get() {
                notifier();
            }
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}
