//! Non-destructive tap over a live byte stream

use super::log_sink::LogSink;
use super::types::TeeSummary;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Forwards every read unchanged and logs a summary of each chunk.
///
/// Summaries go through [`LogSink::try_append`], so a busy log never stalls
/// the read path; the summary is dropped instead.
pub struct ByteTee<R> {
    inner: R,
    log: LogSink,
    chunks: u64,
    bytes: u64,
    dropped_summaries: u64,
}

impl<R> ByteTee<R> {
    pub fn new(inner: R, log: LogSink) -> Self {
        Self {
            inner,
            log,
            chunks: 0,
            bytes: 0,
            dropped_summaries: 0,
        }
    }

    /// Non-empty reads observed so far
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Total bytes forwarded so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn dropped_summaries(&self) -> u64 {
        self.dropped_summaries
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn observe(&mut self, chunk: &[u8]) {
        self.chunks += 1;
        self.bytes += chunk.len() as u64;

        let summary = TeeSummary::of(chunk);
        if !self.log.try_append(summary.to_string()) {
            self.dropped_summaries += 1;
            tracing::trace!(
                "Dropped summary of {} byte chunk, log busy",
                summary.chunk_len()
            );
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ByteTee<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let chunk = &buf.filled()[before..];
                if !chunk.is_empty() {
                    this.observe(chunk);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
