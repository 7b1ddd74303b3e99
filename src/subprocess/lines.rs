//! Line segmentation for diagnostic pipes
//!
//! Backend stderr is treated as bytes split on `\n`. Invalid UTF-8 is
//! rendered lossily instead of failing the reader.

use futures::stream::Stream;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

pub type LineStreamItem = std::io::Result<String>;
pub type LineStream = Pin<Box<dyn Stream<Item = LineStreamItem> + Send>>;

/// Remove a trailing `\n` or `\r\n`
pub fn normalize_line(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Create a lossy line stream over any byte reader.
///
/// The stream ends at EOF, or after yielding the first read error.
pub fn lossy_lines<R>(reader: R) -> LineStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(futures::stream::unfold(
        Some(BufReader::new(reader)),
        |state| async move {
            let mut reader = state?;
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => None,
                Ok(_) => {
                    let line = normalize_line(String::from_utf8_lossy(&buf).into_owned());
                    Some((Ok(line), Some(reader)))
                }
                Err(e) => Some((Err(e), None)),
            }
        },
    ))
}
