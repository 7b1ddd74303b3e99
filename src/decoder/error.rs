use std::time::Duration;

/// The stream cannot be decoded at all.
///
/// Fatal to the decode session only; the backend may still be running.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error("No video program found in the first {examined} bytes of the stream")]
    NoProgram { examined: usize },

    #[error("No video program found within {0:?} of the first stream data")]
    AnalyzeTimeout(Duration),

    #[error("Stream ended before a video program was found ({examined} bytes examined)")]
    EndOfStream { examined: usize },

    #[error("Failed to read stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Video decoder unavailable: {0}")]
    CodecUnavailable(String),
}

/// A single access unit or frame could not be decoded; the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("Corrupt packet on pid 0x{pid:04x}: {reason}")]
    CorruptPacket { pid: u16, reason: String },

    #[error("Lost transport stream sync, skipped {0} bytes")]
    LostSync(usize),

    #[error("Malformed frame data: {0}")]
    Malformed(String),

    #[error("Decoder rejected access unit: {0}")]
    Codec(String),

    #[error("Decoder is no longer accepting input")]
    CodecClosed,
}
