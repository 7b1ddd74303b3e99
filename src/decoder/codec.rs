use super::demux::{AccessUnit, VideoStreamInfo};
use super::error::{DemuxError, FrameDecodeError};
use super::frame::DecodedFrame;
use super::options::DecoderOptions;
use crate::subprocess::LogSink;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub type FrameResult = Result<DecodedFrame, FrameDecodeError>;
pub type FrameSender = mpsc::Sender<FrameResult>;

/// Turns access units of one video stream into frames.
///
/// Frames (and per-frame errors the codec detects on its own) are delivered
/// on the [`FrameSender`] handed to the factory, in display order.
#[async_trait]
pub trait VideoCodec: Send {
    async fn submit(&mut self, unit: AccessUnit) -> Result<(), FrameDecodeError>;

    /// No more input follows; returns once every pending frame was delivered.
    async fn finish(&mut self);
}

pub trait CodecFactory: Send + Sync {
    fn create(
        &self,
        stream: &VideoStreamInfo,
        options: &DecoderOptions,
        frames: FrameSender,
        log: LogSink,
    ) -> Result<Box<dyn VideoCodec>, DemuxError>;
}
