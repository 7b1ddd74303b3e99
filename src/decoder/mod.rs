//! Transport stream video decoding
//!
//! The demuxer and program-table handling are native; turning access units
//! into pixels is delegated to a [`VideoCodec`], by default an external
//! ffmpeg process.

pub mod codec;
pub mod demux;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod options;
pub mod ppm;
pub mod psi;
pub mod stream;

pub use codec::{CodecFactory, FrameResult, FrameSender, VideoCodec};
pub use demux::{AccessUnit, DemuxEvent, TsDemuxer, VideoCodecKind, VideoStreamInfo};
pub use error::{DemuxError, FrameDecodeError};
pub use ffmpeg::{FfmpegCodecFactory, DEFAULT_FFMPEG};
pub use frame::{DecodedFrame, PixelFormat};
pub use options::{DecoderOptions, OptionError, ThreadCount};
pub use stream::StreamDecoder;
