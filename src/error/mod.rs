use crate::app::ConfigError;
use crate::decoder::{DemuxError, FrameDecodeError};
use crate::display::FrameConvertError;
use crate::subprocess::{ProcessError, SpawnError};
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for the streamtap application
#[derive(Error, Debug)]
pub enum StreamTapError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Process error: {message}")]
    Process {
        code: u16,
        message: String,
        pid: Option<u32>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Stream error: {message}")]
    Stream {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Decoder error: {message}")]
    Decoder {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Display error: {message}")]
    Display {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl StreamTapError {
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    pub fn process_with_code(code: u16, message: impl Into<String>, pid: Option<u32>) -> Self {
        Self::Process {
            code,
            message: message.into(),
            pid,
            source: None,
        }
    }

    pub fn stream(code: u16, message: impl Into<String>) -> Self {
        Self::Stream {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn decoder(code: u16, message: impl Into<String>) -> Self {
        Self::Decoder {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn display(code: u16, message: impl Into<String>) -> Self {
        Self::Display {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        let boxed: BoxedSource = Box::new(error);
        match &mut self {
            Self::Config { source, .. }
            | Self::Process { source, .. }
            | Self::Stream { source, .. }
            | Self::Decoder { source, .. }
            | Self::Display { source, .. } => *source = Some(boxed),
        }
        self
    }

    pub fn with_path(mut self, file: impl Into<PathBuf>) -> Self {
        if let Self::Config { path, .. } = &mut self {
            *path = Some(file.into());
        }
        self
    }

    /// Get the exit code for CLI applications
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Process { .. } => 3,
            Self::Stream { .. } => 4,
            Self::Decoder { .. } => 5,
            Self::Display { .. } => 6,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Process { code, .. }
            | Self::Stream { code, .. }
            | Self::Decoder { code, .. }
            | Self::Display { code, .. } => *code,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, path, .. } => match path {
                Some(path) => format!("Configuration problem in {}: {}", path.display(), message),
                None => format!("Configuration problem: {}", message),
            },
            Self::Process { message, pid, .. } => match pid {
                Some(pid) => format!("Backend process {} failed: {}", pid, message),
                None => format!("Backend process failed: {}", message),
            },
            Self::Stream { message, .. } => format!("Video stream problem: {}", message),
            Self::Decoder { message, .. } => format!("Video decoding problem: {}", message),
            Self::Display { message, .. } => format!("Display problem: {}", message),
        }
    }

    /// Short description of this error's code
    pub fn describe(&self) -> &'static str {
        describe_error_code(self.code())
    }
}

impl From<ConfigError> for StreamTapError {
    fn from(err: ConfigError) -> Self {
        let (code, path) = match &err {
            ConfigError::Read { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                (ErrorCode::CONFIG_NOT_FOUND, Some(path.clone()))
            }
            ConfigError::Read { path, .. } => (ErrorCode::CONFIG_GENERIC, Some(path.clone())),
            ConfigError::Parse { path, .. } => (ErrorCode::CONFIG_PARSE_ERROR, Some(path.clone())),
            ConfigError::Invalid(_) => (ErrorCode::CONFIG_INVALID_VALUE, None),
            ConfigError::DecoderOption(_) => (ErrorCode::CONFIG_UNKNOWN_OPTION, None),
        };
        let converted = Self::config_with_code(code, err.to_string());
        let converted = match path {
            Some(path) => converted.with_path(path),
            None => converted,
        };
        converted.with_source(err)
    }
}

impl From<SpawnError> for StreamTapError {
    fn from(err: SpawnError) -> Self {
        let (code, pid) = match &err {
            SpawnError::NotFound(_) => (ErrorCode::PROCESS_NOT_FOUND, None),
            SpawnError::PermissionDenied(_) => (ErrorCode::PROCESS_PERMISSION_DENIED, None),
            SpawnError::AlreadyRunning(pid) => (ErrorCode::PROCESS_ALREADY_RUNNING, Some(*pid)),
            SpawnError::MissingPipe(_) => (ErrorCode::PROCESS_PIPE_UNAVAILABLE, None),
            SpawnError::Io { .. } => (ErrorCode::PROCESS_SPAWN_FAILED, None),
        };
        Self::process_with_code(code, err.to_string(), pid).with_source(err)
    }
}

impl From<ProcessError> for StreamTapError {
    fn from(err: ProcessError) -> Self {
        let ProcessError::Wait { pid, .. } = &err;
        let pid = *pid;
        Self::process_with_code(ErrorCode::PROCESS_WAIT_FAILED, err.to_string(), Some(pid))
            .with_source(err)
    }
}

impl From<DemuxError> for StreamTapError {
    fn from(err: DemuxError) -> Self {
        let code = match &err {
            DemuxError::NoProgram { .. } => ErrorCode::STREAM_NO_PROGRAM,
            DemuxError::AnalyzeTimeout(_) => ErrorCode::STREAM_ANALYZE_TIMEOUT,
            DemuxError::EndOfStream { .. } => ErrorCode::STREAM_ENDED,
            DemuxError::Io(_) => ErrorCode::STREAM_IO_ERROR,
            DemuxError::CodecUnavailable(_) => ErrorCode::DECODER_UNAVAILABLE,
        };
        let message = err.to_string();
        if code == ErrorCode::DECODER_UNAVAILABLE {
            Self::decoder(code, message).with_source(err)
        } else {
            Self::stream(code, message).with_source(err)
        }
    }
}

impl From<FrameDecodeError> for StreamTapError {
    fn from(err: FrameDecodeError) -> Self {
        let code = match &err {
            FrameDecodeError::CorruptPacket { .. } => ErrorCode::DECODER_CORRUPT_PACKET,
            FrameDecodeError::LostSync(_) => ErrorCode::DECODER_LOST_SYNC,
            FrameDecodeError::Malformed(_) => ErrorCode::DECODER_MALFORMED,
            FrameDecodeError::Codec(_) => ErrorCode::DECODER_CODEC_FAILED,
            FrameDecodeError::CodecClosed => ErrorCode::DECODER_CLOSED,
        };
        Self::decoder(code, err.to_string()).with_source(err)
    }
}

impl From<FrameConvertError> for StreamTapError {
    fn from(err: FrameConvertError) -> Self {
        let code = match &err {
            FrameConvertError::EmptyFrame { .. } => ErrorCode::DISPLAY_EMPTY_FRAME,
            FrameConvertError::SizeMismatch { .. } => ErrorCode::DISPLAY_SIZE_MISMATCH,
        };
        Self::display(code, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::time::Duration;

    #[test]
    fn test_display_and_exit_codes() {
        let err: StreamTapError = ConfigError::Invalid("bad value".to_string()).into();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "[E1003] Configuration error: Invalid configuration: bad value"
        );

        let err: StreamTapError = ProcessError::Wait {
            pid: 7,
            source: std::io::Error::from(std::io::ErrorKind::Interrupted),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::PROCESS_WAIT_FAILED);
        assert_eq!(err.exit_code(), 3);
        assert!(err.user_message().starts_with("Backend process 7 failed"));
    }

    #[test]
    fn test_from_spawn_error() {
        let err: StreamTapError = SpawnError::NotFound(PathBuf::from("/no/such/backend")).into();
        assert_eq!(err.code(), ErrorCode::PROCESS_NOT_FOUND);
        assert_eq!(err.describe(), "Backend executable not found");
        assert!(err.source().is_some());

        let err: StreamTapError = SpawnError::AlreadyRunning(42).into();
        assert_eq!(err.code(), ErrorCode::PROCESS_ALREADY_RUNNING);
        assert!(err.user_message().starts_with("Backend process 42 failed"));
    }

    #[test]
    fn test_from_demux_error() {
        let err: StreamTapError = DemuxError::AnalyzeTimeout(Duration::from_millis(200)).into();
        assert_eq!(err.code(), ErrorCode::STREAM_ANALYZE_TIMEOUT);
        assert_eq!(err.exit_code(), 4);

        let err: StreamTapError = DemuxError::CodecUnavailable("ffmpeg missing".into()).into();
        assert_eq!(err.code(), ErrorCode::DECODER_UNAVAILABLE);
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_from_config_error_keeps_path() {
        let err: StreamTapError = ConfigError::Read {
            path: PathBuf::from("/etc/streamtap.toml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
        assert!(err.user_message().contains("/etc/streamtap.toml"));
    }

    #[test]
    fn test_from_frame_errors() {
        let err: StreamTapError = FrameDecodeError::LostSync(12).into();
        assert_eq!(err.code(), ErrorCode::DECODER_LOST_SYNC);

        let err: StreamTapError = FrameConvertError::EmptyFrame {
            width: 0,
            height: 0,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::DISPLAY_EMPTY_FRAME);
        assert_eq!(err.exit_code(), 6);
    }
}
