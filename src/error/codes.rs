/// Error code registry for streamtap
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Process errors
/// - 3000-3999: Stream errors
/// - 4000-4999: Decoder errors
/// - 5000-5999: Display errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;
    pub const CONFIG_UNKNOWN_OPTION: u16 = 1004;

    // Process errors (2000-2999)
    pub const PROCESS_NOT_FOUND: u16 = 2001;
    pub const PROCESS_PERMISSION_DENIED: u16 = 2002;
    pub const PROCESS_ALREADY_RUNNING: u16 = 2003;
    pub const PROCESS_PIPE_UNAVAILABLE: u16 = 2004;
    pub const PROCESS_SPAWN_FAILED: u16 = 2005;
    pub const PROCESS_WAIT_FAILED: u16 = 2006;

    // Stream errors (3000-3999)
    pub const STREAM_NO_PROGRAM: u16 = 3001;
    pub const STREAM_ANALYZE_TIMEOUT: u16 = 3002;
    pub const STREAM_ENDED: u16 = 3003;
    pub const STREAM_IO_ERROR: u16 = 3004;

    // Decoder errors (4000-4999)
    pub const DECODER_UNAVAILABLE: u16 = 4001;
    pub const DECODER_CORRUPT_PACKET: u16 = 4002;
    pub const DECODER_LOST_SYNC: u16 = 4003;
    pub const DECODER_MALFORMED: u16 = 4004;
    pub const DECODER_CODEC_FAILED: u16 = 4005;
    pub const DECODER_CLOSED: u16 = 4006;

    // Display errors (5000-5999)
    pub const DISPLAY_EMPTY_FRAME: u16 = 5001;
    pub const DISPLAY_SIZE_MISMATCH: u16 = 5002;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Configuration file could not be parsed",
        1003 => "Invalid configuration value",
        1004 => "Unknown or malformed decoder option",

        2001 => "Backend executable not found",
        2002 => "Permission denied launching the backend",
        2003 => "A backend process is already running",
        2004 => "Backend output pipe unavailable",
        2005 => "Backend process failed to spawn",
        2006 => "Failed waiting for the backend to exit",

        3001 => "No video program found in the stream",
        3002 => "Stream analysis timed out",
        3003 => "Stream ended before a video program was found",
        3004 => "Stream read error",

        4001 => "Video decoder unavailable",
        4002 => "Corrupt transport packet",
        4003 => "Lost transport stream sync",
        4004 => "Malformed decoder data",
        4005 => "Video codec failure",
        4006 => "Video decoder closed",

        5001 => "Frame has no pixels",
        5002 => "Frame buffer size mismatch",

        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_ranges() {
        assert!((1000..2000).contains(&ErrorCode::CONFIG_UNKNOWN_OPTION));
        assert!((2000..3000).contains(&ErrorCode::PROCESS_WAIT_FAILED));
        assert!((3000..4000).contains(&ErrorCode::STREAM_IO_ERROR));
        assert!((4000..5000).contains(&ErrorCode::DECODER_CLOSED));
        assert!((5000..6000).contains(&ErrorCode::DISPLAY_SIZE_MISMATCH));
    }

    #[test]
    fn test_describe_error_code() {
        assert_eq!(describe_error_code(2001), "Backend executable not found");
        assert_eq!(describe_error_code(3002), "Stream analysis timed out");
        assert_eq!(describe_error_code(65535), "Unknown error code");
    }
}
