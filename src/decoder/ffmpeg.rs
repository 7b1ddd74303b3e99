//! External ffmpeg process as the video codec
//!
//! Access units are written to ffmpeg's stdin as an elementary stream and
//! frames come back as a PPM image sequence on its stdout.

use super::codec::{CodecFactory, FrameSender, VideoCodec};
use super::demux::{AccessUnit, VideoCodecKind, VideoStreamInfo};
use super::error::{DemuxError, FrameDecodeError};
use super::options::{DecoderOptions, ThreadCount};
use super::ppm::PpmReader;
use crate::subprocess::{lossy_lines, LogSink};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

pub const DEFAULT_FFMPEG: &str = "ffmpeg";

#[derive(Debug, Clone)]
pub struct FfmpegCodecFactory {
    binary: PathBuf,
}

impl Default for FfmpegCodecFactory {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG)
    }
}

impl FfmpegCodecFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Elementary stream demuxer name for the codec
    pub fn input_format(codec: VideoCodecKind) -> &'static str {
        match codec {
            VideoCodecKind::Mpeg1 | VideoCodecKind::Mpeg2 => "mpegvideo",
            VideoCodecKind::Mpeg4Part2 => "m4v",
            VideoCodecKind::H264 => "h264",
            VideoCodecKind::Hevc => "hevc",
        }
    }

    pub fn build_args(codec: VideoCodecKind, options: &DecoderOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostats", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(hwaccel) = &options.hwaccel {
            args.extend(["-hwaccel".to_string(), hwaccel.clone()]);
        }
        if let ThreadCount::Fixed(n) = options.threads {
            args.extend(["-threads".to_string(), n.to_string()]);
        }
        if options.no_buffer {
            args.extend(["-fflags".to_string(), "nobuffer".to_string()]);
        }
        if options.low_delay {
            args.extend(["-flags".to_string(), "low_delay".to_string()]);
        }
        args.extend([
            "-probesize".to_string(),
            options.probe_size.max(32).to_string(),
            "-analyzeduration".to_string(),
            options.analyze_duration.as_micros().to_string(),
            "-f".to_string(),
            Self::input_format(codec).to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-an".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "ppm".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

impl CodecFactory for FfmpegCodecFactory {
    fn create(
        &self,
        stream: &VideoStreamInfo,
        options: &DecoderOptions,
        frames: FrameSender,
        log: LogSink,
    ) -> Result<Box<dyn VideoCodec>, DemuxError> {
        let args = Self::build_args(stream.codec, options);
        tracing::debug!("Starting decoder: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DemuxError::CodecUnavailable(format!("{}: {}", self.binary.display(), e))
            })?;

        let missing = |name: &str| DemuxError::CodecUnavailable(format!("decoder {} not captured", name));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        Ok(Box::new(FfmpegCodec {
            child,
            stdin: Some(stdin),
            reader: Some(tokio::spawn(read_frames(stdout, frames))),
            diagnostics: Some(tokio::spawn(forward_diagnostics(stderr, log))),
        }))
    }
}

pub struct FfmpegCodec {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    diagnostics: Option<JoinHandle<()>>,
}

#[async_trait]
impl VideoCodec for FfmpegCodec {
    async fn submit(&mut self, unit: AccessUnit) -> Result<(), FrameDecodeError> {
        let stdin = self.stdin.as_mut().ok_or(FrameDecodeError::CodecClosed)?;
        match stdin.write_all(&unit.data).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                self.stdin = None;
                Err(FrameDecodeError::CodecClosed)
            }
            Err(e) => Err(FrameDecodeError::Codec(e.to_string())),
        }
    }

    async fn finish(&mut self) {
        // Closing stdin lets ffmpeg drain and exit
        drop(self.stdin.take());

        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        if let Some(diagnostics) = self.diagnostics.take() {
            let _ = diagnostics.await;
        }
        match self.child.wait().await {
            Ok(status) => tracing::debug!("Decoder process exited: {}", status),
            Err(e) => tracing::warn!("Failed to reap decoder process: {}", e),
        }
    }
}

async fn read_frames(stdout: ChildStdout, frames: FrameSender) {
    let mut reader = PpmReader::new(BufReader::new(stdout));
    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                // Framing is lost; nothing after this point can be trusted
                let _ = frames.send(Err(e)).await;
                break;
            }
        }
    }
}

async fn forward_diagnostics(stderr: ChildStderr, log: LogSink) {
    let mut lines = lossy_lines(stderr);
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => log.append(format!("DEC: {}", line)),
            Err(e) => {
                tracing::debug!("Decoder diagnostics closed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_input_formats() {
        assert_eq!(FfmpegCodecFactory::input_format(VideoCodecKind::H264), "h264");
        assert_eq!(FfmpegCodecFactory::input_format(VideoCodecKind::Hevc), "hevc");
        assert_eq!(
            FfmpegCodecFactory::input_format(VideoCodecKind::Mpeg2),
            "mpegvideo"
        );
        assert_eq!(
            FfmpegCodecFactory::input_format(VideoCodecKind::Mpeg4Part2),
            "m4v"
        );
    }

    #[test]
    fn test_build_args_carries_low_latency_options() {
        let options = DecoderOptions {
            hwaccel: Some("vaapi".to_string()),
            threads: ThreadCount::Fixed(2),
            analyze_duration: Duration::from_millis(200),
            ..Default::default()
        };
        let args = FfmpegCodecFactory::build_args(VideoCodecKind::H264, &options);
        let joined = args.join(" ");

        assert!(joined.contains("-hwaccel vaapi"));
        assert!(joined.contains("-threads 2"));
        assert!(joined.contains("-fflags nobuffer"));
        assert!(joined.contains("-flags low_delay"));
        assert!(joined.contains("-probesize 4096"));
        assert!(joined.contains("-analyzeduration 200000"));
        assert!(joined.contains("-f h264 -i pipe:0"));
        assert!(joined.ends_with("-f image2pipe -vcodec ppm pipe:1"));
    }

    #[test]
    fn test_build_args_omits_disabled_options() {
        let options = DecoderOptions {
            hwaccel: None,
            no_buffer: false,
            low_delay: false,
            ..Default::default()
        };
        let args = FfmpegCodecFactory::build_args(VideoCodecKind::Hevc, &options);
        assert!(!args.contains(&"-hwaccel".to_string()));
        assert!(!args.contains(&"-threads".to_string()));
        assert!(!args.contains(&"-fflags".to_string()));
        assert!(!args.contains(&"low_delay".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_codec_unavailable() {
        let factory = FfmpegCodecFactory::new("/nonexistent/streamtap-ffmpeg");
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let stream = VideoStreamInfo {
            program_number: 1,
            pid: 0x100,
            stream_type: 0x1B,
            codec: VideoCodecKind::H264,
        };
        let result = factory.create(&stream, &DecoderOptions::default(), tx, LogSink::default());
        assert!(matches!(result, Err(DemuxError::CodecUnavailable(_))));
    }

    #[cfg(unix)]
    fn stub_decoder(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn h264_stream() -> VideoStreamInfo {
        VideoStreamInfo {
            program_number: 1,
            pid: 0x100,
            stream_type: 0x1B,
            codec: VideoCodecKind::H264,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_codec_pipes_units_and_reads_ppm_frames() {
        let dir = tempfile::tempdir().unwrap();
        let binary = stub_decoder(
            &dir,
            "echo 'stub decoder ready' >&2\n\
             cat > \"$(dirname \"$0\")/input\"\n\
             printf 'P6\\n2 1\\n255\\n\\377\\000\\000\\000\\377\\000'",
        );
        let factory = FfmpegCodecFactory::new(&binary);
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let log = LogSink::default();

        let mut codec = factory
            .create(&h264_stream(), &DecoderOptions::default(), tx, log.clone())
            .unwrap();
        codec
            .submit(AccessUnit {
                pts: Some(0),
                data: vec![0, 0, 0, 1, 0x65],
            })
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(10), codec.finish())
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.data, vec![255, 0, 0, 0, 255, 0]);
        assert!(rx.recv().await.is_none());

        let input = std::fs::read(dir.path().join("input")).unwrap();
        assert_eq!(input, vec![0, 0, 0, 1, 0x65]);
        let lines: Vec<String> = log.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(lines, vec!["DEC: stub decoder ready"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_decoder_reports_codec_closed() {
        let dir = tempfile::tempdir().unwrap();
        let binary = stub_decoder(&dir, "exit 1");
        let factory = FfmpegCodecFactory::new(&binary);
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);

        let mut codec = factory
            .create(&h264_stream(), &DecoderOptions::default(), tx, LogSink::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let unit = AccessUnit {
            pts: None,
            data: vec![0; 256 * 1024],
        };
        let result = codec.submit(unit.clone()).await;
        assert!(matches!(result, Err(FrameDecodeError::CodecClosed)));

        // Later units fail fast once the pipe is gone
        let result = codec.submit(unit).await;
        assert!(matches!(result, Err(FrameDecodeError::CodecClosed)));

        codec.finish().await;
        assert!(rx.recv().await.is_none());
    }
}
