use super::codec::{CodecFactory, FrameResult, FrameSender, VideoCodec};
use super::demux::{DemuxEvent, TsDemuxer, VideoStreamInfo, TS_PACKET_SIZE};
use super::error::{DemuxError, FrameDecodeError};
use super::frame::DecodedFrame;
use super::options::DecoderOptions;
use crate::error::StreamTapError;
use crate::subprocess::LogSink;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const READ_CHUNK: usize = TS_PACKET_SIZE * 32;

/// Decoded frames of the first video stream found in a transport stream.
///
/// Opening probes the source until the program tables name a video stream.
/// After that a background task feeds the codec and frames are handed out
/// one at a time; the decoder stays at most one frame ahead of its consumer.
pub struct StreamDecoder {
    stream: VideoStreamInfo,
    frames: mpsc::Receiver<FrameResult>,
    log: LogSink,
    pump: Option<JoinHandle<()>>,
    delivered: u64,
    skipped: u64,
    ended: bool,
}

impl StreamDecoder {
    pub async fn open<R>(
        mut source: R,
        options: &DecoderOptions,
        factory: &dyn CodecFactory,
        log: LogSink,
    ) -> Result<Self, DemuxError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        if options.seekable {
            tracing::debug!("Seekable hint ignored for a live pipe");
        }

        let mut demuxer = TsDemuxer::new();
        let (stream, backlog) = probe(&mut source, &mut demuxer, options).await?;
        tracing::info!(
            "Found {} video on pid 0x{:04x} (program {})",
            stream.codec,
            stream.pid,
            stream.program_number
        );

        let (tx, rx) = mpsc::channel(1);
        let codec = factory.create(&stream, options, tx.clone(), log.clone())?;
        let pump = tokio::spawn(pump(source, demuxer, backlog, codec, tx, log.clone()));

        Ok(Self {
            stream,
            frames: rx,
            log,
            pump: Some(pump),
            delivered: 0,
            skipped: 0,
            ended: false,
        })
    }

    pub fn stream_info(&self) -> &VideoStreamInfo {
        &self.stream
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    /// Next decoded frame, or `None` once the stream has ended.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub async fn next_frame(&mut self) -> Option<DecodedFrame> {
        if self.ended {
            return None;
        }

        loop {
            match self.frames.recv().await {
                Some(Ok(frame)) => {
                    self.delivered += 1;
                    return Some(frame);
                }
                Some(Err(e)) => {
                    self.skipped += 1;
                    self.log.append(format!("Frame decode error: {}", e));
                    tracing::warn!("Skipping undecodable frame: {}", StreamTapError::from(e));
                }
                None => {
                    self.ended = true;
                    self.pump = None;
                    tracing::debug!(
                        "Video stream ended after {} frames ({} skipped)",
                        self.delivered,
                        self.skipped
                    );
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = DecodedFrame> + Send {
        futures::stream::unfold(self, |mut decoder| async move {
            decoder.next_frame().await.map(|frame| (frame, decoder))
        })
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn probe<R>(
    source: &mut R,
    demuxer: &mut TsDemuxer,
    options: &DecoderOptions,
) -> Result<(VideoStreamInfo, Vec<DemuxEvent>), DemuxError>
where
    R: AsyncRead + Unpin,
{
    let budget = options.probe_budget();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut events = Vec::new();
    let mut examined = 0usize;
    let deadline = Instant::now() + options.analyze_duration;

    loop {
        let read = tokio::time::timeout_at(deadline, source.read(&mut buf))
            .await
            .map_err(|_| DemuxError::AnalyzeTimeout(options.analyze_duration))??;
        if read == 0 {
            return Err(DemuxError::EndOfStream { examined });
        }

        examined += read;
        demuxer.feed(&buf[..read], &mut events);

        if let Some(found) = events
            .iter()
            .position(|e| matches!(e, DemuxEvent::StreamFound(_)))
        {
            let backlog = events.split_off(found + 1);
            if let Some(DemuxEvent::StreamFound(stream)) = events.pop() {
                return Ok((stream, backlog));
            }
        }
        for event in events.drain(..) {
            tracing::trace!("Before video program: {:?}", event);
        }

        if examined >= budget {
            return Err(DemuxError::NoProgram { examined });
        }
        if Instant::now() >= deadline {
            return Err(DemuxError::AnalyzeTimeout(options.analyze_duration));
        }
    }
}

async fn pump<R>(
    mut source: R,
    mut demuxer: TsDemuxer,
    backlog: Vec<DemuxEvent>,
    mut codec: Box<dyn VideoCodec>,
    frames: FrameSender,
    log: LogSink,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut events = backlog;
    let mut eof = false;

    'read: loop {
        for event in events.drain(..) {
            if !dispatch(event, codec.as_mut(), &frames, &log).await {
                break 'read;
            }
        }
        if eof || frames.is_closed() {
            break;
        }

        match source.read(&mut buf).await {
            Ok(0) => {
                demuxer.finish(&mut events);
                eof = true;
            }
            Ok(read) => demuxer.feed(&buf[..read], &mut events),
            Err(e) => {
                log.append(format!("Video stream read failed: {}", e));
                break;
            }
        }
    }

    codec.finish().await;
    let stats = demuxer.stats();
    tracing::debug!(
        "Demuxer done (eof: {}): {} packets, {} access units, {} corrupt",
        eof,
        stats.packets,
        stats.access_units,
        stats.corrupt
    );
}

/// Route one demuxer event; `false` when the codec can take no more input.
async fn dispatch(
    event: DemuxEvent,
    codec: &mut dyn VideoCodec,
    frames: &FrameSender,
    log: &LogSink,
) -> bool {
    let error = match event {
        DemuxEvent::AccessUnit(unit) => match codec.submit(unit).await {
            Ok(()) => return true,
            Err(FrameDecodeError::CodecClosed) => {
                log.append("Video decoder exited early; stopping decode");
                return false;
            }
            Err(e) => e,
        },
        DemuxEvent::Corrupt(e) => e,
        DemuxEvent::StreamFound(_) => return true,
    };
    frames.send(Err(error)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{synthetic_stream, RawVideoCodecFactory, TsStreamBuilder};
    use futures::StreamExt;
    use std::io::Cursor;
    use std::time::Duration;

    fn options() -> DecoderOptions {
        DecoderOptions {
            hwaccel: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_decodes_synthetic_stream() {
        let bytes = synthetic_stream(16, 8, 3);
        let log = LogSink::default();
        let mut decoder = StreamDecoder::open(Cursor::new(bytes), &options(), &RawVideoCodecFactory, log)
            .await
            .unwrap();

        assert_eq!(decoder.stream_info().pid, 0x0100);
        let mut count = 0;
        while let Some(frame) = decoder.next_frame().await {
            assert_eq!((frame.width, frame.height), (16, 8));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(decoder.frames_delivered(), 3);
        assert!(decoder.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_unit_is_skipped_and_logged() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().raw_frame(4, 4, [10, 10, 10]);
        let damaged = builder.packet_count();
        builder
            .raw_frame(4, 4, [20, 20, 20])
            .raw_frame(4, 4, [30, 30, 30]);
        builder.set_transport_error(damaged);

        let log = LogSink::default();
        let bytes = builder.into_bytes();
        let decoder = StreamDecoder::open(Cursor::new(bytes), &options(), &RawVideoCodecFactory, log.clone())
            .await
            .unwrap();

        let frames: Vec<DecodedFrame> = decoder.into_stream().collect().await;
        let firsts: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(firsts, vec![10, 30]);
        assert!(log
            .snapshot()
            .iter()
            .any(|entry| entry.text.starts_with("Frame decode error:")));
    }

    #[tokio::test]
    async fn test_damaged_audio_packet_is_not_logged() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().raw_frame(4, 4, [10, 10, 10]);
        let damaged = builder.packet_count();
        builder
            .packet_on(0x0101, &[0xEE; 40])
            .raw_frame(4, 4, [20, 20, 20]);
        builder.set_transport_error(damaged);

        let log = LogSink::default();
        let mut decoder = StreamDecoder::open(
            Cursor::new(builder.into_bytes()),
            &options(),
            &RawVideoCodecFactory,
            log.clone(),
        )
        .await
        .unwrap();
        while decoder.next_frame().await.is_some() {}

        assert_eq!(decoder.frames_delivered(), 2);
        assert_eq!(decoder.frames_skipped(), 0);
        assert!(log
            .snapshot()
            .iter()
            .all(|entry| !entry.text.starts_with("Frame decode error:")));
    }

    #[tokio::test]
    async fn test_open_fails_when_probe_budget_exhausted() {
        let bytes = vec![0x47u8; 30 * TS_PACKET_SIZE];
        let result =
            StreamDecoder::open(Cursor::new(bytes), &options(), &RawVideoCodecFactory, LogSink::default())
                .await;
        assert!(matches!(result, Err(DemuxError::NoProgram { .. })));
    }

    #[tokio::test]
    async fn test_open_fails_on_empty_stream() {
        let result =
            StreamDecoder::open(Cursor::new(Vec::new()), &options(), &RawVideoCodecFactory, LogSink::default())
                .await;
        assert!(matches!(result, Err(DemuxError::EndOfStream { examined: 0 })));
    }

    #[tokio::test]
    async fn test_open_times_out_on_silent_stream() {
        let (writer, reader) = tokio::io::duplex(1024);
        let options = DecoderOptions {
            analyze_duration: Duration::from_millis(50),
            ..options()
        };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            StreamDecoder::open(reader, &options, &RawVideoCodecFactory, LogSink::default()),
        )
        .await
        .expect("open must give up once the analyze duration has passed");
        assert!(matches!(result, Err(DemuxError::AnalyzeTimeout(_))));
        drop(writer);
    }

    #[tokio::test]
    async fn test_open_times_out_on_stalled_stream() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        tokio::io::AsyncWriteExt::write_all(&mut writer, &[0u8; 100])
            .await
            .unwrap();

        let options = DecoderOptions {
            analyze_duration: Duration::from_millis(50),
            ..options()
        };
        let result =
            StreamDecoder::open(reader, &options, &RawVideoCodecFactory, LogSink::default()).await;
        assert!(matches!(result, Err(DemuxError::AnalyzeTimeout(_))));
        drop(writer);
    }
}
