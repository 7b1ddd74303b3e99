//! Synthetic transport streams and a trivial codec to decode them
//!
//! The raw codec understands a made-up access unit layout: the magic
//! `RAWV`, width and height as big-endian `u16`, then RGB24 pixels. This
//! keeps tests independent of any installed video decoder.

use crate::decoder::psi::{crc32_mpeg2, PAT_PID, PAT_TABLE_ID, PMT_TABLE_ID};
use crate::decoder::{
    AccessUnit, CodecFactory, DecodedFrame, DecoderOptions, DemuxError, FrameDecodeError,
    FrameSender, PixelFormat, VideoCodec, VideoStreamInfo,
};
use crate::decoder::demux::{SYNC_BYTE, TS_PACKET_SIZE};
use crate::subprocess::LogSink;
use async_trait::async_trait;
use std::collections::HashMap;

pub const RAW_FRAME_MAGIC: &[u8; 4] = b"RAWV";
pub const DEFAULT_PMT_PID: u16 = 0x1000;
pub const DEFAULT_VIDEO_PID: u16 = 0x0100;
/// 90 kHz ticks between frames at 30 fps
pub const FRAME_TICKS: u64 = 3000;

const PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;

/// Builds a single-program transport stream packet by packet
#[derive(Debug)]
pub struct TsStreamBuilder {
    pmt_pid: u16,
    video_pid: u16,
    stream_type: u8,
    continuity: HashMap<u16, u8>,
    bytes: Vec<u8>,
    packet_offsets: Vec<usize>,
    frames: u64,
}

impl Default for TsStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TsStreamBuilder {
    pub fn new() -> Self {
        Self {
            pmt_pid: DEFAULT_PMT_PID,
            video_pid: DEFAULT_VIDEO_PID,
            stream_type: 0x1B,
            continuity: HashMap::new(),
            bytes: Vec::new(),
            packet_offsets: Vec::new(),
            frames: 0,
        }
    }

    pub fn with_stream_type(mut self, stream_type: u8) -> Self {
        self.stream_type = stream_type;
        self
    }

    pub fn packet_count(&self) -> usize {
        self.packet_offsets.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// PAT followed by a PMT announcing one stream
    pub fn program_tables(&mut self) -> &mut Self {
        let mut pat = vec![
            PAT_TABLE_ID,
            0xB0,
            13,
            0x00,
            0x01, // transport stream id
            0xC1,
            0x00,
            0x00,
            0x00,
            0x01, // program 1
        ];
        pat.extend_from_slice(&pid_bytes(self.pmt_pid));
        self.psi_packet(PAT_PID, pat);

        let mut pmt = vec![
            PMT_TABLE_ID,
            0xB0,
            18,
            0x00,
            0x01, // program number
            0xC1,
            0x00,
            0x00,
        ];
        pmt.extend_from_slice(&pid_bytes(self.video_pid)); // PCR pid
        pmt.extend_from_slice(&[0xF0, 0x00]);
        pmt.push(self.stream_type);
        pmt.extend_from_slice(&pid_bytes(self.video_pid));
        pmt.extend_from_slice(&[0xF0, 0x00]);
        self.psi_packet(self.pmt_pid, pmt);
        self
    }

    /// One PES packet on the video pid, split over as many TS packets as needed
    pub fn pes(&mut self, payload: &[u8], pts: Option<u64>) -> &mut Self {
        let header_data = pts.map(encode_timestamp).unwrap_or_default();
        let pes_length = 3 + header_data.len() + payload.len();
        let length_field = u16::try_from(pes_length).unwrap_or(0);

        let mut pes = vec![0x00, 0x00, 0x01, 0xE0];
        pes.extend_from_slice(&length_field.to_be_bytes());
        pes.push(0x80);
        pes.push(if pts.is_some() { 0x80 } else { 0x00 });
        pes.push(header_data.len() as u8);
        pes.extend_from_slice(&header_data);
        pes.extend_from_slice(payload);

        for (i, chunk) in pes.chunks(PAYLOAD_SIZE).enumerate() {
            self.payload_packet(self.video_pid, chunk, i == 0);
        }
        self
    }

    /// A solid-colour frame in the raw codec's layout
    pub fn raw_frame(&mut self, width: u16, height: u16, rgb: [u8; 3]) -> &mut Self {
        let pts = self.frames * FRAME_TICKS;
        self.frames += 1;
        self.pes(&solid_frame(width, height, rgb), Some(pts))
    }

    /// A single unit-start packet on the video pid with arbitrary payload
    pub fn raw_video_packet(&mut self, payload: &[u8]) -> &mut Self {
        self.payload_packet(self.video_pid, &payload[..payload.len().min(PAYLOAD_SIZE)], true);
        self
    }

    /// Bytes outside any packet structure
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// One unit-start packet on an arbitrary pid, such as an audio stream
    pub fn packet_on(&mut self, pid: u16, payload: &[u8]) -> &mut Self {
        self.payload_packet(pid, &payload[..payload.len().min(PAYLOAD_SIZE)], true);
        self
    }

    /// Set the transport-error indicator on packet `index`
    pub fn set_transport_error(&mut self, index: usize) -> &mut Self {
        if let Some(&offset) = self.packet_offsets.get(index) {
            self.bytes[offset + 1] |= 0x80;
        }
        self
    }

    /// Drop packet `index` as if lost in transit
    pub fn remove_packet(&mut self, index: usize) -> &mut Self {
        if index < self.packet_offsets.len() {
            let offset = self.packet_offsets.remove(index);
            self.bytes.drain(offset..offset + TS_PACKET_SIZE);
            for later in &mut self.packet_offsets[index..] {
                *later -= TS_PACKET_SIZE;
            }
        }
        self
    }

    fn next_continuity(&mut self, pid: u16) -> u8 {
        let counter = self.continuity.entry(pid).or_insert(0);
        let current = *counter;
        *counter = (*counter + 1) & 0x0F;
        current
    }

    fn psi_packet(&mut self, pid: u16, mut section: Vec<u8>) {
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        let mut payload = vec![0x00];
        payload.extend_from_slice(&section);
        payload.resize(PAYLOAD_SIZE, 0xFF);
        self.payload_packet(pid, &payload, true);
    }

    fn payload_packet(&mut self, pid: u16, chunk: &[u8], unit_start: bool) {
        let continuity = self.next_continuity(pid);
        let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
        packet.push(SYNC_BYTE);
        let unit_start_flag = if unit_start { 0x40 } else { 0x00 };
        packet.push(unit_start_flag | ((pid >> 8) as u8 & 0x1F));
        packet.push(pid as u8);

        if chunk.len() == PAYLOAD_SIZE {
            packet.push(0x10 | continuity);
        } else {
            // Pad through an adaptation field so the payload ends the packet
            packet.push(0x30 | continuity);
            let adaptation_len = PAYLOAD_SIZE - 1 - chunk.len();
            packet.push(adaptation_len as u8);
            if adaptation_len > 0 {
                packet.push(0x00);
                packet.resize(packet.len() + adaptation_len - 1, 0xFF);
            }
        }
        packet.extend_from_slice(chunk);
        debug_assert_eq!(packet.len(), TS_PACKET_SIZE);

        self.packet_offsets.push(self.bytes.len());
        self.bytes.extend_from_slice(&packet);
    }
}

fn pid_bytes(pid: u16) -> [u8; 2] {
    [0xE0 | (pid >> 8) as u8, pid as u8]
}

fn encode_timestamp(pts: u64) -> Vec<u8> {
    vec![
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        (((pts >> 14) & 0xFE) | 1) as u8,
        (pts >> 7) as u8,
        (((pts << 1) & 0xFE) | 1) as u8,
    ]
}

pub fn encode_raw_frame(width: u16, height: u16, rgb: &[u8]) -> Vec<u8> {
    let mut unit = Vec::with_capacity(8 + rgb.len());
    unit.extend_from_slice(RAW_FRAME_MAGIC);
    unit.extend_from_slice(&width.to_be_bytes());
    unit.extend_from_slice(&height.to_be_bytes());
    unit.extend_from_slice(rgb);
    unit
}

pub fn solid_frame(width: u16, height: u16, rgb: [u8; 3]) -> Vec<u8> {
    let pixels: Vec<u8> = rgb
        .iter()
        .copied()
        .cycle()
        .take(usize::from(width) * usize::from(height) * 3)
        .collect();
    encode_raw_frame(width, height, &pixels)
}

/// Program tables followed by `frames` solid frames of distinct colours
pub fn synthetic_stream(width: u16, height: u16, frames: usize) -> Vec<u8> {
    let mut builder = TsStreamBuilder::new();
    builder.program_tables();
    for i in 0..frames {
        let shade = (i * 40 % 256) as u8;
        builder.pes(
            &solid_frame(width, height, [shade, 255 - shade, 128]),
            Some(i as u64 * FRAME_TICKS),
        );
    }
    builder.into_bytes()
}

pub fn decode_raw_frame(data: &[u8]) -> Result<DecodedFrame, FrameDecodeError> {
    let header = data
        .get(..8)
        .ok_or_else(|| FrameDecodeError::Malformed(format!("{} byte unit", data.len())))?;
    if &header[..4] != RAW_FRAME_MAGIC {
        return Err(FrameDecodeError::Malformed("bad raw frame magic".to_string()));
    }

    let width = u16::from_be_bytes([header[4], header[5]]);
    let height = u16::from_be_bytes([header[6], header[7]]);
    let pixels = &data[8..];
    let expected = usize::from(width) * usize::from(height) * 3;
    if pixels.len() != expected {
        return Err(FrameDecodeError::Malformed(format!(
            "{}x{} frame with {} pixel bytes",
            width,
            height,
            pixels.len()
        )));
    }

    Ok(DecodedFrame::new(
        u32::from(width),
        u32::from(height),
        PixelFormat::Rgb24,
        pixels.to_vec(),
    ))
}

/// Decodes the raw layout straight into frames
pub struct RawVideoCodec {
    frames: FrameSender,
}

#[async_trait]
impl VideoCodec for RawVideoCodec {
    async fn submit(&mut self, unit: AccessUnit) -> Result<(), FrameDecodeError> {
        let frame = decode_raw_frame(&unit.data)?.with_pts(unit.pts);
        self.frames
            .send(Ok(frame))
            .await
            .map_err(|_| FrameDecodeError::CodecClosed)
    }

    async fn finish(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawVideoCodecFactory;

impl CodecFactory for RawVideoCodecFactory {
    fn create(
        &self,
        stream: &VideoStreamInfo,
        _options: &DecoderOptions,
        frames: FrameSender,
        _log: LogSink,
    ) -> Result<Box<dyn VideoCodec>, DemuxError> {
        tracing::debug!("Raw test codec for pid 0x{:04x}", stream.pid);
        Ok(Box::new(RawVideoCodec { frames }))
    }
}
