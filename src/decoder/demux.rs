//! MPEG transport stream demultiplexing
//!
//! Finds the first video elementary stream advertised by the program tables
//! and reassembles its PES packets into access units. Damage is reported as
//! [`DemuxEvent::Corrupt`] and never ends the stream.

use super::error::FrameDecodeError;
use super::psi::{self, NULL_PID, PAT_PID};
use std::fmt;

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

/// Video codecs that may be carried in a transport stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecKind {
    Mpeg1,
    Mpeg2,
    Mpeg4Part2,
    H264,
    Hevc,
}

impl VideoCodecKind {
    pub fn from_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            0x01 => Some(Self::Mpeg1),
            0x02 => Some(Self::Mpeg2),
            0x10 => Some(Self::Mpeg4Part2),
            0x1B => Some(Self::H264),
            0x24 => Some(Self::Hevc),
            _ => None,
        }
    }

    pub fn stream_type(&self) -> u8 {
        match self {
            Self::Mpeg1 => 0x01,
            Self::Mpeg2 => 0x02,
            Self::Mpeg4Part2 => 0x10,
            Self::H264 => 0x1B,
            Self::Hevc => 0x24,
        }
    }
}

impl fmt::Display for VideoCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mpeg1 => "MPEG-1 video",
            Self::Mpeg2 => "MPEG-2 video",
            Self::Mpeg4Part2 => "MPEG-4 part 2",
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
        };
        f.write_str(name)
    }
}

/// The video stream selected from the program map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub program_number: u16,
    pub pid: u16,
    pub stream_type: u8,
    pub codec: VideoCodecKind,
}

/// One complete PES payload of the selected video stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub pts: Option<u64>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemuxEvent {
    StreamFound(VideoStreamInfo),
    AccessUnit(AccessUnit),
    Corrupt(FrameDecodeError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub packets: u64,
    pub access_units: u64,
    pub corrupt: u64,
    pub skipped_bytes: u64,
}

#[derive(Debug)]
struct PesAssembly {
    pts: Option<u64>,
    /// Payload length from the PES header; `None` when unbounded
    expected: Option<usize>,
    data: Vec<u8>,
}

impl PesAssembly {
    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|expected| self.data.len() >= expected)
    }

    fn into_unit(mut self) -> AccessUnit {
        if let Some(expected) = self.expected {
            self.data.truncate(expected);
        }
        AccessUnit {
            pts: self.pts,
            data: self.data,
        }
    }
}

#[derive(Debug, Default)]
pub struct TsDemuxer {
    pending: Vec<u8>,
    pmt_pid: Option<u16>,
    program_number: u16,
    video: Option<VideoStreamInfo>,
    pes: Option<PesAssembly>,
    last_cc: Option<u8>,
    stats: DemuxStats,
}

impl TsDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_stream(&self) -> Option<&VideoStreamInfo> {
        self.video.as_ref()
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Push raw stream bytes; resulting events are appended to `events`.
    pub fn feed(&mut self, data: &[u8], events: &mut Vec<DemuxEvent>) {
        self.pending.extend_from_slice(data);

        let mut offset = 0;
        while self.pending.len() - offset >= TS_PACKET_SIZE {
            if self.pending[offset] != SYNC_BYTE {
                let skipped = find_sync(&self.pending[offset..]);
                offset += skipped;
                self.lost_sync(skipped, events);
                continue;
            }

            let mut packet = [0u8; TS_PACKET_SIZE];
            packet.copy_from_slice(&self.pending[offset..offset + TS_PACKET_SIZE]);
            offset += TS_PACKET_SIZE;
            self.process_packet(&packet, events);
        }

        self.pending.drain(..offset);
    }

    /// End of input: flush an unbounded unit still being assembled.
    pub fn finish(&mut self, events: &mut Vec<DemuxEvent>) {
        if !self.pending.is_empty() {
            tracing::debug!(
                "Discarding {} trailing bytes (partial packet)",
                self.pending.len()
            );
            self.pending.clear();
        }

        if let Some(pes) = self.pes.take() {
            if pes.expected.is_none() {
                self.emit_unit(pes, events);
            } else {
                let pid = self.video.as_ref().map_or(NULL_PID, |v| v.pid);
                self.corrupt(
                    events,
                    FrameDecodeError::CorruptPacket {
                        pid,
                        reason: format!(
                            "stream ended with {} of {} PES bytes",
                            pes.data.len(),
                            pes.expected.unwrap_or_default()
                        ),
                    },
                );
            }
        }
    }

    fn lost_sync(&mut self, skipped: usize, events: &mut Vec<DemuxEvent>) {
        self.stats.skipped_bytes += skipped as u64;
        // Whatever unit was in flight lost packets along with the sync
        self.pes = None;
        self.last_cc = None;
        self.corrupt(events, FrameDecodeError::LostSync(skipped));
    }

    fn corrupt(&mut self, events: &mut Vec<DemuxEvent>, error: FrameDecodeError) {
        self.stats.corrupt += 1;
        events.push(DemuxEvent::Corrupt(error));
    }

    fn emit_unit(&mut self, pes: PesAssembly, events: &mut Vec<DemuxEvent>) {
        let unit = pes.into_unit();
        if unit.data.is_empty() {
            return;
        }
        self.stats.access_units += 1;
        events.push(DemuxEvent::AccessUnit(unit));
    }

    fn process_packet(&mut self, packet: &[u8; TS_PACKET_SIZE], events: &mut Vec<DemuxEvent>) {
        self.stats.packets += 1;

        let transport_error = packet[1] & 0x80 != 0;
        let unit_start = packet[1] & 0x40 != 0;
        let pid = (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2]);
        let adaptation_control = (packet[3] >> 4) & 0x03;
        let continuity = packet[3] & 0x0F;

        if pid == NULL_PID {
            return;
        }

        let is_video = self.video.as_ref().is_some_and(|v| v.pid == pid);
        // Only the program tables and the selected video pid are tracked
        if !is_video && pid != PAT_PID && Some(pid) != self.pmt_pid {
            return;
        }

        if transport_error {
            if is_video {
                self.pes = None;
                self.last_cc = None;
            }
            self.corrupt(
                events,
                FrameDecodeError::CorruptPacket {
                    pid,
                    reason: "transport error indicator set".to_string(),
                },
            );
            return;
        }

        let payload: &[u8] = match adaptation_control {
            0b01 => &packet[4..],
            0b10 => &[],
            0b11 => {
                let adaptation_len = usize::from(packet[4]);
                match packet.get(5 + adaptation_len..) {
                    Some(payload) => payload,
                    None => {
                        self.corrupt(
                            events,
                            FrameDecodeError::CorruptPacket {
                                pid,
                                reason: format!(
                                    "adaptation field length {} overruns packet",
                                    adaptation_len
                                ),
                            },
                        );
                        return;
                    }
                }
            }
            _ => {
                self.corrupt(
                    events,
                    FrameDecodeError::CorruptPacket {
                        pid,
                        reason: "reserved adaptation field control".to_string(),
                    },
                );
                return;
            }
        };

        if pid == PAT_PID {
            if unit_start && self.pmt_pid.is_none() {
                self.handle_pat(payload);
            }
        } else if Some(pid) == self.pmt_pid {
            if unit_start && self.video.is_none() {
                self.handle_pmt(payload, events);
            }
        } else if is_video && !payload.is_empty() {
            self.handle_video(pid, unit_start, continuity, payload, events);
        }
    }

    fn handle_pat(&mut self, payload: &[u8]) {
        let entries = match psi::parse_section(payload).and_then(|s| psi::parse_pat(&s)) {
            Ok(entries) => entries,
            Err(reason) => {
                tracing::debug!("Ignoring unusable PAT: {}", reason);
                return;
            }
        };

        // Program 0 points at the network information table
        if let Some(entry) = entries.iter().find(|e| e.program_number != 0) {
            tracing::debug!(
                "Program {} uses PMT pid 0x{:04x}",
                entry.program_number,
                entry.pmt_pid
            );
            self.program_number = entry.program_number;
            self.pmt_pid = Some(entry.pmt_pid);
        }
    }

    fn handle_pmt(&mut self, payload: &[u8], events: &mut Vec<DemuxEvent>) {
        let streams = match psi::parse_section(payload).and_then(|s| psi::parse_pmt(&s)) {
            Ok(streams) => streams,
            Err(reason) => {
                tracing::debug!("Ignoring unusable PMT: {}", reason);
                return;
            }
        };

        let selected = streams.iter().find_map(|stream| {
            VideoCodecKind::from_stream_type(stream.stream_type).map(|codec| VideoStreamInfo {
                program_number: self.program_number,
                pid: stream.pid,
                stream_type: stream.stream_type,
                codec,
            })
        });

        match selected {
            Some(info) => {
                tracing::debug!("Selected {} stream on pid 0x{:04x}", info.codec, info.pid);
                self.video = Some(info.clone());
                events.push(DemuxEvent::StreamFound(info));
            }
            None => tracing::debug!(
                "Program {} carries no supported video stream ({} streams)",
                self.program_number,
                streams.len()
            ),
        }
    }

    fn handle_video(
        &mut self,
        pid: u16,
        unit_start: bool,
        continuity: u8,
        payload: &[u8],
        events: &mut Vec<DemuxEvent>,
    ) {
        if let Some(last) = self.last_cc {
            if continuity == last {
                // Duplicate packet
                return;
            }
            let expected = (last + 1) & 0x0F;
            if continuity != expected {
                self.pes = None;
                self.corrupt(
                    events,
                    FrameDecodeError::CorruptPacket {
                        pid,
                        reason: format!(
                            "continuity counter jumped from {} to {}",
                            last, continuity
                        ),
                    },
                );
            }
        }
        self.last_cc = Some(continuity);

        if unit_start {
            if let Some(previous) = self.pes.take() {
                if previous.expected.is_none() || previous.is_complete() {
                    self.emit_unit(previous, events);
                } else {
                    self.corrupt(
                        events,
                        FrameDecodeError::CorruptPacket {
                            pid,
                            reason: format!(
                                "PES cut short at {} bytes",
                                previous.data.len()
                            ),
                        },
                    );
                }
            }

            match parse_pes_header(payload) {
                Ok(pes) => self.pes = Some(pes),
                Err(reason) => {
                    self.corrupt(events, FrameDecodeError::CorruptPacket { pid, reason });
                    return;
                }
            }
        } else if let Some(pes) = self.pes.as_mut() {
            pes.data.extend_from_slice(payload);
        }

        if self.pes.as_ref().is_some_and(PesAssembly::is_complete) {
            if let Some(pes) = self.pes.take() {
                self.emit_unit(pes, events);
            }
        }
    }
}

/// Offset of the next plausible packet start, or the whole buffer if none.
///
/// A candidate is accepted when another sync byte follows one packet later
/// or the buffer ends before that point.
fn find_sync(buf: &[u8]) -> usize {
    (1..buf.len())
        .find(|&i| {
            buf[i] == SYNC_BYTE
                && buf
                    .get(i + TS_PACKET_SIZE)
                    .map_or(true, |&next| next == SYNC_BYTE)
        })
        .unwrap_or(buf.len())
}

fn parse_pes_header(payload: &[u8]) -> Result<PesAssembly, String> {
    if payload.len() < 6 || payload[..3] != [0x00, 0x00, 0x01] {
        return Err("missing PES start code".to_string());
    }

    let stream_id = payload[3];
    let packet_length = usize::from(u16::from_be_bytes([payload[4], payload[5]]));

    // Padding, private_stream_2, ECM, EMM, DSM-CC, H.222.1 type E, directory
    let has_optional_header = !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF);
    if !has_optional_header {
        return Ok(PesAssembly {
            pts: None,
            expected: (packet_length > 0).then_some(packet_length),
            data: payload[6..].to_vec(),
        });
    }

    if payload.len() < 9 {
        return Err("truncated PES header".to_string());
    }
    let flags = payload[7];
    let header_data_len = usize::from(payload[8]);
    let start = 9 + header_data_len;
    if start > payload.len() {
        return Err(format!(
            "PES header of {} bytes exceeds packet payload",
            header_data_len
        ));
    }

    let pts = if flags & 0x80 != 0 && header_data_len >= 5 {
        Some(decode_timestamp(&payload[9..14]))
    } else {
        None
    };

    let expected = if packet_length == 0 {
        None
    } else {
        Some(
            packet_length
                .checked_sub(3 + header_data_len)
                .ok_or_else(|| format!("PES length {} shorter than its header", packet_length))?,
        )
    };

    Ok(PesAssembly {
        pts,
        expected,
        data: payload[start..].to_vec(),
    })
}

fn decode_timestamp(bytes: &[u8]) -> u64 {
    (u64::from(bytes[0] >> 1) & 0x07) << 30
        | u64::from(bytes[1]) << 22
        | u64::from(bytes[2] >> 1) << 15
        | u64::from(bytes[3]) << 7
        | u64::from(bytes[4] >> 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TsStreamBuilder;

    fn demux_all(bytes: &[u8]) -> Vec<DemuxEvent> {
        let mut demuxer = TsDemuxer::new();
        let mut events = Vec::new();
        demuxer.feed(bytes, &mut events);
        demuxer.finish(&mut events);
        events
    }

    fn units(events: &[DemuxEvent]) -> Vec<&AccessUnit> {
        events
            .iter()
            .filter_map(|e| match e {
                DemuxEvent::AccessUnit(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }

    fn corrupt_count(events: &[DemuxEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, DemuxEvent::Corrupt(_)))
            .count()
    }

    #[test]
    fn test_stream_type_mapping() {
        for t in [0x01, 0x02, 0x10, 0x1B, 0x24] {
            let kind = VideoCodecKind::from_stream_type(t).unwrap();
            assert_eq!(kind.stream_type(), t);
        }
        assert_eq!(VideoCodecKind::from_stream_type(0x0F), None);
    }

    #[test]
    fn test_finds_video_stream_and_reassembles_units() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().pes(&payload, Some(90_000));

        let events = demux_all(&builder.into_bytes());
        assert!(matches!(
            &events[0],
            DemuxEvent::StreamFound(info) if info.pid == 0x0100 && info.codec == VideoCodecKind::H264
        ));

        let units = units(&events);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].data, payload);
        assert_eq!(units[0].pts, Some(90_000));
        assert_eq!(corrupt_count(&events), 0);
    }

    #[test]
    fn test_feeding_in_small_chunks_matches_single_feed() {
        let mut builder = TsStreamBuilder::new();
        builder
            .program_tables()
            .pes(&[1u8; 500], None)
            .pes(&[2u8; 700], None);
        let bytes = builder.into_bytes();

        let mut demuxer = TsDemuxer::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(37) {
            demuxer.feed(chunk, &mut events);
        }
        demuxer.finish(&mut events);

        let units = units(&events);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].data, vec![1u8; 500]);
        assert_eq!(units[1].data, vec![2u8; 700]);
    }

    #[test]
    fn test_resyncs_after_garbage() {
        let mut builder = TsStreamBuilder::new();
        builder.raw(&[0xAB; 50]).program_tables().pes(&[7u8; 300], None);

        let mut demuxer = TsDemuxer::new();
        let mut events = Vec::new();
        demuxer.feed(&builder.into_bytes(), &mut events);
        demuxer.finish(&mut events);

        assert!(events
            .iter()
            .any(|e| matches!(e, DemuxEvent::Corrupt(FrameDecodeError::LostSync(50)))));
        assert_eq!(units(&events).len(), 1);
        assert_eq!(demuxer.stats().skipped_bytes, 50);
    }

    #[test]
    fn test_transport_error_drops_only_damaged_unit() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().pes(&[1u8; 600], None);
        let damaged = builder.packet_count() + 1;
        builder.pes(&[2u8; 600], None).pes(&[3u8; 600], None);
        builder.set_transport_error(damaged);

        let events = demux_all(&builder.into_bytes());
        let units = units(&events);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].data[0], 1);
        assert_eq!(units[1].data[0], 3);
        assert_eq!(corrupt_count(&events), 1);
    }

    #[test]
    fn test_damage_on_unselected_pid_is_ignored() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().pes(&[1u8; 300], None);
        let damaged = builder.packet_count();
        builder
            .packet_on(0x0101, &[0xEE; 40])
            .pes(&[2u8; 300], None);
        builder.set_transport_error(damaged);

        let events = demux_all(&builder.into_bytes());
        assert_eq!(units(&events).len(), 2);
        assert_eq!(corrupt_count(&events), 0);
    }

    #[test]
    fn test_continuity_gap_reported() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().pes(&[1u8; 600], None);
        let dropped = builder.packet_count() + 1;
        builder.pes(&[2u8; 600], None).pes(&[3u8; 100], None);
        builder.remove_packet(dropped);

        let events = demux_all(&builder.into_bytes());
        let data: Vec<u8> = units(&events).iter().map(|u| u.data[0]).collect();
        assert_eq!(data, vec![1, 3]);
        assert!(events.iter().any(|e| matches!(
            e,
            DemuxEvent::Corrupt(FrameDecodeError::CorruptPacket { reason, .. }) if reason.contains("continuity")
        )));
    }

    #[test]
    fn test_unbounded_pes_flushed_at_next_start_and_end() {
        let big = vec![9u8; 70_000];
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().pes(&big, None).pes(&[4u8; 10], None);

        let events = demux_all(&builder.into_bytes());
        let units = units(&events);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].data.len(), 70_000);
        assert_eq!(units[1].data, vec![4u8; 10]);
    }

    #[test]
    fn test_no_video_stream_in_pmt() {
        let mut builder = TsStreamBuilder::new().with_stream_type(0x0F);
        builder.program_tables().pes(&[1u8; 100], None);

        let events = demux_all(&builder.into_bytes());
        assert!(events.is_empty());
    }

    #[test]
    fn test_bad_pes_start_code_is_corrupt() {
        let mut builder = TsStreamBuilder::new();
        builder.program_tables().raw_video_packet(&[0xFF; 184]);

        let events = demux_all(&builder.into_bytes());
        assert_eq!(corrupt_count(&events), 1);
        assert!(units(&events).is_empty());
    }

    #[test]
    fn test_decode_timestamp() {
        // 0x1_0000_0001 split across the marker-bit layout
        let bytes = [0x29, 0x00, 0x01, 0x00, 0x03];
        assert_eq!(decode_timestamp(&bytes), (1 << 32) | 1);
    }
}
