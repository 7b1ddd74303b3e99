//! Program-specific information: PAT and PMT sections

pub const PAT_PID: u16 = 0x0000;
pub const NULL_PID: u16 = 0x1FFF;
pub const PAT_TABLE_ID: u8 = 0x00;
pub const PMT_TABLE_ID: u8 = 0x02;

/// Long section header bytes between `section_length` and the table body
const SECTION_HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;

/// CRC-32/MPEG-2 as used by PSI sections
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

/// A CRC-checked long-form section
#[derive(Debug)]
pub struct Section<'a> {
    pub table_id: u8,
    /// Table-specific bytes after the 8-byte header, without the CRC
    pub body: &'a [u8],
}

/// Extract the section starting a packet payload (payload-unit-start set).
///
/// Sections spanning several packets are not reassembled; program tables of
/// a single-program stream fit in one packet.
pub fn parse_section(payload: &[u8]) -> Result<Section<'_>, String> {
    let pointer = *payload.first().ok_or("empty PSI payload")? as usize;
    let section = payload
        .get(1 + pointer..)
        .ok_or("pointer field past end of payload")?;

    if section.len() < 3 {
        return Err("truncated section header".to_string());
    }
    let table_id = section[0];
    if section[1] & 0x80 == 0 {
        return Err(format!("table 0x{:02x} lacks section syntax", table_id));
    }

    let section_length = (usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]);
    let total = 3 + section_length;
    if total > section.len() {
        return Err(format!(
            "section spans {} bytes but only {} available",
            total,
            section.len()
        ));
    }
    if total < SECTION_HEADER_LEN + CRC_LEN {
        return Err(format!("section length {} too short", section_length));
    }

    let (covered, crc_bytes) = section[..total].split_at(total - CRC_LEN);
    let expected = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let actual = crc32_mpeg2(covered);
    if expected != actual {
        return Err(format!(
            "CRC mismatch on table 0x{:02x}: expected {:08x}, computed {:08x}",
            table_id, expected, actual
        ));
    }

    Ok(Section {
        table_id,
        body: &covered[SECTION_HEADER_LEN..],
    })
}

pub fn parse_pat(section: &Section<'_>) -> Result<Vec<PatEntry>, String> {
    if section.table_id != PAT_TABLE_ID {
        return Err(format!("expected PAT, found table 0x{:02x}", section.table_id));
    }

    Ok(section
        .body
        .chunks_exact(4)
        .map(|entry| PatEntry {
            program_number: u16::from_be_bytes([entry[0], entry[1]]),
            pmt_pid: (u16::from(entry[2] & 0x1F) << 8) | u16::from(entry[3]),
        })
        .collect())
}

pub fn parse_pmt(section: &Section<'_>) -> Result<Vec<PmtStream>, String> {
    if section.table_id != PMT_TABLE_ID {
        return Err(format!("expected PMT, found table 0x{:02x}", section.table_id));
    }

    let body = section.body;
    if body.len() < 4 {
        return Err("truncated PMT header".to_string());
    }
    let program_info_length = (usize::from(body[2] & 0x0F) << 8) | usize::from(body[3]);
    let mut rest = body
        .get(4 + program_info_length..)
        .ok_or("program info runs past section")?;

    let mut streams = Vec::new();
    while rest.len() >= 5 {
        let stream_type = rest[0];
        let pid = (u16::from(rest[1] & 0x1F) << 8) | u16::from(rest[2]);
        let es_info_length = (usize::from(rest[3] & 0x0F) << 8) | usize::from(rest[4]);
        streams.push(PmtStream { stream_type, pid });
        rest = rest
            .get(5 + es_info_length..)
            .ok_or("elementary stream info runs past section")?;
    }

    Ok(streams)
}
