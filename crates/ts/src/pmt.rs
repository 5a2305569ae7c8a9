use crate::{Result, TsError};
use bytes::{Buf, Bytes};

/// MPEG-2/ATSC stream_type values relevant to this pipeline, plus a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// 0x0F - ADTS AAC audio
    Aac,
    /// 0x1B - H.264/AVC video
    H264,
    /// 0x24 - H.265/HEVC video
    H265,
    /// 0x15 - ID3/timed metadata carried in PES
    Id3,
    /// 0x86 - SCTE-35 splice information
    Scte35,
    /// Any stream_type not handled by this pipeline.
    Other(u8),
}

impl From<u8> for StreamType {
    fn from(value: u8) -> Self {
        match value {
            0x0F => StreamType::Aac,
            0x1B => StreamType::H264,
            0x24 => StreamType::H265,
            0x15 => StreamType::Id3,
            0x86 => StreamType::Scte35,
            other => StreamType::Other(other),
        }
    }
}

impl From<StreamType> for u8 {
    fn from(value: StreamType) -> Self {
        match value {
            StreamType::Aac => 0x0F,
            StreamType::H264 => 0x1B,
            StreamType::H265 => 0x24,
            StreamType::Id3 => 0x15,
            StreamType::Scte35 => 0x86,
            StreamType::Other(v) => v,
        }
    }
}

impl StreamType {
    pub fn is_video(self) -> bool {
        matches!(self, StreamType::H264 | StreamType::H265)
    }

    pub fn is_audio(self) -> bool {
        matches!(self, StreamType::Aac)
    }
}

/// A single elementary stream entry in a Program Map Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: StreamType,
    pub elementary_pid: u16,
}

/// Owned, fully parsed Program Map Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    pub table_id: u8,
    pub program_number: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub pcr_pid: u16,
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// Parse a PMT from PSI section bytes (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(TsError::InsufficientData {
                expected: 12,
                actual: data.len(),
            });
        }
        let mut reader = data;
        let table_id = reader.get_u8();
        if table_id != 0x02 {
            return Err(TsError::InvalidTableId {
                expected: 0x02,
                actual: table_id,
            });
        }
        let byte1 = reader.get_u8();
        let section_syntax_indicator = (byte1 & 0x80) != 0;
        if !section_syntax_indicator {
            return Err(TsError::ParseError(
                "PMT must have section syntax indicator set".to_string(),
            ));
        }
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 13 {
            return Err(TsError::InvalidSectionLength(section_length));
        }
        if data.len() < (3 + section_length as usize) {
            return Err(TsError::InsufficientData {
                expected: 3 + section_length as usize,
                actual: data.len(),
            });
        }
        let program_number = reader.get_u16();
        let byte5 = reader.get_u8();
        let version_number = (byte5 >> 1) & 0x1F;
        let current_next_indicator = (byte5 & 0x01) != 0;
        let section_number = reader.get_u8();
        let last_section_number = reader.get_u8();
        let pcr_pid_high = reader.get_u8();
        let pcr_pid_low = reader.get_u8();
        let pcr_pid = ((pcr_pid_high as u16 & 0x1F) << 8) | pcr_pid_low as u16;

        let prog_info_len_high = reader.get_u8();
        let prog_info_len_low = reader.get_u8();
        let program_info_length =
            (((prog_info_len_high as u16) & 0x0F) << 8) | prog_info_len_low as u16;
        let program_info_length = program_info_length as usize;

        if (section_length as usize) < 9 + program_info_length + 4 {
            return Err(TsError::InvalidSectionLength(section_length));
        }

        let streams_offset = 12 + program_info_length;
        let streams_end = 3 + section_length as usize - 4; // exclude CRC32

        let mut streams = Vec::new();
        let mut cursor = &data[streams_offset..streams_end];
        while cursor.remaining() >= 5 {
            let stream_type = StreamType::from(cursor.get_u8());
            let elementary_pid = ((cursor.get_u8() as u16 & 0x1F) << 8) | cursor.get_u8() as u16;
            let es_info_length =
                (((cursor.get_u8() as u16) & 0x0F) << 8) | cursor.get_u8() as u16;
            let es_info_length = es_info_length as usize;
            if cursor.remaining() < es_info_length {
                return Err(TsError::InsufficientData {
                    expected: es_info_length,
                    actual: cursor.remaining(),
                });
            }
            cursor.advance(es_info_length);
            streams.push(PmtStream {
                stream_type,
                elementary_pid,
            });
        }

        Ok(Pmt {
            table_id,
            program_number,
            version_number,
            current_next_indicator,
            section_number,
            last_section_number,
            pcr_pid,
            streams,
        })
    }

    /// Parse a PMT and validate the trailing CRC-32/MPEG-2 checksum.
    pub fn parse_with_crc(data: &[u8]) -> Result<Self> {
        if data.len() >= 7 {
            let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;
            let section_end = 3 + section_length as usize;
            if section_end <= data.len() && !crate::crc32::validate_section_crc32(&data[..section_end]) {
                let stored = u32::from_be_bytes([
                    data[section_end - 4],
                    data[section_end - 3],
                    data[section_end - 2],
                    data[section_end - 1],
                ]);
                let calculated = crate::crc32::mpeg2_crc32(&data[..section_end - 4]);
                return Err(TsError::Crc32Mismatch {
                    expected: stored,
                    calculated,
                });
            }
        }
        Self::parse(data)
    }

    pub fn video_stream(&self) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.stream_type.is_video())
    }

    pub fn audio_stream(&self) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.stream_type.is_audio())
    }

    pub fn stream_for_pid(&self, pid: u16) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.elementary_pid == pid)
    }
}

/// Build the PSI section bytes (table through CRC-32) for a PMT, for re-packetization.
pub fn build_pmt_section(program_number: u16, pcr_pid: u16, streams: &[PmtStream]) -> Bytes {
    let mut buf = Vec::with_capacity(12 + streams.len() * 5 + 4);
    let section_length = 9 + streams.len() * 5 + 4; // from program_number through CRC32

    buf.push(0x02); // table_id
    buf.push(0x80 | ((section_length >> 8) as u8 & 0x0F));
    buf.push((section_length & 0xFF) as u8);
    buf.extend_from_slice(&program_number.to_be_bytes());
    buf.push(0xC1); // reserved=11, version=0, current_next=1
    buf.push(0x00); // section_number
    buf.push(0x00); // last_section_number
    buf.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
    buf.push((pcr_pid & 0xFF) as u8);
    buf.push(0xF0); // reserved=1111, program_info_length high nibble = 0
    buf.push(0x00); // program_info_length low byte = 0
    for s in streams {
        buf.push(u8::from(s.stream_type));
        buf.push(0xE0 | ((s.elementary_pid >> 8) as u8 & 0x1F));
        buf.push((s.elementary_pid & 0xFF) as u8);
        buf.push(0xF0); // reserved=1111, ES_info_length high nibble = 0
        buf.push(0x00); // ES_info_length low byte = 0
    }
    let crc = crate::crc32::mpeg2_crc32(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Bytes::from(buf)
}
