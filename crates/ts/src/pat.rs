use crate::{Result, TsError};
use bytes::{Buf, Bytes};

/// A single program entry in a Program Association Table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Owned, fully parsed Program Association Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// Parse a PAT from PSI section bytes (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(TsError::InsufficientData {
                expected: 8,
                actual: data.len(),
            });
        }
        let mut reader = data;
        let table_id = reader.get_u8();
        if table_id != 0x00 {
            return Err(TsError::InvalidTableId {
                expected: 0x00,
                actual: table_id,
            });
        }
        let byte1 = reader.get_u8();
        let section_syntax_indicator = (byte1 & 0x80) != 0;
        if !section_syntax_indicator {
            return Err(TsError::ParseError(
                "PAT must have section syntax indicator set".to_string(),
            ));
        }
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 9 {
            return Err(TsError::InvalidSectionLength(section_length));
        }
        if data.len() < (3 + section_length as usize) {
            return Err(TsError::InsufficientData {
                expected: 3 + section_length as usize,
                actual: data.len(),
            });
        }
        let transport_stream_id = reader.get_u16();
        let byte5 = reader.get_u8();
        let version_number = (byte5 >> 1) & 0x1F;
        let current_next_indicator = (byte5 & 0x01) != 0;
        let section_number = reader.get_u8();
        let last_section_number = reader.get_u8();

        let programs_end = 3 + section_length as usize - 4; // exclude CRC32
        let mut programs = Vec::new();
        let mut cursor = &data[8..programs_end];
        while cursor.remaining() >= 4 {
            let program_number = cursor.get_u16();
            let pmt_pid = ((cursor.get_u8() as u16 & 0x1F) << 8) | cursor.get_u8() as u16;
            programs.push(PatProgram {
                program_number,
                pmt_pid,
            });
        }

        Ok(Pat {
            table_id,
            transport_stream_id,
            version_number,
            current_next_indicator,
            section_number,
            last_section_number,
            programs,
        })
    }

    /// Parse a PAT and validate the trailing CRC-32/MPEG-2 checksum.
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

    /// Look up the PMT PID for a given program number.
    pub fn pmt_pid_for(&self, program_number: u16) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.program_number == program_number)
            .map(|p| p.pmt_pid)
    }

    /// The first program with a non-zero program number (network PID entries use 0).
    pub fn first_program(&self) -> Option<PatProgram> {
        self.programs.iter().copied().find(|p| p.program_number != 0)
    }
}

/// Build the PSI section bytes (table through CRC-32) for a PAT, for re-packetization.
pub fn build_pat_section(transport_stream_id: u16, programs: &[PatProgram]) -> Bytes {
    let mut buf = Vec::with_capacity(8 + programs.len() * 4 + 4);
    let section_length = 5 + programs.len() * 4 + 4; // from transport_stream_id through CRC32

    buf.push(0x00); // table_id
    buf.push(0x80 | ((section_length >> 8) as u8 & 0x0F)); // section_syntax_indicator=1, reserved=11
    buf.push((section_length & 0xFF) as u8);
    buf.extend_from_slice(&transport_stream_id.to_be_bytes());
    buf.push(0xC1); // reserved=11, version=0, current_next=1
    buf.push(0x00); // section_number
    buf.push(0x00); // last_section_number
    for p in programs {
        buf.extend_from_slice(&p.program_number.to_be_bytes());
        buf.push(0xE0 | ((p.pmt_pid >> 8) as u8 & 0x1F));
        buf.push((p.pmt_pid & 0xFF) as u8);
    }
    let crc = crate::crc32::mpeg2_crc32(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_program() {
        let programs = vec![PatProgram {
            program_number: 1,
            pmt_pid: 0x100,
        }];
        let section = build_pat_section(1, &programs);
        let pat = Pat::parse(&section).unwrap();
        assert_eq!(pat.transport_stream_id, 1);
        assert_eq!(pat.programs, programs);
        assert_eq!(pat.pmt_pid_for(1), Some(0x100));
    }

    #[test]
    fn rejects_wrong_table_id() {
        let mut section = build_pat_section(1, &[]).to_vec();
        section[0] = 0x01;
        assert!(matches!(
            Pat::parse(&section),
            Err(TsError::InvalidTableId { .. })
        ));
    }

    #[test]
    fn passes_crc_validation() {
        let programs = vec![PatProgram {
            program_number: 2,
            pmt_pid: 0x200,
        }];
        let section = build_pat_section(7, &programs);
        assert!(Pat::parse_with_crc(&section).is_ok());
    }
}
