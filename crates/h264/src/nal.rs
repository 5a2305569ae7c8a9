/// NAL unit types relevant to access-unit assembly, per ISO/IEC 14496-10 Table 7-1.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    Unspecified = 0,
    NonIdrSlice = 1,
    PartitionA = 2,
    PartitionB = 3,
    PartitionC = 4,
    IdrSlice = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    AccessUnitDelimiter = 9,
    EndOfSequence = 10,
    EndOfStream = 11,
    FillerData = 12,
    SpsExtension = 13,
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            0 => NalUnitType::Unspecified,
            1 => NalUnitType::NonIdrSlice,
            2 => NalUnitType::PartitionA,
            3 => NalUnitType::PartitionB,
            4 => NalUnitType::PartitionC,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            13 => NalUnitType::SpsExtension,
            other => NalUnitType::Other(other),
        }
    }
}

impl NalUnitType {
    pub fn is_slice(self) -> bool {
        matches!(
            self,
            NalUnitType::NonIdrSlice
                | NalUnitType::IdrSlice
                | NalUnitType::PartitionA
                | NalUnitType::PartitionB
                | NalUnitType::PartitionC
        )
    }

    pub fn is_idr(self) -> bool {
        matches!(self, NalUnitType::IdrSlice)
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NalUnitType::Sps | NalUnitType::Pps)
    }

    /// AUD and SEI are informational and dropped from the muxed sample content.
    pub fn is_dropped(self) -> bool {
        matches!(self, NalUnitType::AccessUnitDelimiter | NalUnitType::Sei)
    }
}

fn nal_unit_type(nal: &[u8]) -> NalUnitType {
    nal.first().map(|&b| NalUnitType::from(b)).unwrap_or(NalUnitType::Unspecified)
}

/// Split an Annex B byte stream (one or more `00 00 01`/`00 00 00 01`-prefixed NAL
/// units) into `(NalUnitType, EBSP slice)` pairs, in stream order. Empty runs
/// between consecutive start codes are dropped.
pub fn split_nal_units(data: &[u8]) -> Vec<(NalUnitType, &[u8])> {
    let starts = find_start_codes(data);
    let mut out = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let (start, code_len) = starts[i];
        let nal_start = start + code_len;
        let nal_end = if i + 1 < starts.len() {
            starts[i + 1].0
        } else {
            data.len()
        };
        if nal_start >= nal_end {
            continue;
        }
        let nal = &data[nal_start..nal_end];
        out.push((nal_unit_type(nal), nal));
    }
    out
}

/// Returns `(offset, start_code_length)` for every start code found in `data`.
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                out.push((i, 3));
                i += 3;
                continue;
            } else if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                out.push((i, 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_nal_units() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
            0x00, 0x00, 0x01, 0x67, 0xAA, 0xBB, // SPS
            0x00, 0x00, 0x01, 0x65, 0xCC, // IDR slice
        ];
        let nals = split_nal_units(&data);
        assert_eq!(nals.len(), 3);
        assert_eq!(nals[0].0, NalUnitType::AccessUnitDelimiter);
        assert_eq!(nals[1].0, NalUnitType::Sps);
        assert_eq!(nals[2].0, NalUnitType::IdrSlice);
        assert!(nals[2].0.is_idr());
    }

    #[test]
    fn ignores_empty_runs_between_start_codes() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x67, 0xAA];
        let nals = split_nal_units(&data);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].0, NalUnitType::Sps);
    }
}
