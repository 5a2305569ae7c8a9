/// NAL unit types relevant to access-unit assembly, per ITU-T H.265 Table 7-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    IdrWRadl,
    IdrNLp,
    CraNut,
    NonIdrSlice(u8),
    Vps,
    Sps,
    Pps,
    AccessUnitDelimiter,
    SeiPrefix,
    SeiSuffix,
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            19 => NalUnitType::IdrWRadl,
            20 => NalUnitType::IdrNLp,
            21 => NalUnitType::CraNut,
            0..=9 | 16..=18 => NalUnitType::NonIdrSlice(value),
            32 => NalUnitType::Vps,
            33 => NalUnitType::Sps,
            34 => NalUnitType::Pps,
            35 => NalUnitType::AccessUnitDelimiter,
            39 => NalUnitType::SeiPrefix,
            40 => NalUnitType::SeiSuffix,
            other => NalUnitType::Other(other),
        }
    }
}

impl NalUnitType {
    pub fn is_idr(self) -> bool {
        matches!(
            self,
            NalUnitType::IdrWRadl | NalUnitType::IdrNLp | NalUnitType::CraNut
        )
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NalUnitType::Vps | NalUnitType::Sps | NalUnitType::Pps)
    }

    pub fn is_dropped(self) -> bool {
        matches!(
            self,
            NalUnitType::AccessUnitDelimiter | NalUnitType::SeiPrefix | NalUnitType::SeiSuffix
        )
    }
}

fn nal_unit_type(nal: &[u8]) -> NalUnitType {
    nal.first()
        .map(|&b| NalUnitType::from((b >> 1) & 0x3F))
        .unwrap_or(NalUnitType::Other(0))
}

/// Split an Annex B byte stream into `(NalUnitType, EBSP slice including the 2-byte
/// NAL header)` pairs, in stream order.
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
    fn classifies_vps_sps_pps_and_idr() {
        let data = [
            0x00, 0x00, 0x00, 0x01, (32 << 1), 0x01, // VPS
            0x00, 0x00, 0x01, (33 << 1), 0x01, // SPS
            0x00, 0x00, 0x01, (34 << 1), 0x01, // PPS
            0x00, 0x00, 0x01, (19 << 1), 0x01, // IDR_W_RADL
        ];
        let nals = split_nal_units(&data);
        assert_eq!(nals.len(), 4);
        assert_eq!(nals[0].0, NalUnitType::Vps);
        assert_eq!(nals[1].0, NalUnitType::Sps);
        assert_eq!(nals[2].0, NalUnitType::Pps);
        assert!(nals[3].0.is_idr());
    }
}
