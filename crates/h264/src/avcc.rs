use bytes::{BufMut, Bytes, BytesMut};

/// Build an `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15 §5.2.4.1) from the
/// first observed SPS and PPS NAL units (each including their 1-byte NAL header).
pub fn build_avc_decoder_configuration_record(sps_list: &[Bytes], pps_list: &[Bytes]) -> Option<Bytes> {
    let sps = sps_list.first()?;
    if sps.len() < 4 {
        return None;
    }

    let mut buf = BytesMut::new();
    buf.put_u8(1); // configurationVersion
    buf.put_u8(sps[1]); // AVCProfileIndication
    buf.put_u8(sps[2]); // profile_compatibility
    buf.put_u8(sps[3]); // AVCLevelIndication
    buf.put_u8(0xFF); // reserved(6)=111111, lengthSizeMinusOne=11 (4-byte lengths)

    buf.put_u8(0xE0 | (sps_list.len() as u8 & 0x1F));
    for sps in sps_list {
        buf.put_u16(sps.len() as u16);
        buf.put_slice(sps);
    }

    buf.put_u8(pps_list.len() as u8);
    for pps in pps_list {
        buf.put_u16(pps.len() as u16);
        buf.put_slice(pps);
    }

    Some(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_record_from_single_sps_pps() {
        let sps = Bytes::from_static(&[0x67, 0x42, 0x00, 0x1F, 0xAA, 0xBB]);
        let pps = Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80]);
        let record = build_avc_decoder_configuration_record(&[sps.clone()], &[pps.clone()]).unwrap();
        assert_eq!(record[0], 1);
        assert_eq!(record[1], 0x42); // profile
        assert_eq!(record[2], 0x00);
        assert_eq!(record[3], 0x1F); // level
        assert_eq!(record[4], 0xFF);
        assert_eq!(record[5], 0xE1); // 1 SPS
        let sps_len = u16::from_be_bytes([record[6], record[7]]) as usize;
        assert_eq!(sps_len, sps.len());
        assert_eq!(&record[8..8 + sps_len], &sps[..]);
    }

    #[test]
    fn returns_none_without_sps() {
        assert!(build_avc_decoder_configuration_record(&[], &[]).is_none());
    }
}
