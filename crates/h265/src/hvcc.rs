use bytes::{BufMut, Bytes, BytesMut};

/// Build an `HEVCDecoderConfigurationRecord` (ISO/IEC 14496-15 §8.3.3.1) from the
/// first observed VPS, SPS and PPS NAL units (each including their 2-byte NAL
/// header). Profile/tier/level fields are read from the SPS's `profile_tier_level()`,
/// which is byte-aligned immediately after the 1-byte
/// `sps_video_parameter_set_id/sps_max_sub_layers_minus1/sps_temporal_id_nesting_flag`
/// field.
pub fn build_hevc_decoder_configuration_record(
    vps_list: &[Bytes],
    sps_list: &[Bytes],
    pps_list: &[Bytes],
) -> Option<Bytes> {
    let sps = sps_list.first()?;
    // sps[0..2] = NAL header, sps[2] = vps_id/sublayers/nesting, sps[3..15] = general profile_tier_level.
    if sps.len() < 15 {
        return None;
    }
    let ptl = &sps[3..15];

    let mut buf = BytesMut::new();
    buf.put_u8(1); // configurationVersion
    buf.put_u8(ptl[0]); // general_profile_space/tier_flag/profile_idc
    buf.put_slice(&ptl[1..5]); // general_profile_compatibility_flags
    buf.put_slice(&ptl[5..11]); // general_constraint_indicator_flags
    buf.put_u8(ptl[11]); // general_level_idc
    buf.put_u16(0xF000); // reserved + min_spatial_segmentation_idc=0
    buf.put_u8(0xFC); // reserved + parallelismType=0
    buf.put_u8(0xFD); // reserved + chromaFormat=1 (4:2:0)
    buf.put_u8(0xF8); // reserved + bitDepthLumaMinus8=0
    buf.put_u8(0xF8); // reserved + bitDepthChromaMinus8=0
    buf.put_u16(0); // avgFrameRate=0 (unspecified)
    buf.put_u8(0x03); // constantFrameRate=0, numTemporalLayers=0, nested=0, lengthSizeMinusOne=3

    let arrays: [(u8, &[Bytes]); 3] = [(32, vps_list), (33, sps_list), (34, pps_list)];
    let populated: Vec<_> = arrays.into_iter().filter(|(_, nals)| !nals.is_empty()).collect();
    buf.put_u8(populated.len() as u8);
    for (nal_type, nals) in populated {
        buf.put_u8(0x80 | (nal_type & 0x3F)); // array_completeness=1
        buf.put_u16(nals.len() as u16);
        for nal in nals {
            buf.put_u16(nal.len() as u16);
            buf.put_slice(nal);
        }
    }

    Some(buf.freeze())
}
