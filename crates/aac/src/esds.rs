/// Build the 2-byte `AudioSpecificConfig` (ISO/IEC 14496-3) carried inside an
/// `esds` box, from the ADTS header fields of the first observed frame.
///
/// `profile` is the ADTS `profile` field (MPEG-4 audio object type minus one for
/// the common AAC-LC case); `sampling_frequency_index` and `channel_configuration`
/// are the raw ADTS header fields.
pub fn build_audio_specific_config(
    profile: u8,
    sampling_frequency_index: u8,
    channel_configuration: u8,
) -> [u8; 2] {
    [
        ((profile + 1) << 3) | (sampling_frequency_index >> 1),
        ((sampling_frequency_index & 0x01) << 7) | (channel_configuration << 3),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_config_for_aac_lc_44100_stereo() {
        // AAC-LC (profile=1 -> audioObjectType=2), 44100Hz (index=4), stereo (2)
        let config = build_audio_specific_config(1, 4, 2);
        assert_eq!(config, [0x12, 0x10]);
    }
}
