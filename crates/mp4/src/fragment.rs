use bytes::{BufMut, Bytes, BytesMut};

use crate::boxes::{boxed, concat};

const TFHD_FLAG_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

const TRUN_FLAG_DATA_OFFSET_PRESENT: u32 = 0x00_0001;
const TRUN_FLAG_SAMPLE_DURATION_PRESENT: u32 = 0x00_0100;
const TRUN_FLAG_SAMPLE_SIZE_PRESENT: u32 = 0x00_0200;
const TRUN_FLAG_SAMPLE_FLAGS_PRESENT: u32 = 0x00_0400;
const TRUN_FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x00_0800;

/// `sample_flags` for a sync sample (keyframe): does not depend on other samples.
const SAMPLE_FLAGS_SYNC: u32 = 0x0200_0000;
/// `sample_flags` for a non-sync sample: depends on others, not itself depended on.
const SAMPLE_FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// One coded access unit (a video frame, or one ADTS/AAC frame) destined for a
/// single-sample `moof`+`mdat` fragment.
#[derive(Debug, Clone)]
pub struct FragmentSample {
    pub track_id: u32,
    pub sequence_number: u32,
    /// Decode timestamp in the track's 90kHz timescale, used for `tfdt`.
    pub decode_time: u64,
    pub duration: u32,
    pub is_sync: bool,
    /// PTS - DTS, in 90kHz ticks; zero for audio.
    pub composition_time_offset: i32,
    pub data: Bytes,
}

/// Build `moof | mdat` for a single access unit.
pub fn build_media_fragment(sample: &FragmentSample) -> Bytes {
    let mfhd = build_mfhd(sample.sequence_number);
    let traf = build_traf(sample);
    let moof = boxed(b"moof", |b| b.put_slice(&concat(&[mfhd, traf])));
    let mdat = boxed(b"mdat", |b| b.put_slice(&sample.data));
    concat(&[moof, mdat])
}

fn build_mfhd(sequence_number: u32) -> Bytes {
    boxed(b"mfhd", |b| {
        b.put_u32(0); // version + flags
        b.put_u32(sequence_number);
    })
}

fn build_traf(sample: &FragmentSample) -> Bytes {
    let tfhd = build_tfhd(sample.track_id);
    let tfdt = build_tfdt(sample.decode_time);
    let trun = build_trun(sample);
    boxed(b"traf", |b| b.put_slice(&concat(&[tfhd, tfdt, trun])))
}

fn build_tfhd(track_id: u32) -> Bytes {
    boxed(b"tfhd", |b| {
        b.put_u8(0); // version
        b.put_uint(TFHD_FLAG_DEFAULT_BASE_IS_MOOF as u64, 3);
        b.put_u32(track_id);
    })
}

fn build_tfdt(decode_time: u64) -> Bytes {
    boxed(b"tfdt", |b| {
        b.put_u8(1); // version 1: 64-bit base_media_decode_time
        b.put_slice(&[0, 0, 0]);
        b.put_u64(decode_time);
    })
}

fn build_trun(sample: &FragmentSample) -> Bytes {
    let flags = TRUN_FLAG_DATA_OFFSET_PRESENT
        | TRUN_FLAG_SAMPLE_DURATION_PRESENT
        | TRUN_FLAG_SAMPLE_SIZE_PRESENT
        | TRUN_FLAG_SAMPLE_FLAGS_PRESENT
        | TRUN_FLAG_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT;

    boxed(b"trun", |b| {
        b.put_u8(1); // version 1: signed composition time offsets
        b.put_uint(flags as u64, 3);
        b.put_u32(1); // sample_count

        // data_offset: bytes from the start of this moof to the first sample
        // byte in the following mdat. Fixed: this trun is the only one in the
        // moof, so it's moof_size(unknown yet) + mdat header(8).
        let data_offset_placeholder = 0i32;
        b.put_i32(data_offset_placeholder);

        b.put_u32(sample.duration);
        b.put_u32(sample.data.len() as u32);
        b.put_u32(if sample.is_sync {
            SAMPLE_FLAGS_SYNC
        } else {
            SAMPLE_FLAGS_NON_SYNC
        });
        b.put_i32(sample.composition_time_offset);
    })
}

/// Patch the `trun` `data_offset` field in-place now that the enclosing
/// `moof` box's total size is known (it is written before `mdat` in the byte
/// stream, so the offset can't be computed until after `build_trun` runs).
pub fn fix_up_data_offset(fragment: &mut BytesMut, moof_len: usize) {
    let trun_offset = find_box_offset(fragment, b"trun").expect("fragment always has a trun");
    // trun body starts 8 bytes in (size+fourcc); version+flags(4) + sample_count(4) = 8.
    let data_offset_field = trun_offset + 8 + 8;
    let data_offset = (moof_len + 8) as i32; // + mdat header
    fragment[data_offset_field..data_offset_field + 4]
        .copy_from_slice(&data_offset.to_be_bytes());
}

fn find_box_offset(data: &[u8], fourcc: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == fourcc).map(|pos| pos - 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FragmentSample {
        FragmentSample {
            track_id: 1,
            sequence_number: 7,
            decode_time: 12_345,
            duration: 3000,
            is_sync: true,
            composition_time_offset: 600,
            data: Bytes::from_static(&[0xAA, 0xBB, 0xCC, 0xDD]),
        }
    }

    #[test]
    fn builds_moof_and_mdat() {
        let fragment = build_media_fragment(&sample());
        assert_eq!(&fragment[4..8], b"moof");
        assert!(fragment.windows(4).any(|w| w == b"mfhd"));
        assert!(fragment.windows(4).any(|w| w == b"traf"));
        assert!(fragment.windows(4).any(|w| w == b"tfhd"));
        assert!(fragment.windows(4).any(|w| w == b"tfdt"));
        assert!(fragment.windows(4).any(|w| w == b"trun"));
        assert!(fragment.windows(4).any(|w| w == b"mdat"));
        assert!(fragment.windows(4).any(|w| w == [0xAA, 0xBB, 0xCC, 0xDD]));
    }

    #[test]
    fn fix_up_data_offset_points_past_moof_and_mdat_header() {
        let fragment = build_media_fragment(&sample());
        let moof_len = fragment.windows(4).position(|w| w == b"mdat").unwrap() - 4;
        let mut buf = BytesMut::from(&fragment[..]);
        fix_up_data_offset(&mut buf, moof_len);
        let trun_offset = find_box_offset(&buf, b"trun").unwrap();
        let data_offset_field = trun_offset + 16;
        let value = i32::from_be_bytes(
            buf[data_offset_field..data_offset_field + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(value, (moof_len + 8) as i32);
    }
}
