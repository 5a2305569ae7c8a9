use bytes::{BufMut, Bytes, BytesMut};

use crate::boxes::{boxed, concat};

/// MPEG-TS and fMP4 both run their track timescale at the TS clock rate.
pub const TRACK_TIMESCALE: u32 = 90_000;

/// Codec-specific sample description payload for a video track.
#[derive(Debug, Clone)]
pub enum VideoCodec {
    Avc { avcc: Bytes },
    Hevc { hvcc: Bytes },
}

#[derive(Debug, Clone)]
pub struct VideoTrackConfig {
    pub codec: VideoCodec,
    /// Pixel dimensions for the `tkhd`/sample entry. `0x0` if not yet known.
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone)]
pub struct AudioTrackConfig {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub audio_specific_config: [u8; 2],
}

/// Which tracks are configured for this init segment, in the track-id order
/// they will be assigned (video=1, audio=2 if both present).
#[derive(Debug, Clone, Default)]
pub struct InitSegmentConfig {
    pub video: Option<VideoTrackConfig>,
    pub audio: Option<AudioTrackConfig>,
}

impl InitSegmentConfig {
    pub fn is_complete(&self, expect_video: bool, expect_audio: bool) -> bool {
        (!expect_video || self.video.is_some()) && (!expect_audio || self.audio.is_some())
    }

    fn video_track_id(&self) -> Option<u32> {
        self.video.as_ref().map(|_| 1)
    }

    fn audio_track_id(&self) -> u32 {
        if self.video.is_some() { 2 } else { 1 }
    }
}

/// Build `ftyp | moov(mvhd | mvex(trex...) | trak...)`.
pub fn build_init_segment(config: &InitSegmentConfig) -> Bytes {
    let ftyp = build_ftyp();

    let track_count = config.video.is_some() as u32 + config.audio.is_some() as u32;
    let mut traks = Vec::new();
    let mut trexs = Vec::new();

    if let Some(video) = &config.video {
        let track_id = config.video_track_id().unwrap();
        trexs.push(build_trex(track_id));
        traks.push(build_video_trak(track_id, video));
    }
    if let Some(audio) = &config.audio {
        let track_id = config.audio_track_id();
        trexs.push(build_trex(track_id));
        traks.push(build_audio_trak(track_id, audio));
    }

    let mvex = boxed(b"mvex", |b| b.put_slice(&concat(&trexs)));
    let mvhd = build_mvhd(track_count + 1);

    let mut moov_body = Vec::new();
    moov_body.push(mvhd);
    moov_body.push(mvex);
    moov_body.extend(traks);

    let moov = boxed(b"moov", |b| b.put_slice(&concat(&moov_body)));

    concat(&[ftyp, moov])
}

fn build_ftyp() -> Bytes {
    boxed(b"ftyp", |b| {
        b.put_slice(b"iso5");
        b.put_u32(0);
        b.put_slice(b"iso5");
        b.put_slice(b"iso6");
        b.put_slice(b"mp41");
    })
}

fn identity_matrix(buf: &mut BytesMut) {
    const MATRIX: [i32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];
    for v in MATRIX {
        buf.put_i32(v);
    }
}

fn build_mvhd(next_track_id: u32) -> Bytes {
    boxed(b"mvhd", |b| {
        b.put_u8(0); // version
        b.put_slice(&[0, 0, 0]); // flags
        b.put_u32(0); // creation_time
        b.put_u32(0); // modification_time
        b.put_u32(TRACK_TIMESCALE);
        b.put_u32(0); // duration (unknown, fragmented)
        b.put_i32(0x0001_0000); // rate = 1.0
        b.put_i16(0x0100); // volume = 1.0
        b.put_u16(0); // reserved
        b.put_u64(0); // reserved[2]
        identity_matrix(b);
        for _ in 0..6 {
            b.put_u32(0); // pre_defined
        }
        b.put_u32(next_track_id);
    })
}

fn build_trex(track_id: u32) -> Bytes {
    boxed(b"trex", |b| {
        b.put_u32(0); // version+flags
        b.put_u32(track_id);
        b.put_u32(1); // default_sample_description_index
        b.put_u32(0); // default_sample_duration
        b.put_u32(0); // default_sample_size
        b.put_u32(0); // default_sample_flags
    })
}

fn build_tkhd(track_id: u32, width: u16, height: u16, is_audio: bool) -> Bytes {
    boxed(b"tkhd", |b| {
        b.put_u8(0);
        b.put_slice(&[0, 0, 0x07]); // flags: enabled | in_movie | in_preview
        b.put_u32(0); // creation_time
        b.put_u32(0); // modification_time
        b.put_u32(track_id);
        b.put_u32(0); // reserved
        b.put_u32(0); // duration
        b.put_u64(0); // reserved
        b.put_i16(0); // layer
        b.put_i16(0); // alternate_group
        b.put_i16(if is_audio { 0x0100 } else { 0 }); // volume
        b.put_u16(0); // reserved
        identity_matrix(b);
        b.put_u32((width as u32) << 16);
        b.put_u32((height as u32) << 16);
    })
}

fn build_hdlr(handler_type: &[u8; 4], name: &str) -> Bytes {
    boxed(b"hdlr", |b| {
        b.put_u32(0); // version+flags
        b.put_u32(0); // pre_defined
        b.put_slice(handler_type);
        b.put_slice(&[0u8; 12]); // reserved
        b.put_slice(name.as_bytes());
        b.put_u8(0);
    })
}

fn build_mdhd() -> Bytes {
    boxed(b"mdhd", |b| {
        b.put_u32(0); // version+flags
        b.put_u32(0); // creation_time
        b.put_u32(0); // modification_time
        b.put_u32(TRACK_TIMESCALE);
        b.put_u32(0); // duration
        b.put_u16(0x55C4); // language = "und"
        b.put_u16(0); // pre_defined
    })
}

fn build_dinf() -> Bytes {
    let url = boxed(b"url ", |b| b.put_slice(&[0, 0, 0, 1]));
    let dref = boxed(b"dref", |b| {
        b.put_u32(0);
        b.put_u32(1);
        b.put_slice(&url);
    });
    boxed(b"dinf", |b| b.put_slice(&dref))
}

fn build_stbl(sample_entry: Bytes) -> Bytes {
    let stsd = boxed(b"stsd", |b| {
        b.put_u32(0);
        b.put_u32(1);
        b.put_slice(&sample_entry);
    });
    let stts = boxed(b"stts", |b| {
        b.put_u32(0);
        b.put_u32(0);
    });
    let stsc = boxed(b"stsc", |b| {
        b.put_u32(0);
        b.put_u32(0);
    });
    let stsz = boxed(b"stsz", |b| {
        b.put_u32(0);
        b.put_u32(0);
        b.put_u32(0);
    });
    let stco = boxed(b"stco", |b| {
        b.put_u32(0);
        b.put_u32(0);
    });
    boxed(b"stbl", |b| b.put_slice(&concat(&[stsd, stts, stsc, stsz, stco])))
}

fn build_video_sample_entry(codec: &VideoCodec, width: u16, height: u16) -> Bytes {
    let (fourcc, config_box): (&[u8; 4], Bytes) = match codec {
        VideoCodec::Avc { avcc } => (b"avc1", boxed(b"avcC", |b| b.put_slice(avcc))),
        VideoCodec::Hevc { hvcc } => (b"hvc1", boxed(b"hvcC", |b| b.put_slice(hvcc))),
    };

    boxed(fourcc, |b| {
        b.put_slice(&[0u8; 6]); // reserved
        b.put_u16(1); // data_reference_index
        b.put_u16(0); // pre_defined
        b.put_u16(0); // reserved
        b.put_slice(&[0u8; 12]); // pre_defined
        b.put_u16(width);
        b.put_u16(height);
        b.put_u32(0x0048_0000); // horizresolution = 72 dpi
        b.put_u32(0x0048_0000); // vertresolution
        b.put_u32(0); // reserved
        b.put_u16(1); // frame_count
        b.put_slice(&[0u8; 32]); // compressorname
        b.put_u16(0x0018); // depth
        b.put_i16(-1); // pre_defined
        b.put_slice(&config_box);
    })
}

fn build_audio_sample_entry(config: &AudioTrackConfig) -> Bytes {
    let esds = crate::esds::build_esds(&config.audio_specific_config);
    boxed(b"mp4a", |b| {
        b.put_slice(&[0u8; 6]); // reserved
        b.put_u16(1); // data_reference_index
        b.put_u64(0); // reserved (version/revision/vendor)
        b.put_u16(config.channel_count);
        b.put_u16(16); // samplesize
        b.put_u16(0); // pre_defined
        b.put_u16(0); // reserved
        b.put_u32(config.sample_rate << 16);
        b.put_slice(&esds);
    })
}

fn build_video_trak(track_id: u32, config: &VideoTrackConfig) -> Bytes {
    let tkhd = build_tkhd(track_id, config.width, config.height, false);
    let mdhd = build_mdhd();
    let hdlr = build_hdlr(b"vide", "VideoHandler");
    let vmhd = boxed(b"vmhd", |b| {
        b.put_u32(1); // version 0, flags 1
        b.put_u64(0);
    });
    let dinf = build_dinf();
    let sample_entry = build_video_sample_entry(&config.codec, config.width, config.height);
    let stbl = build_stbl(sample_entry);
    let minf = boxed(b"minf", |b| b.put_slice(&concat(&[vmhd, dinf, stbl])));
    let mdia = boxed(b"mdia", |b| b.put_slice(&concat(&[mdhd, hdlr, minf])));
    boxed(b"trak", |b| b.put_slice(&concat(&[tkhd, mdia])))
}

fn build_audio_trak(track_id: u32, config: &AudioTrackConfig) -> Bytes {
    let tkhd = build_tkhd(track_id, 0, 0, true);
    let mdhd = build_mdhd();
    let hdlr = build_hdlr(b"soun", "SoundHandler");
    let smhd = boxed(b"smhd", |b| {
        b.put_u32(0);
        b.put_i16(0);
        b.put_u16(0);
    });
    let dinf = build_dinf();
    let sample_entry = build_audio_sample_entry(config);
    let stbl = build_stbl(sample_entry);
    let minf = boxed(b"minf", |b| b.put_slice(&concat(&[smhd, dinf, stbl])));
    let mdia = boxed(b"mdia", |b| b.put_slice(&concat(&[mdhd, hdlr, minf])));
    boxed(b"trak", |b| b.put_slice(&concat(&[tkhd, mdia])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_video_and_audio_init_segment() {
        let config = InitSegmentConfig {
            video: Some(VideoTrackConfig {
                codec: VideoCodec::Avc {
                    avcc: Bytes::from_static(&[1, 0x42, 0, 0x1F, 0xFF, 0xE1, 0, 0]),
                },
                width: 1280,
                height: 720,
            }),
            audio: Some(AudioTrackConfig {
                sample_rate: 44100,
                channel_count: 2,
                audio_specific_config: [0x12, 0x10],
            }),
        };
        let init = build_init_segment(&config);
        assert_eq!(&init[4..8], b"ftyp");
        assert!(init.windows(4).any(|w| w == b"moov"));
        assert!(init.windows(4).any(|w| w == b"trak"));
        assert!(init.windows(4).any(|w| w == b"avc1"));
        assert!(init.windows(4).any(|w| w == b"mp4a"));
        assert!(init.windows(4).any(|w| w == b"trex"));
    }

    #[test]
    fn is_complete_respects_expected_tracks() {
        let mut config = InitSegmentConfig::default();
        assert!(config.is_complete(false, false));
        assert!(!config.is_complete(true, false));
        config.video = Some(VideoTrackConfig {
            codec: VideoCodec::Avc {
                avcc: Bytes::new(),
            },
            width: 0,
            height: 0,
        });
        assert!(config.is_complete(true, false));
        assert!(!config.is_complete(true, true));
    }
}
