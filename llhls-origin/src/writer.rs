use bytes::Bytes;
use mp4::fragment::{FragmentSample, build_media_fragment, fix_up_data_offset};
use mp4::init::{AudioTrackConfig, InitSegmentConfig, VideoCodec, VideoTrackConfig};
use ts::mux::{ContinuityCounters, packetize_pes, packetize_section};
use ts::pat::{PatProgram, build_pat_section};
use ts::pes::{STREAM_ID_AUDIO_MIN, STREAM_ID_VIDEO_MIN, build_pes_packet};
use ts::pmt::{PmtStream, StreamType, build_pmt_section};

/// Track identifiers assigned in the order fMP4 `trak`s are declared (video=1,
/// audio=2 if both present; see `mp4::init::InitSegmentConfig`).
pub const VIDEO_TRACK_ID: u32 = 1;

/// One coded sample handed to a writer, independent of output container.
#[derive(Debug, Clone)]
pub struct MediaSample {
    pub track_id: u32,
    pub pts: u64,
    pub dts: u64,
    pub duration: u32,
    pub is_sync: bool,
    pub data: Bytes,
}

fn composition_offset(pts: u64, dts: u64) -> i32 {
    const MODULUS: i64 = 1 << 33;
    let mut delta = pts as i64 - dts as i64;
    if delta > MODULUS / 2 {
        delta -= MODULUS;
    } else if delta < -MODULUS / 2 {
        delta += MODULUS;
    }
    delta as i32
}

/// Produces the bytes appended to a segment's buffer for each sample, plus
/// whatever header bytes (if any) must precede the first sample of a new
/// segment. Two implementations share this contract per the codebase's
/// "one writer trait, fMP4 and TS implementations" pattern.
pub trait Writer: Send {
    fn content_type(&self) -> &'static str;
    fn write_video(&mut self, sample: &MediaSample) -> Bytes;
    fn write_audio(&mut self, sample: &MediaSample) -> Bytes;
    /// Bytes to push before the first sample of a newly opened segment.
    /// TS republishes PAT/PMT; fMP4 has nothing (the init segment is a
    /// separate endpoint).
    fn segment_header(&mut self) -> Option<Bytes>;
}

/// fMP4 writer: one `moof + mdat` fragment per access unit.
pub struct Fmp4Writer {
    video_sequence: u32,
    audio_sequence: u32,
    audio_track_id: u32,
}

impl Fmp4Writer {
    pub fn new(has_video: bool) -> Self {
        Self {
            video_sequence: 0,
            audio_sequence: 0,
            audio_track_id: if has_video { 2 } else { 1 },
        }
    }

    pub fn build_init(
        video: Option<(VideoCodec, u16, u16)>,
        audio: Option<(u32, u16, [u8; 2])>,
    ) -> Bytes {
        let config = InitSegmentConfig {
            video: video.map(|(codec, width, height)| VideoTrackConfig { codec, width, height }),
            audio: audio.map(|(sample_rate, channel_count, audio_specific_config)| {
                AudioTrackConfig { sample_rate, channel_count, audio_specific_config }
            }),
        };
        mp4::init::build_init_segment(&config)
    }

    fn fragment(&self, sample: &FragmentSample) -> Bytes {
        let fragment = build_media_fragment(sample);
        let moof_len = fragment.windows(4).position(|w| w == b"mdat").unwrap() - 4;
        let mut buf = bytes::BytesMut::from(&fragment[..]);
        fix_up_data_offset(&mut buf, moof_len);
        buf.freeze()
    }
}

impl Writer for Fmp4Writer {
    fn content_type(&self) -> &'static str {
        "video/mp4"
    }

    fn write_video(&mut self, sample: &MediaSample) -> Bytes {
        self.video_sequence += 1;
        self.fragment(&FragmentSample {
            track_id: VIDEO_TRACK_ID,
            sequence_number: self.video_sequence,
            decode_time: sample.dts,
            duration: sample.duration,
            is_sync: sample.is_sync,
            composition_time_offset: composition_offset(sample.pts, sample.dts),
            data: sample.data.clone(),
        })
    }

    fn write_audio(&mut self, sample: &MediaSample) -> Bytes {
        self.audio_sequence += 1;
        self.fragment(&FragmentSample {
            track_id: self.audio_track_id,
            sequence_number: self.audio_sequence,
            decode_time: sample.dts,
            duration: sample.duration,
            is_sync: true,
            composition_time_offset: 0,
            data: sample.data.clone(),
        })
    }

    fn segment_header(&mut self) -> Option<Bytes> {
        None
    }
}

/// TS writer: re-packetizes each sample as a PES packet and TS packets,
/// republishing PAT/PMT at the start of every segment so it's self-decodable.
pub struct TsWriter {
    transport_stream_id: u16,
    program_number: u16,
    pcr_pid: u16,
    video_pid: Option<u16>,
    audio_pid: Option<u16>,
    pmt_pid: u16,
    video_stream_type: StreamType,
    cc: ContinuityCounters,
}

impl TsWriter {
    pub fn new(
        video_pid: Option<u16>,
        audio_pid: Option<u16>,
        video_stream_type: StreamType,
        pmt_pid: u16,
    ) -> Self {
        let pcr_pid = video_pid.or(audio_pid).unwrap_or(0x100);
        Self {
            transport_stream_id: 1,
            program_number: 1,
            pcr_pid,
            video_pid,
            audio_pid,
            pmt_pid,
            video_stream_type,
            cc: ContinuityCounters::new(),
        }
    }

    fn packetize(&mut self, pid: u16, pes: Bytes, random_access: bool) -> Bytes {
        let packets = packetize_pes(pid, &pes, random_access, &mut self.cc);
        let mut out = bytes::BytesMut::with_capacity(packets.len() * 188);
        for packet in packets {
            out.extend_from_slice(&packet);
        }
        out.freeze()
    }
}

impl Writer for TsWriter {
    fn content_type(&self) -> &'static str {
        "video/mp2t"
    }

    fn write_video(&mut self, sample: &MediaSample) -> Bytes {
        let Some(pid) = self.video_pid else {
            return Bytes::new();
        };
        let pes = build_pes_packet(STREAM_ID_VIDEO_MIN, sample.pts, Some(sample.dts), &sample.data);
        self.packetize(pid, pes, sample.is_sync)
    }

    fn write_audio(&mut self, sample: &MediaSample) -> Bytes {
        let Some(pid) = self.audio_pid else {
            return Bytes::new();
        };
        let pes = build_pes_packet(STREAM_ID_AUDIO_MIN, sample.pts, None, &sample.data);
        self.packetize(pid, pes, false)
    }

    fn segment_header(&mut self) -> Option<Bytes> {
        let mut streams = Vec::new();
        if let Some(pid) = self.video_pid {
            streams.push(PmtStream { stream_type: self.video_stream_type, elementary_pid: pid });
        }
        if let Some(pid) = self.audio_pid {
            streams.push(PmtStream { stream_type: StreamType::Aac, elementary_pid: pid });
        }
        let pat_section = build_pat_section(
            self.transport_stream_id,
            &[PatProgram { program_number: self.program_number, pmt_pid: self.pmt_pid }],
        );
        let pmt_section = build_pmt_section(self.program_number, self.pcr_pid, &streams);

        let mut out = bytes::BytesMut::new();
        for packet in packetize_section(ts::packet::PID_PAT, &pat_section, &mut self.cc) {
            out.extend_from_slice(&packet);
        }
        for packet in packetize_section(self.pmt_pid, &pmt_section, &mut self.cc) {
            out.extend_from_slice(&packet);
        }
        Some(out.freeze())
    }
}
