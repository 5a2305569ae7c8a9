use bytes::{BufMut, Bytes, BytesMut};
use ts::StreamType;

/// One coded video access unit, content framed as 4-byte-length-prefixed NAL
/// units with AUD/SEI/parameter-set NALs excluded.
#[derive(Debug, Clone)]
pub struct VideoAccessUnit {
    pub has_idr: bool,
    pub content: Bytes,
    pub pts: u64,
    pub dts: u64,
}

/// One decoded ADTS-AAC frame, raw payload only (header stripped). Carries
/// the raw ADTS header fields alongside the derived sample rate, since
/// building an `esds` box needs the former and segment timing needs the
/// latter.
#[derive(Debug, Clone)]
pub struct AudioAccessUnit {
    pub content: Bytes,
    pub pts: u64,
    pub sample_rate: u32,
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
}

/// Parameter sets captured so far, promoted from the first PES carrying them.
/// `vps` stays empty for H.264.
#[derive(Debug, Clone, Default)]
pub struct ParameterSets {
    pub vps: Vec<Bytes>,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl ParameterSets {
    fn is_complete(&self, stream_type: StreamType) -> bool {
        match stream_type {
            StreamType::H265 => !self.vps.is_empty() && !self.sps.is_empty() && !self.pps.is_empty(),
            _ => !self.sps.is_empty() && !self.pps.is_empty(),
        }
    }
}

/// Extracts access units from one video elementary stream's PES payloads,
/// tracking parameter sets as they're observed.
pub struct VideoFramer {
    stream_type: StreamType,
    params: ParameterSets,
}

impl VideoFramer {
    pub fn new(stream_type: StreamType) -> Self {
        Self { stream_type, params: ParameterSets::default() }
    }

    pub fn params(&self) -> &ParameterSets {
        &self.params
    }

    pub fn params_ready(&self) -> bool {
        self.params.is_complete(self.stream_type)
    }

    /// Frame one PES payload (a full Annex-B access unit) into content bytes,
    /// promoting any parameter sets it carries. Returns `None` if the PES held
    /// only parameter sets / dropped NALs and no slice data.
    pub fn frame(&mut self, payload: &[u8], pts: u64, dts: u64) -> Option<VideoAccessUnit> {
        let mut content = BytesMut::new();
        let mut has_idr = false;

        match self.stream_type {
            StreamType::H265 => {
                for (nal_type, nal) in h265::split_nal_units(payload) {
                    if nal_type.is_dropped() {
                        continue;
                    }
                    if nal_type.is_parameter_set() {
                        self.promote_h265_param(nal_type, nal);
                        continue;
                    }
                    has_idr |= nal_type.is_idr();
                    append_length_prefixed(&mut content, nal);
                }
            }
            _ => {
                for (nal_type, nal) in h264::split_nal_units(payload) {
                    if nal_type.is_dropped() {
                        continue;
                    }
                    if nal_type.is_parameter_set() {
                        self.promote_h264_param(nal_type, nal);
                        continue;
                    }
                    has_idr |= nal_type.is_idr();
                    append_length_prefixed(&mut content, nal);
                }
            }
        }

        if content.is_empty() {
            return None;
        }
        Some(VideoAccessUnit { has_idr, content: content.freeze(), pts, dts })
    }

    fn promote_h264_param(&mut self, nal_type: h264::NalUnitType, nal: &[u8]) {
        let owned = Bytes::copy_from_slice(nal);
        match nal_type {
            h264::NalUnitType::Sps => self.params.sps = vec![owned],
            h264::NalUnitType::Pps => self.params.pps = vec![owned],
            _ => {}
        }
    }

    fn promote_h265_param(&mut self, nal_type: h265::NalUnitType, nal: &[u8]) {
        let owned = Bytes::copy_from_slice(nal);
        match nal_type {
            h265::NalUnitType::Vps => self.params.vps = vec![owned],
            h265::NalUnitType::Sps => self.params.sps = vec![owned],
            h265::NalUnitType::Pps => self.params.pps = vec![owned],
            _ => {}
        }
    }
}

/// Extracts access units from one audio elementary stream's PES payloads. A
/// single PES can carry several back-to-back ADTS frames.
pub struct AudioFramer;

impl AudioFramer {
    pub fn new() -> Self {
        Self
    }

    /// Frame one PES payload into its constituent ADTS frames. Each frame
    /// after the first is stamped with a PTS advanced by the frame duration,
    /// since ADTS carries no per-frame timestamp of its own.
    pub fn frame(&self, payload: &[u8], pts: u64) -> Vec<AudioAccessUnit> {
        let mut out = Vec::new();
        let mut running_pts = pts;
        for frame in aac::scan_adts_frames(payload) {
            let Some(sample_rate) = frame.sample_rate() else {
                continue;
            };
            out.push(AudioAccessUnit {
                content: Bytes::copy_from_slice(frame.data),
                pts: running_pts,
                sample_rate,
                profile: frame.profile,
                sampling_frequency_index: frame.sampling_frequency_index,
                channel_configuration: frame.channel_configuration,
            });
            if let Some(duration) = frame.duration_90k() {
                running_pts = running_pts.wrapping_add(duration as u64) % (1u64 << 33);
            }
        }
        out
    }
}

impl Default for AudioFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn append_length_prefixed(buf: &mut BytesMut, nal: &[u8]) {
    buf.put_u32(nal.len() as u32);
    buf.put_slice(nal);
}
