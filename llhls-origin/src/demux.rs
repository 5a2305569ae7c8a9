use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use ts::packet::PID_PAT;
use ts::{Pat, PesHeader, Pmt, SpliceInfoSection, StreamType, TsPacket};

/// One demultiplexed event, in strict arrival order.
#[derive(Debug, Clone)]
pub enum DemuxEvent {
    Pcr(u64),
    Video { stream_type: StreamType, pts: u64, dts: u64, data: Bytes },
    Audio { pts: u64, data: Bytes },
    Id3 { pts: u64, data: Bytes },
    Scte35(SpliceInfoSection),
}

/// Tracks PAT/PMT/PCR/PES/section reassembly for the single program this
/// pipeline follows, per §4.1.
pub struct Demuxer {
    sid: Option<u16>,
    pat: Option<Pat>,
    pmt: Option<Pmt>,
    pmt_pid: Option<u16>,
    pcr_pid: Option<u16>,
    video_pid: Option<u16>,
    video_stream_type: Option<StreamType>,
    audio_pid: Option<u16>,
    id3_pid: Option<u16>,
    scte35_pid: Option<u16>,
    pes_buffers: HashMap<u16, BytesMut>,
    section_buffers: HashMap<u16, BytesMut>,
}

impl Demuxer {
    pub fn new(sid: Option<u16>) -> Self {
        Self {
            sid,
            pat: None,
            pmt: None,
            pmt_pid: None,
            pcr_pid: None,
            video_pid: None,
            video_stream_type: None,
            audio_pid: None,
            id3_pid: None,
            scte35_pid: None,
            pes_buffers: HashMap::new(),
            section_buffers: HashMap::new(),
        }
    }

    pub fn video_stream_type(&self) -> Option<StreamType> {
        self.video_stream_type
    }

    pub fn has_audio(&self) -> bool {
        self.audio_pid.is_some()
    }

    pub fn video_pid(&self) -> Option<u16> {
        self.video_pid
    }

    pub fn audio_pid(&self) -> Option<u16> {
        self.audio_pid
    }

    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    /// Feed raw bytes (resynchronizing on `0x47` as needed) and return the
    /// events produced, in packet arrival order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<DemuxEvent> {
        let mut events = Vec::new();
        let mut offset = 0;
        while offset + 188 <= data.len() {
            if data[offset] != 0x47 {
                offset += 1;
                continue;
            }
            let chunk = Bytes::copy_from_slice(&data[offset..offset + 188]);
            offset += 188;
            if let Ok(packet) = TsPacket::parse(chunk) {
                self.handle_packet(packet, &mut events);
            }
        }
        events
    }

    fn handle_packet(&mut self, packet: TsPacket, events: &mut Vec<DemuxEvent>) {
        if Some(packet.pid) == self.pcr_pid
            && let Some(af) = packet.parse_adaptation_field()
            && let Some(pcr) = af.pcr
        {
            events.push(DemuxEvent::Pcr(pcr.base));
        }

        if packet.pid == PID_PAT {
            if let Some(section) = reassemble_section(&mut self.section_buffers, &packet)
                && let Ok(pat) = Pat::parse_with_crc(&section)
            {
                self.select_program(&pat);
                self.pat = Some(pat);
            }
            return;
        }

        if Some(packet.pid) == self.pmt_pid {
            if let Some(section) = reassemble_section(&mut self.section_buffers, &packet)
                && let Ok(pmt) = Pmt::parse_with_crc(&section)
            {
                self.adopt_pmt(&pmt);
                self.pmt = Some(pmt);
            }
            return;
        }

        if Some(packet.pid) == self.scte35_pid {
            if let Some(section) = reassemble_section(&mut self.section_buffers, &packet)
                && ts::validate_section_crc32(&section)
                && let Ok(splice) = SpliceInfoSection::parse(&section)
            {
                events.push(DemuxEvent::Scte35(splice));
            }
            return;
        }

        let is_video = Some(packet.pid) == self.video_pid;
        let is_audio = Some(packet.pid) == self.audio_pid;
        let is_id3 = Some(packet.pid) == self.id3_pid;
        if is_video || is_audio || is_id3 {
            if let Some(pes_bytes) = reassemble_pes(&mut self.pes_buffers, &packet)
                && let Ok(header) = PesHeader::parse(&pes_bytes)
                && let Some(pts) = header.pts
            {
                let payload = header.payload(&pes_bytes).unwrap_or(&[]);
                let data = Bytes::copy_from_slice(payload);
                if is_video {
                    events.push(DemuxEvent::Video {
                        stream_type: self.video_stream_type.unwrap_or(StreamType::H264),
                        pts,
                        dts: header.dts.unwrap_or(pts),
                        data,
                    });
                } else if is_audio {
                    events.push(DemuxEvent::Audio { pts, data });
                } else {
                    events.push(DemuxEvent::Id3 { pts, data });
                }
            }
        }
    }

    fn select_program(&mut self, pat: &Pat) {
        let program = match self.sid {
            Some(sid) => pat.programs.iter().find(|p| p.program_number == sid),
            None => pat.programs.iter().find(|p| p.program_number != 0),
        };
        self.pmt_pid = program.map(|p| p.pmt_pid);
    }

    fn adopt_pmt(&mut self, pmt: &Pmt) {
        self.pcr_pid = Some(pmt.pcr_pid);
        for stream in &pmt.streams {
            match stream.stream_type {
                StreamType::H264 | StreamType::H265 => {
                    self.video_pid = Some(stream.elementary_pid);
                    self.video_stream_type = Some(stream.stream_type);
                }
                StreamType::Aac => self.audio_pid = Some(stream.elementary_pid),
                StreamType::Id3 => self.id3_pid = Some(stream.elementary_pid),
                StreamType::Scte35 => self.scte35_pid = Some(stream.elementary_pid),
                StreamType::Other(_) => {}
            }
        }
    }
}

/// Reassemble a PSI/SCTE-35 section across TS packets for one PID: on PUSI,
/// start a new buffer past the pointer field; otherwise append. Returns the
/// section (table_id..CRC inclusive) once `section_length` bytes are present.
fn reassemble_section(buffers: &mut HashMap<u16, BytesMut>, packet: &TsPacket) -> Option<Bytes> {
    let payload = packet.payload.as_ref()?;
    if packet.payload_unit_start_indicator {
        if payload.is_empty() {
            return None;
        }
        let pointer = payload[0] as usize;
        if 1 + pointer > payload.len() {
            return None;
        }
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&payload[1 + pointer..]);
        buffers.insert(packet.pid, buf);
    } else {
        let buf = buffers.get_mut(&packet.pid)?;
        buf.extend_from_slice(payload);
    }

    let buf = buffers.get(&packet.pid)?;
    if buf.len() < 3 || buf[0] == 0xFF {
        return None;
    }
    let section_length = (((buf[1] & 0x0F) as usize) << 8) | buf[2] as usize;
    let total_len = 3 + section_length;
    if buf.len() < total_len {
        return None;
    }
    let section = Bytes::copy_from_slice(&buf[..total_len]);
    buffers.remove(&packet.pid);
    Some(section)
}

/// Reassemble a PES packet across TS packets for one media PID: flush the
/// previous buffer on the next PUSI, otherwise append the continuation payload.
fn reassemble_pes(buffers: &mut HashMap<u16, BytesMut>, packet: &TsPacket) -> Option<Bytes> {
    let payload = packet.payload.as_ref()?;
    if packet.payload_unit_start_indicator {
        let completed = buffers.remove(&packet.pid).map(|buf| buf.freeze());
        let mut buf = BytesMut::new();
        buf.extend_from_slice(payload);
        buffers.insert(packet.pid, buf);
        completed
    } else {
        if let Some(buf) = buffers.get_mut(&packet.pid) {
            buf.extend_from_slice(payload);
        }
        None
    }
}
