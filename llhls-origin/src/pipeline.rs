use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use hls::segmenter::AccessUnit;
use hls::{Clock, PlaylistStore, Scte35Scheduler, Segmenter};
use mp4::init::VideoCodec;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use ts::StreamType;

use crate::byte_source::ByteSource;
use crate::demux::{DemuxEvent, Demuxer};
use crate::framer::{AudioAccessUnit, AudioFramer, VideoAccessUnit, VideoFramer};
use crate::writer::{Fmp4Writer, MediaSample, TsWriter, Writer, VIDEO_TRACK_ID};

const AUDIO_TRACK_ID: u32 = 2;
const READ_CHUNK: usize = 64 * 1024;

/// Shared, cheaply-cloned handles into a running pipeline, held by the HTTP
/// layer. The init segment starts empty and is resolved exactly once the
/// pipeline has enough parameter sets/config to build it.
#[derive(Clone)]
pub struct PipelineHandle {
    pub store: Arc<Mutex<PlaylistStore>>,
    pub init: Arc<OnceCell<Bytes>>,
    pub content_type: &'static str,
}

/// A video or audio access unit paired with the stamp it will carry once its
/// successor arrives and its duration becomes known, per the "buffer one
/// access unit behind" pairing rule: a sample's duration is its successor's
/// decode-time delta, so nothing for a track can be written until the next
/// one shows up.
struct Pending<T> {
    unit: T,
    timestamp_90k: u64,
    program_date_time: chrono::DateTime<Utc>,
}

/// Runs the demux → frame → segment → write pipeline to completion (EOF on
/// the byte source), pushing produced bytes into `store` as they're ready.
/// Owns the entire pipeline state; there is exactly one of these per stream,
/// per the "single task owns the pipeline" concurrency model.
pub struct Pipeline {
    source: ByteSource,
    demuxer: Demuxer,
    video_framer: Option<VideoFramer>,
    audio_framer: AudioFramer,
    clock: Clock,
    scheduler: Scte35Scheduler,
    segmenter: Segmenter,
    writer: Option<Box<dyn Writer>>,
    store: Arc<Mutex<PlaylistStore>>,
    init: Arc<OnceCell<Bytes>>,
    is_fmp4: bool,
    idr_seen: bool,
    audio_config: Option<(u8, u8, u8)>,
    pending_video: Option<Pending<VideoAccessUnit>>,
    pending_audio: Option<Pending<AudioAccessUnit>>,
}

impl Pipeline {
    pub fn new(
        source: ByteSource,
        sid: Option<u16>,
        target_duration: f64,
        part_duration: f64,
        is_fmp4: bool,
        store: Arc<Mutex<PlaylistStore>>,
    ) -> Self {
        Self {
            source,
            demuxer: Demuxer::new(sid),
            video_framer: None,
            audio_framer: AudioFramer::new(),
            clock: Clock::new(),
            scheduler: Scte35Scheduler::new(),
            segmenter: Segmenter::new(target_duration, part_duration),
            writer: None,
            store,
            init: Arc::new(OnceCell::new()),
            is_fmp4,
            idr_seen: false,
            audio_config: None,
            pending_video: None,
            pending_audio: None,
        }
    }

    pub fn handle(&self, content_type: &'static str) -> PipelineHandle {
        PipelineHandle { store: self.store.clone(), init: self.init.clone(), content_type }
    }

    /// Drive the pipeline until the byte source reaches EOF or a read fails,
    /// then cancel `shutdown` so the HTTP server's graceful shutdown follows
    /// — per §5's "on SIGINT/SIGTERM (or EOF of the input) the token is
    /// cancelled" rule, EOF is just another source of cancellation alongside
    /// signals. Returns `Ok(())` on clean EOF and `Err` on an unrecoverable
    /// read failure, per §6's exit-code policy.
    pub async fn run(&mut self, shutdown: CancellationToken) -> std::io::Result<()> {
        let result = loop {
            let chunk = match self.source.read_chunk(READ_CHUNK).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break Ok(()),
                Err(err) => {
                    tracing::warn!(error = %err, "byte source read failed, stopping pipeline");
                    break Err(err);
                }
            };

            let events = self.demuxer.feed(&chunk);
            for event in events {
                self.handle_event(event).await;
            }

            if let Some(pcr) = self.clock.latest_pcr() {
                self.source.pace(pcr).await;
            }
        };
        tracing::info!("byte source exhausted, pipeline stopped");
        shutdown.cancel();
        result
    }

    async fn handle_event(&mut self, event: DemuxEvent) {
        match event {
            DemuxEvent::Pcr(pcr) => self.clock.update_pcr(pcr, Utc::now()),
            DemuxEvent::Video { stream_type, pts, dts, data } => {
                self.on_video(stream_type, pts, dts, &data).await;
            }
            DemuxEvent::Audio { pts, data } => self.on_audio(pts, &data).await,
            DemuxEvent::Id3 { .. } => {}
            DemuxEvent::Scte35(section) => {
                self.scheduler.ingest(&section, &self.clock);
            }
        }
    }

    /// Builds the writer on first use, once the demuxer has settled on the
    /// real elementary PIDs from the PMT (both video and audio events are
    /// gated on PMT adoption, so by the first of either, PID assignment is
    /// already final).
    fn ensure_writer(&mut self) {
        if self.writer.is_none() {
            let writer: Box<dyn Writer> = if self.is_fmp4 {
                Box::new(Fmp4Writer::new(self.demuxer.video_pid().is_some()))
            } else {
                Box::new(TsWriter::new(
                    self.demuxer.video_pid(),
                    self.demuxer.audio_pid(),
                    self.demuxer.video_stream_type().unwrap_or(StreamType::H264),
                    self.demuxer.pmt_pid().unwrap_or(0x1000),
                ))
            };
            self.writer = Some(writer);
        }
    }

    async fn on_video(&mut self, stream_type: StreamType, pts: u64, dts: u64, data: &[u8]) {
        let framer = self.video_framer.get_or_insert_with(|| VideoFramer::new(stream_type));
        let Some(au) = framer.frame(data, pts, dts) else {
            return;
        };
        self.ensure_writer();
        self.maybe_commit_init().await;
        let (Some(timestamp_90k), Some(pdt)) =
            (self.clock.timestamp(au.dts), self.clock.program_date_time(au.dts))
        else {
            return;
        };
        if au.has_idr {
            self.idr_seen = true;
        }
        if !self.idr_seen {
            return;
        }

        if let Some(prev) = self.pending_video.take() {
            self.emit_video(prev, timestamp_90k).await;
        }
        self.pending_video = Some(Pending { unit: au, timestamp_90k, program_date_time: pdt });
    }

    async fn on_audio(&mut self, pts: u64, data: &[u8]) {
        self.ensure_writer();
        if !self.idr_seen && self.demuxer.video_pid().is_some() {
            // video-led streams hold audio back until the first IDR too, so
            // the leading track in every segment is always video.
            return;
        }
        for au in self.audio_framer.frame(data, pts) {
            if self.audio_config.is_none() {
                self.audio_config =
                    Some((au.profile, au.sampling_frequency_index, au.channel_configuration));
                self.maybe_commit_init().await;
            }
            let (Some(timestamp_90k), Some(pdt)) =
                (self.clock.timestamp(au.pts), self.clock.program_date_time(au.pts))
            else {
                continue;
            };
            if let Some(prev) = self.pending_audio.take() {
                self.emit_audio(prev, timestamp_90k).await;
            }
            self.pending_audio = Some(Pending { unit: au, timestamp_90k, program_date_time: pdt });
        }
    }

    /// Emit the finalized `prev` video access unit: decide its segment
    /// boundary, write its sample bytes, and push them (with a republished
    /// PAT/PMT header first, for TS, if a new segment just opened).
    async fn emit_video(&mut self, prev: Pending<VideoAccessUnit>, next_timestamp_90k: u64) {
        let duration = tick_delta(prev.timestamp_90k, next_timestamp_90k) as u32;
        let audio_is_leading = self.demuxer.video_pid().is_none();
        let unit = AccessUnit {
            has_idr: prev.unit.has_idr,
            timestamp_90k: prev.timestamp_90k,
            program_date_time: prev.program_date_time,
        };

        self.ensure_writer();
        let writer = self.writer.as_mut().expect("ensure_writer just initialized it");
        let mut store = self.store.lock().await;
        let opened_segment =
            self.segmenter.on_access_unit(unit, audio_is_leading, &mut store, &mut self.scheduler);
        if opened_segment {
            if let Some(header) = writer.segment_header() {
                store.push(&header);
            }
        }

        let pts_90k = self.clock.timestamp(prev.unit.pts).unwrap_or(prev.timestamp_90k);
        let sample = MediaSample {
            track_id: VIDEO_TRACK_ID,
            pts: pts_90k,
            dts: prev.timestamp_90k,
            duration,
            is_sync: prev.unit.has_idr,
            data: prev.unit.content,
        };
        let bytes = writer.write_video(&sample);
        store.push(&bytes);
    }

    async fn emit_audio(
        &mut self,
        prev: Pending<AudioAccessUnit>,
        next_timestamp_90k: u64,
    ) {
        let duration = tick_delta(prev.timestamp_90k, next_timestamp_90k) as u32;
        let audio_is_leading = self.demuxer.video_pid().is_none();

        self.ensure_writer();
        let writer = self.writer.as_mut().expect("ensure_writer just initialized it");
        let mut store = self.store.lock().await;
        if audio_is_leading {
            let unit = AccessUnit {
                has_idr: true,
                timestamp_90k: prev.timestamp_90k,
                program_date_time: prev.program_date_time,
            };
            let opened_segment =
                self.segmenter.on_access_unit(unit, true, &mut store, &mut self.scheduler);
            if opened_segment {
                if let Some(header) = writer.segment_header() {
                    store.push(&header);
                }
            }
        }

        let sample = MediaSample {
            track_id: AUDIO_TRACK_ID,
            pts: prev.timestamp_90k,
            dts: prev.timestamp_90k,
            duration,
            is_sync: true,
            data: prev.unit.content,
        };
        let bytes = writer.write_audio(&sample);
        store.push(&bytes);
    }

    /// Commit the init segment exactly once: only meaningful for fMP4, and
    /// only once every configured track (video only / audio only / both, per
    /// §4.5) has what it needs to build its box — video needs its parameter
    /// sets, audio needs a captured ADTS config, and a track that isn't
    /// configured at all (no PID for it in the PMT) is simply skipped.
    async fn maybe_commit_init(&mut self) {
        if !self.is_fmp4 || self.init.initialized() {
            return;
        }

        let video = if self.demuxer.video_pid().is_some() {
            let Some(framer) = &self.video_framer else {
                return;
            };
            if !framer.params_ready() {
                return;
            }
            let params = framer.params().clone();
            let stream_type = self.demuxer.video_stream_type().unwrap_or(StreamType::H264);
            let codec = match stream_type {
                StreamType::H265 => h265::build_hevc_decoder_configuration_record(
                    &params.vps,
                    &params.sps,
                    &params.pps,
                )
                .map(|hvcc| VideoCodec::Hevc { hvcc }),
                _ => h264::build_avc_decoder_configuration_record(&params.sps, &params.pps)
                    .map(|avcc| VideoCodec::Avc { avcc }),
            };
            let Some(codec) = codec else {
                return;
            };
            Some((codec, 0, 0))
        } else {
            None
        };

        let audio = if self.demuxer.has_audio() {
            let Some((profile, sampling_frequency_index, channel_configuration)) =
                self.audio_config
            else {
                return;
            };
            let sample_rate =
                aac::adts::sample_rate_for_index(sampling_frequency_index).unwrap_or(48_000);
            let channel_count = channel_configuration.max(1) as u16;
            let asc = aac::build_audio_specific_config(
                profile,
                sampling_frequency_index,
                channel_configuration,
            );
            Some((sample_rate, channel_count, asc))
        } else {
            None
        };

        let init = Fmp4Writer::build_init(video, audio);
        let _ = self.init.set(init);
    }
}

fn tick_delta(a: u64, b: u64) -> u64 {
    const MODULUS: u64 = 1 << 33;
    (b.wrapping_sub(a).wrapping_add(MODULUS)) % MODULUS
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use ts::mux::{ContinuityCounters, packetize_pes, packetize_section};
    use ts::packet::PID_PAT;
    use ts::pat::{PatProgram, build_pat_section};
    use ts::pes::{STREAM_ID_AUDIO_MIN, build_pes_packet};
    use ts::pmt::{PmtStream, build_pmt_section};

    use super::*;
    use crate::state::new_store;

    const PMT_PID: u16 = 0x1000;
    const AUDIO_PID: u16 = 0x101;

    fn make_adts_frame(payload: &[u8]) -> Vec<u8> {
        let frame_length = (7 + payload.len()) as u32;
        let mut frame = vec![
            0xFF,
            0xF1, // MPEG-4, no CRC, protection_absent=1
            (1 << 6) | (4 << 2), // profile=1(LC), sampling_index=4(44100)
            ((frame_length >> 11) as u8 & 0x03),
            (frame_length >> 3) as u8,
            (((frame_length & 0x07) as u8) << 5) | 0x1F,
            0xFC,
        ];
        frame.extend_from_slice(payload);
        frame
    }

    /// A PAT naming one program, a PMT for that program with only an AAC
    /// stream (no video), and two ADTS-framed audio PES units on `AUDIO_PID`
    /// — the second is needed to flush the first out of PES reassembly.
    fn audio_only_ts_stream() -> Bytes {
        let mut cc = ContinuityCounters::new();
        let mut out = BytesMut::new();

        let pat_section = build_pat_section(1, &[PatProgram { program_number: 1, pmt_pid: PMT_PID }]);
        for packet in packetize_section(PID_PAT, &pat_section, &mut cc) {
            out.extend_from_slice(&packet);
        }

        let pmt_section = build_pmt_section(
            1,
            AUDIO_PID,
            &[PmtStream { stream_type: ts::StreamType::Aac, elementary_pid: AUDIO_PID }],
        );
        for packet in packetize_section(PMT_PID, &pmt_section, &mut cc) {
            out.extend_from_slice(&packet);
        }

        for pts in [90_000u64, 180_000u64] {
            let frame = make_adts_frame(&[0xAA, 0xBB, 0xCC]);
            let pes = build_pes_packet(STREAM_ID_AUDIO_MIN, pts, None, &frame);
            for packet in packetize_pes(AUDIO_PID, &pes, false, &mut cc) {
                out.extend_from_slice(&packet);
            }
        }

        out.freeze()
    }

    #[tokio::test]
    async fn audio_only_stream_commits_init_without_a_video_track() {
        let store = new_store(Some(6), 2.0, 0.5, true);
        let mut pipeline = Pipeline::new(ByteSource::stdin(), None, 2.0, 0.5, true, store);

        let events = pipeline.demuxer.feed(&audio_only_ts_stream());

        // The PMT configured an audio PID and no video PID — this is the
        // audio-only configuration `maybe_commit_init` must not block on.
        assert!(pipeline.demuxer.video_pid().is_none());
        assert!(pipeline.demuxer.has_audio());

        for event in events {
            pipeline.handle_event(event).await;
        }

        let init = pipeline.init.get().expect("init segment should commit without a video track");
        assert!(!init.is_empty());
    }
}
