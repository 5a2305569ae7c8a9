//! fMP4 (fragmented ISOBMFF) box writer for the low-latency HLS origin.
//!
//! An init segment is `ftyp | moov(...)`, built once per variant when the
//! first keyframe's parameter sets are known ([`init`]). Every access unit
//! after that becomes its own `moof | mdat` media fragment ([`fragment`]).
//! Out-of-band SCTE-35 events are surfaced to fMP4 clients as `emsg` boxes
//! ([`emsg`]).

pub mod boxes;
mod esds;
pub mod emsg;
pub mod fragment;
pub mod init;

pub use emsg::build_emsg;
pub use fragment::{FragmentSample, build_media_fragment, fix_up_data_offset};
pub use init::{AudioTrackConfig, InitSegmentConfig, VideoCodec, VideoTrackConfig, build_init_segment};
