//! Transport Stream (TS) parser for MPEG-2 Transport Stream data
//!
//! This crate provides functionality to parse Program Association Table (PAT),
//! Program Map Table (PMT), PES headers, adaptation fields, and SCTE-35
//! splice information from MPEG-TS (Transport Stream) data.

pub mod adaptation_field;
pub mod crc32;
pub mod error;
pub mod mux;
pub mod packet;
pub mod pat;
pub mod pes;
pub mod pmt;
pub mod scte35;

pub use adaptation_field::{AdaptationField, AdaptationFieldRef, Pcr};
pub use crc32::{mpeg2_crc32, validate_section_crc32};
pub use error::TsError;
pub use mux::ContinuityCounters;
pub use packet::{ContinuityMode, ContinuityStatus, PID_CAT, PID_NULL, PID_PAT, TsPacket};
pub use pat::{Pat, PatProgram};
pub use pes::{PesHeader, PesHeaderRef, build_pes_packet};
pub use pmt::{Pmt, PmtStream, StreamType};
pub use scte35::{
    BreakDuration, SegmentationDescriptor, SpliceCommand, SpliceCommandType, SpliceInfoSection,
    SpliceInfoSectionRef, SpliceInsert, TimeSignal, segmentation_type,
};

/// Result type for TS parsing operations
pub type Result<T> = std::result::Result<T, TsError>;
