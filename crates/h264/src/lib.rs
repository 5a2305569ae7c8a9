//! H.264/AVC NAL unit framing and `avcC` configuration record construction.

pub mod avcc;
pub mod enums;
pub mod nal;

pub use avcc::build_avc_decoder_configuration_record;
pub use nal::{NalUnitType, split_nal_units};
