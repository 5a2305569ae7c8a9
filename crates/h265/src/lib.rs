//! H.265/HEVC NAL unit framing and `hvcC` configuration record construction.

pub mod enums;
pub mod hvcc;
pub mod nal;

pub use hvcc::build_hevc_decoder_configuration_record;
pub use nal::{NalUnitType, split_nal_units};
