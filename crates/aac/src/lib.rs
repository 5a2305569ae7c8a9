//! ADTS-AAC frame scanning and `AudioSpecificConfig` construction for `esds`.

pub mod adts;
pub mod esds;

pub use adts::{AdtsFrame, scan_adts_frames};
pub use esds::build_audio_specific_config;
