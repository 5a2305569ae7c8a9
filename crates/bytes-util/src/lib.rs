//! Small byte/bit level helpers shared by the codec-framer crates.

mod bit_reader;
mod emulation;

pub use bit_reader::BitReader;
pub use emulation::remove_emulation_prevention;
