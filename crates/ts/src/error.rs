use thiserror::Error;

/// Errors produced while parsing or building MPEG-2 Transport Stream data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    #[error("invalid packet size: expected 188 bytes, got {0}")]
    InvalidPacketSize(usize),

    #[error("invalid sync byte: expected 0x47, got {0:#04x}")]
    InvalidSyncByte(u8),

    #[error("insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("invalid table id: expected {expected:#04x}, got {actual:#04x}")]
    InvalidTableId { expected: u8, actual: u8 },

    #[error("invalid section length: {0}")]
    InvalidSectionLength(u16),

    #[error("CRC-32 mismatch: expected {expected:#010x}, calculated {calculated:#010x}")]
    Crc32Mismatch { expected: u32, calculated: u32 },

    #[error("invalid PES start code")]
    InvalidPesStartCode,

    #[error("invalid PTS/DTS flags: {0:#04b}")]
    InvalidPtsDtsFlags(u8),

    #[error("duplicate packet on PID {pid}: continuity counter {cc}")]
    DuplicatePacket { pid: u16, cc: u8 },

    #[error("continuity error on PID {pid}: expected {expected}, got {actual}")]
    ContinuityError { pid: u16, expected: u8, actual: u8 },

    #[error("invalid SCTE-35 data: {0}")]
    InvalidScte35(String),

    #[error("{0}")]
    ParseError(String),
}
