//! Exponential-Golomb (Exp-Golomb) code reading, as used throughout H.264/H.265
//! sequence and picture parameter sets.

use bytes_util::BitReader;
use std::io;

/// Extension trait adding Exp-Golomb decoding to a [`BitReader`].
pub trait ExpGolombRead {
    /// Read an unsigned Exp-Golomb coded value (`ue(v)`).
    fn read_ue(&mut self) -> io::Result<u64>;

    /// Read a signed Exp-Golomb coded value (`se(v)`).
    fn read_se(&mut self) -> io::Result<i64>;
}

impl ExpGolombRead for BitReader<'_> {
    fn read_ue(&mut self) -> io::Result<u64> {
        let mut leading_zero_bits = 0u32;
        while !self.read_bit()? {
            leading_zero_bits += 1;
            if leading_zero_bits > 63 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "exp-golomb prefix too long",
                ));
            }
        }
        if leading_zero_bits == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zero_bits)?;
        Ok((1u64 << leading_zero_bits) - 1 + suffix)
    }

    fn read_se(&mut self) -> io::Result<i64> {
        let code = self.read_ue()?;
        let magnitude = (code + 1) / 2;
        if code % 2 == 0 {
            Ok(-(magnitude as i64))
        } else {
            Ok(magnitude as i64)
        }
    }
}
