//! Stop-bit encoded integers.
//!
//! Each byte carries 7 value bits in its low bits; the top bit is set on
//! every byte except the last ("the stop bit" is the *absence* of the
//! continuation bit). Unsigned values encode directly; signed values are
//! zig-zag mapped to unsigned first so small negative numbers stay short.
//! A 64-bit value never needs more than 10 bytes (`ceil(64/7) == 10`), so
//! anything past that is malformed input rather than a legitimate encoding.

use crate::bytes::Bytes;
use crate::error::{BytesError, Result};

const MAX_STOP_BIT_BYTES: u32 = 10;

pub fn write_unsigned(bytes: &mut Bytes, mut value: u64) -> Result<()> {
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            bytes.write_byte(low)?;
            return Ok(());
        }
        bytes.write_byte(low | 0x80)?;
    }
}

pub fn read_unsigned(bytes: &mut Bytes) -> Result<u64> {
    let mut result: u64 = 0;
    for i in 0..MAX_STOP_BIT_BYTES {
        let b = bytes.read_byte()?;
        result |= ((b & 0x7F) as u64) << (i * 7);
        if b & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(BytesError::StopBitTooLong)
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn write_signed(bytes: &mut Bytes, value: i64) -> Result<()> {
    write_unsigned(bytes, zigzag_encode(value))
}

pub fn read_signed(bytes: &mut Bytes) -> Result<i64> {
    Ok(zigzag_decode(read_unsigned(bytes)?))
}

/// Writes a `(mantissa, scale)` decimal pair as a single zig-zag stop-bit
/// long `v = sign · (|mantissa| · 10 + scale)`, folding the scale digit
/// into the low decimal digit of the encoded value instead of spending a
/// separate byte on it. `scale` must be a single digit (`0..=9`); larger
/// scales, or mantissas whose encoded `v` would overflow `i64`, need the
/// arbitrary-precision path this core doesn't provide.
pub fn write_decimal(bytes: &mut Bytes, mantissa: i64, scale: u8) -> Result<()> {
    if scale > 9 {
        return Err(BytesError::DecimalPrecisionUnsupported);
    }
    let magnitude = (mantissa as i128).unsigned_abs();
    let v = magnitude * 10 + scale as u128;
    let signed_v: i128 = if mantissa < 0 { -(v as i128) } else { v as i128 };
    if signed_v < i64::MIN as i128 || signed_v > i64::MAX as i128 {
        return Err(BytesError::DecimalPrecisionUnsupported);
    }
    write_signed(bytes, signed_v as i64)
}

/// Reverses [`write_decimal`]: `scale = |v| mod 10`, then the sign-carrying
/// mantissa falls out of `(v − sign·scale) / 10`.
pub fn read_decimal(bytes: &mut Bytes) -> Result<(i64, u8)> {
    let v = read_signed(bytes)? as i128;
    let sign: i128 = if v < 0 { -1 } else { 1 };
    let scale = v.unsigned_abs() % 10;
    let mantissa = (v - sign * scale as i128) / 10;
    Ok((mantissa as i64, scale as u8))
}
