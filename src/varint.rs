//! QUIC variable-length integers (RFC 9000, section 16)
//!
//! The two most significant bits of the first byte give the encoded length:
//! `00` = 1 byte, `01` = 2 bytes, `10` = 4 bytes, `11` = 8 bytes. The
//! remaining bits hold the value in network byte order.

use crate::error::{DemuxError, Result};
use bytes::{Buf, BufMut};

/// Largest value a varint can carry: 2^62 - 1
pub const MAX: u64 = (1 << 62) - 1;

/// Number of bytes `value` occupies on the wire
pub fn encoded_len(value: u64) -> Result<usize> {
    match value {
        0..=0x3f => Ok(1),
        0x40..=0x3fff => Ok(2),
        0x4000..=0x3fff_ffff => Ok(4),
        0x4000_0000..=MAX => Ok(8),
        _ => Err(DemuxError::VarintOverflow(value)),
    }
}

/// Decode a varint from the front of `buf`, advancing past it
///
/// On error `buf` is left untouched.
pub fn decode<B: Buf>(buf: &mut B) -> Result<u64> {
    if !buf.has_remaining() {
        return Err(DemuxError::Varint {
            needed: 1,
            available: 0,
        });
    }
    let first = buf.chunk()[0];
    let len = 1usize << (first >> 6);
    if buf.remaining() < len {
        return Err(DemuxError::Varint {
            needed: len,
            available: buf.remaining(),
        });
    }

    let value = match len {
        1 => u64::from(buf.get_u8()),
        2 => u64::from(buf.get_u16() & 0x3fff),
        4 => u64::from(buf.get_u32() & 0x3fff_ffff),
        _ => buf.get_u64() & MAX,
    };
    Ok(value)
}

/// Encode `value` as a varint using the shortest form
pub fn encode<B: BufMut>(value: u64, buf: &mut B) -> Result<()> {
    match encoded_len(value)? {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(0x4000 | value as u16),
        4 => buf.put_u32(0x8000_0000 | value as u32),
        _ => buf.put_u64(0xc000_0000_0000_0000 | value),
    }
    Ok(())
}
