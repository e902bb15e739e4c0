//! LEB128 variable-length integers.
//!
//! Unsigned (ULEB128) and signed (SLEB128) little-endian base-128 encodings. Writers
//! emit through a [`ByteSink`], so the same call works for the size probe and the real
//! pass. Readers return the decoded value together with the number of bytes consumed.

use ras::{ByteSink, RasError};
use thiserror::Error;

/// Longest encoding of a 64-bit value
pub const MAX_LEB128_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Leb128Error {
    #[error("LEB128 value is truncated")]
    Truncated,
    #[error("LEB128 value does not fit in {bits} bits")]
    Overflow { bits: u32 },
}

fn encode_unsigned(mut value: u64, out: &mut [u8; MAX_LEB128_LEN]) -> usize {
    let mut len = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out[len] = byte;
            return len + 1;
        }
        out[len] = byte | 0x80;
        len += 1;
    }
}

fn encode_signed(mut value: i64, out: &mut [u8; MAX_LEB128_LEN]) -> usize {
    let mut len = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out[len] = byte;
            return len + 1;
        }
        out[len] = byte | 0x80;
        len += 1;
    }
}

pub fn write_uleb128_u64<S: ByteSink + ?Sized>(sink: &mut S, value: u64) -> Result<usize, RasError> {
    let mut buf = [0u8; MAX_LEB128_LEN];
    let len = encode_unsigned(value, &mut buf);
    sink.emit(&buf[..len])?;
    Ok(len)
}

pub fn write_uleb128_u32<S: ByteSink + ?Sized>(sink: &mut S, value: u32) -> Result<usize, RasError> {
    write_uleb128_u64(sink, u64::from(value))
}

pub fn write_sleb128_i64<S: ByteSink + ?Sized>(sink: &mut S, value: i64) -> Result<usize, RasError> {
    let mut buf = [0u8; MAX_LEB128_LEN];
    let len = encode_signed(value, &mut buf);
    sink.emit(&buf[..len])?;
    Ok(len)
}

/// Encoded length of `value` as ULEB128
pub fn uleb128_len(value: u64) -> usize {
    let mut buf = [0u8; MAX_LEB128_LEN];
    encode_unsigned(value, &mut buf)
}

/// Encoded length of `value` as SLEB128
pub fn sleb128_len(value: i64) -> usize {
    let mut buf = [0u8; MAX_LEB128_LEN];
    encode_signed(value, &mut buf)
}

fn read_unsigned(bytes: &[u8], bits: u32) -> Result<(u64, usize), Leb128Error> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_LEB128_LEN {
            return Err(Leb128Error::Overflow { bits });
        }
        let payload = u64::from(byte & 0x7f);
        if shift == 63 && payload > 1 {
            return Err(Leb128Error::Overflow { bits });
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            if bits < 64 && result >> bits != 0 {
                return Err(Leb128Error::Overflow { bits });
            }
            return Ok((result, i + 1));
        }
        shift += 7;
    }
    Err(Leb128Error::Truncated)
}

pub fn read_uleb128_u64(bytes: &[u8]) -> Result<(u64, usize), Leb128Error> {
    read_unsigned(bytes, 64)
}

pub fn read_uleb128_u32(bytes: &[u8]) -> Result<(u32, usize), Leb128Error> {
    let (value, len) = read_unsigned(bytes, 32)?;
    Ok((value as u32, len))
}

pub fn read_sleb128_i64(bytes: &[u8]) -> Result<(i64, usize), Leb128Error> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_LEB128_LEN {
            return Err(Leb128Error::Overflow { bits: 64 });
        }
        if shift == 63 && byte != 0x00 && byte != 0x7f {
            return Err(Leb128Error::Overflow { bits: 64 });
        }
        result |= i64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok((result, i + 1));
        }
    }
    Err(Leb128Error::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uleb(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_uleb128_u64(&mut out, value).unwrap();
        out
    }

    fn sleb(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_sleb128_i64(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_known_unsigned_encodings() {
        assert_eq!(uleb(0), [0x00]);
        assert_eq!(uleb(127), [0x7f]);
        assert_eq!(uleb(128), [0x80, 0x01]);
        assert_eq!(uleb(624_485), [0xe5, 0x8e, 0x26]);
        assert_eq!(uleb(u64::MAX).len(), MAX_LEB128_LEN);
    }

    #[test]
    fn test_known_signed_encodings() {
        assert_eq!(sleb(0), [0x00]);
        assert_eq!(sleb(-1), [0x7f]);
        assert_eq!(sleb(63), [0x3f]);
        assert_eq!(sleb(64), [0xc0, 0x00]);
        assert_eq!(sleb(-64), [0x40]);
        assert_eq!(sleb(-123_456), [0xc0, 0xbb, 0x78]);
        assert_eq!(sleb(i64::MIN).len(), MAX_LEB128_LEN);
    }

    #[test]
    fn test_length_helpers_agree_with_writers() {
        for v in [0u64, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(uleb128_len(v), uleb(v).len());
        }
        for v in [0i64, -1, 63, 64, -64, -65, i64::from(i32::MIN), i64::MAX] {
            assert_eq!(sleb128_len(v), sleb(v).len());
        }
    }

    #[test]
    fn test_decode_reports_consumed_length() {
        let bytes = [0xe5, 0x8e, 0x26, 0xff];
        assert_eq!(read_uleb128_u64(&bytes), Ok((624_485, 3)));
        assert_eq!(read_sleb128_i64(&[0xc0, 0xbb, 0x78]), Ok((-123_456, 3)));
        assert_eq!(read_sleb128_i64(&[0x40]), Ok((-64, 1)));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(read_uleb128_u32(&[]), Err(Leb128Error::Truncated));
        assert_eq!(read_uleb128_u32(&[0x80, 0x80]), Err(Leb128Error::Truncated));
        assert_eq!(
            read_uleb128_u32(&[0x80, 0x80, 0x80, 0x80, 0x10]),
            Err(Leb128Error::Overflow { bits: 32 })
        );
        assert_eq!(read_uleb128_u32(&[0xff, 0xff, 0xff, 0xff, 0x0f]), Ok((u32::MAX, 5)));
        let too_long = [0x80u8; 11];
        assert_eq!(read_uleb128_u64(&too_long), Err(Leb128Error::Overflow { bits: 64 }));
    }

    #[test]
    fn test_extreme_signed_values_decode() {
        assert_eq!(read_sleb128_i64(&sleb(i64::MIN)), Ok((i64::MIN, MAX_LEB128_LEN)));
        assert_eq!(read_sleb128_i64(&sleb(i64::MAX)), Ok((i64::MAX, MAX_LEB128_LEN)));
        assert_eq!(read_uleb128_u64(&uleb(u64::MAX)), Ok((u64::MAX, MAX_LEB128_LEN)));
    }
}
