//! Variable-length integer codecs used by the pack format.
//!
//! Three encodings appear in pack files and none are interchangeable:
//!
//! - **Entry header**: low 4 bits of the first byte seed the size, bits 4-6
//!   carry the type code, and continuation bytes contribute 7 bits each at
//!   shifts 4, 11, 18, ...
//! - **General LEB128**: little-endian base-128 with a continuation high
//!   bit; used for the base/result sizes at the head of a delta stream.
//! - **OFS_DELTA distance**: base-128 read most-significant-group first
//!   with a `+1` applied per continuation byte before the next shift. The
//!   adjustment is part of the on-disk format (`gitformat-pack(5)`); plain
//!   base-128 decoding produces wrong offsets for multi-byte distances.
//!
//! Truncated input is corruption, not a recoverable condition.

use std::fmt;

/// Maximum continuation bytes for a 64-bit varint.
const MAX_VARINT_BYTES: usize = 10; // ceil(64/7)

/// Errors from varint decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended mid-sequence.
    Truncated,
    /// Encoding exceeds 64 bits.
    Overflow,
}

impl fmt::Display for VarintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated varint"),
            Self::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarintError {}

/// Reads a general LEB128 varint as u64, advancing `pos`.
///
/// # Errors
/// `Truncated` if input ends mid-sequence, `Overflow` past 64 bits.
pub fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64, VarintError> {
    let mut shift: u32 = 0;
    let mut result: u64 = 0;

    for _ in 0..MAX_VARINT_BYTES {
        let b = *data.get(*pos).ok_or(VarintError::Truncated)?;
        *pos += 1;

        result |= ((b & 0x7f) as u64) << shift;
        if (b & 0x80) == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(VarintError::Overflow);
        }
    }
    Err(VarintError::Overflow)
}

/// Reads a pack entry header's type code and size varint, advancing `pos`.
///
/// Returns `(type_code, size)`. The type code occupies bits 4-6 of the
/// first byte and is not interpreted here; size bits accumulate at shifts
/// 4, 11, 18, ... while the continuation bit is set.
pub fn read_entry_header(data: &[u8], pos: &mut usize) -> Result<(u8, u64), VarintError> {
    let first = *data.get(*pos).ok_or(VarintError::Truncated)?;
    *pos += 1;

    let type_code = (first >> 4) & 0x07;
    let mut size: u64 = (first & 0x0f) as u64;
    let mut shift: u32 = 4;

    let mut byte = first;
    while (byte & 0x80) != 0 {
        byte = *data.get(*pos).ok_or(VarintError::Truncated)?;
        *pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
        if shift > 63 {
            return Err(VarintError::Overflow);
        }
    }

    Ok((type_code, size))
}

/// Reads an OFS_DELTA base distance, advancing `pos`.
///
/// Groups arrive most-significant first; each continuation adds one to the
/// accumulated value before the next 7-bit shift. The result is the
/// backward distance from the delta entry to its base.
pub fn read_ofs_distance(data: &[u8], pos: &mut usize) -> Result<u64, VarintError> {
    let mut c = *data.get(*pos).ok_or(VarintError::Truncated)?;
    *pos += 1;

    let mut val: u64 = (c & 0x7f) as u64;
    let mut bytes_read = 1usize;

    while (c & 0x80) != 0 {
        if bytes_read >= MAX_VARINT_BYTES {
            return Err(VarintError::Overflow);
        }
        c = *data.get(*pos).ok_or(VarintError::Truncated)?;
        *pos += 1;
        bytes_read += 1;
        val = val.checked_add(1).ok_or(VarintError::Overflow)? << 7;
        val |= (c & 0x7f) as u64;
    }

    Ok(val)
}

/// Encodes a general LEB128 varint.
#[must_use]
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// Encodes a pack entry header for `type_code` and `size`.
#[must_use]
pub fn encode_entry_header(type_code: u8, mut size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first = (type_code & 0x07) << 4;
    first |= (size & 0x0f) as u8;
    size >>= 4;
    if size != 0 {
        first |= 0x80;
    }
    out.push(first);
    while size != 0 {
        let mut byte = (size & 0x7f) as u8;
        size >>= 7;
        if size != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Encodes an OFS_DELTA base distance (must be nonzero).
#[must_use]
pub fn encode_ofs_distance(mut dist: u64) -> Vec<u8> {
    debug_assert!(dist > 0, "OFS distance must be positive");
    let mut bytes = Vec::new();
    bytes.push((dist & 0x7f) as u8);
    dist >>= 7;
    while dist > 0 {
        dist -= 1;
        bytes.push(((dist & 0x7f) as u8) | 0x80);
        dist >>= 7;
    }
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 129, 16383, 16384, 1 << 32, u64::MAX] {
            let encoded = encode_varint(value);
            let mut pos = 0;
            assert_eq!(read_varint(&encoded, &mut pos).unwrap(), value);
            assert_eq!(pos, encoded.len());
        }
    }

    #[test]
    fn varint_truncated_is_fatal() {
        // Continuation bit set with no following byte.
        let mut pos = 0;
        assert_eq!(
            read_varint(&[0x80], &mut pos),
            Err(VarintError::Truncated)
        );

        let mut pos = 0;
        assert_eq!(read_varint(&[], &mut pos), Err(VarintError::Truncated));
    }

    #[test]
    fn varint_overflow_rejected() {
        let mut pos = 0;
        assert_eq!(
            read_varint(&[0xff; 11], &mut pos),
            Err(VarintError::Overflow)
        );
    }

    #[test]
    fn entry_header_round_trip() {
        for (code, size) in [(1u8, 0u64), (3, 15), (3, 16), (4, 47), (2, 1 << 20), (6, 12345)] {
            let encoded = encode_entry_header(code, size);
            let mut pos = 0;
            let (got_code, got_size) = read_entry_header(&encoded, &mut pos).unwrap();
            assert_eq!(got_code, code);
            assert_eq!(got_size, size);
            assert_eq!(pos, encoded.len());
        }
    }

    #[test]
    fn entry_header_size_bit_layout() {
        // Size 0x1f: low nibble 0xf in the first byte, one continuation
        // byte contributing 0x1 at shift 4.
        let encoded = encode_entry_header(3, 0x1f);
        assert_eq!(encoded, vec![0xbf, 0x01]);
        let mut pos = 0;
        assert_eq!(read_entry_header(&encoded, &mut pos).unwrap(), (3, 0x1f));
    }

    #[test]
    fn entry_header_truncated() {
        let mut pos = 0;
        assert_eq!(
            read_entry_header(&[0x9f], &mut pos),
            Err(VarintError::Truncated)
        );
    }

    #[test]
    fn ofs_distance_round_trip() {
        for dist in [1u64, 127, 128, 129, 255, 256, 16511, 16512, 1 << 24, 1 << 31] {
            let encoded = encode_ofs_distance(dist);
            let mut pos = 0;
            assert_eq!(read_ofs_distance(&encoded, &mut pos).unwrap(), dist);
            assert_eq!(pos, encoded.len());
        }
    }

    #[test]
    fn ofs_distance_plus_one_adjustment() {
        // Two-byte encoding [0x80, 0x00] decodes to 128, not 0: the
        // continuation adds one before the shift. Plain base-128 would
        // decode the same bytes to 0.
        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0x80, 0x00], &mut pos).unwrap(), 128);

        // Smallest two-byte value follows directly from the largest
        // one-byte value.
        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0x7f], &mut pos).unwrap(), 127);
    }

    #[test]
    fn ofs_distance_truncated() {
        let mut pos = 0;
        assert_eq!(
            read_ofs_distance(&[0x81], &mut pos),
            Err(VarintError::Truncated)
        );
    }
}
