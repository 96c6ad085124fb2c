//! Binary delta application.
//!
//! Applies a copy/insert instruction stream to a base buffer, producing
//! the target buffer. The format is Git's pack delta encoding: two leading
//! LEB128 varints carry the expected base length and the result length,
//! followed by opcodes until the stream is exhausted.
//!
//! - Opcode high bit set: copy from the base. Bits 0-3 select which
//!   little-endian offset bytes follow, bits 4-6 which size bytes. A
//!   decoded size of zero means 0x10000, a quirk of the format.
//! - Opcode nonzero with high bit clear: insert the next `opcode` bytes
//!   from the delta stream verbatim.
//! - Opcode zero: reserved, always fatal.
//!
//! The base length check is a hard integrity gate, and the final output
//! length is re-verified against the declared result length.

use std::fmt;

use crate::varint::{read_varint, VarintError};

/// Copy size encoding of zero means 64 KiB.
const COPY_SIZE_ZERO: usize = 0x10000;

/// Delta apply error taxonomy.
#[derive(Debug, PartialEq, Eq)]
pub enum DeltaError {
    /// Delta stream ended mid-instruction.
    Truncated,
    /// A size varint exceeded 64 bits.
    VarintOverflow,
    /// Declared base length differs from the supplied base buffer.
    BaseSizeMismatch { declared: usize, actual: usize },
    /// Output length differs from the declared result length.
    ResultSizeMismatch { declared: usize, actual: usize },
    /// Reserved opcode zero encountered.
    BadCommandZero,
    /// Copy range extends past the end of the base buffer.
    CopyOutOfRange,
    /// Output would exceed the declared result length.
    OutputOverrun,
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "delta truncated"),
            Self::VarintOverflow => write!(f, "delta varint overflow"),
            Self::BaseSizeMismatch { declared, actual } => {
                write!(f, "delta base size mismatch: declared {declared}, base is {actual}")
            }
            Self::ResultSizeMismatch { declared, actual } => {
                write!(f, "delta result size mismatch: declared {declared}, produced {actual}")
            }
            Self::BadCommandZero => write!(f, "delta command zero"),
            Self::CopyOutOfRange => write!(f, "delta copy out of range"),
            Self::OutputOverrun => write!(f, "delta output overrun"),
        }
    }
}

impl std::error::Error for DeltaError {}

impl From<VarintError> for DeltaError {
    fn from(err: VarintError) -> Self {
        match err {
            VarintError::Truncated => Self::Truncated,
            VarintError::Overflow => Self::VarintOverflow,
        }
    }
}

/// Parses the base and result sizes from the head of a delta stream.
///
/// Only the two leading varints are read; the instruction stream is not
/// validated.
pub fn delta_sizes(delta: &[u8]) -> Result<(usize, usize), DeltaError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)? as usize;
    let result_size = read_varint(delta, &mut pos)? as usize;
    Ok((base_size, result_size))
}

/// Applies a delta instruction stream to `base`, yielding the target bytes.
///
/// The result buffer is preallocated from the declared result length.
///
/// # Errors
/// Any malformed instruction, size mismatch, or out-of-range copy is
/// fatal; no partial output is returned.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)? as usize;
    if base_size != base.len() {
        return Err(DeltaError::BaseSizeMismatch {
            declared: base_size,
            actual: base.len(),
        });
    }
    let result_size = read_varint(delta, &mut pos)? as usize;

    let mut out = Vec::with_capacity(result_size);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if (cmd & 0x80) != 0 {
            let (off, size) = decode_copy_params(delta, &mut pos, cmd)?;

            let end = off.checked_add(size).ok_or(DeltaError::CopyOutOfRange)?;
            if end > base.len() {
                return Err(DeltaError::CopyOutOfRange);
            }
            if out.len() + size > result_size {
                return Err(DeltaError::OutputOverrun);
            }
            out.extend_from_slice(&base[off..end]);
        } else if cmd != 0 {
            let size = cmd as usize;
            if pos + size > delta.len() {
                return Err(DeltaError::Truncated);
            }
            if out.len() + size > result_size {
                return Err(DeltaError::OutputOverrun);
            }
            out.extend_from_slice(&delta[pos..pos + size]);
            pos += size;
        } else {
            return Err(DeltaError::BadCommandZero);
        }
    }

    if out.len() != result_size {
        return Err(DeltaError::ResultSizeMismatch {
            declared: result_size,
            actual: out.len(),
        });
    }

    Ok(out)
}

/// Decodes copy parameters for a delta copy instruction.
///
/// Low opcode bits select which little-endian offset bytes are present,
/// high bits which size bytes. A decoded size of zero encodes 0x10000.
fn decode_copy_params(
    delta: &[u8],
    pos: &mut usize,
    cmd: u8,
) -> Result<(usize, usize), DeltaError> {
    let mut next = |shift: usize, acc: &mut usize| -> Result<(), DeltaError> {
        let b = *delta.get(*pos).ok_or(DeltaError::Truncated)?;
        *pos += 1;
        *acc |= (b as usize) << shift;
        Ok(())
    };

    let mut off: usize = 0;
    if (cmd & 0x01) != 0 {
        next(0, &mut off)?;
    }
    if (cmd & 0x02) != 0 {
        next(8, &mut off)?;
    }
    if (cmd & 0x04) != 0 {
        next(16, &mut off)?;
    }
    if (cmd & 0x08) != 0 {
        next(24, &mut off)?;
    }

    let mut size: usize = 0;
    if (cmd & 0x10) != 0 {
        next(0, &mut size)?;
    }
    if (cmd & 0x20) != 0 {
        next(8, &mut size)?;
    }
    if (cmd & 0x40) != 0 {
        next(16, &mut size)?;
    }

    if size == 0 {
        size = COPY_SIZE_ZERO;
    }

    Ok((off, size))
}
