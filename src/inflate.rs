//! Bounded DEFLATE inflation for loose objects and pack entry payloads.
//!
//! Compressed streams in both storages are zlib-framed, but this reader
//! discards the 2-byte zlib header and inflates the remainder as a raw
//! DEFLATE stream. The skip is part of this implementation's stream
//! framing and applies uniformly to loose files and pack payloads; the
//! trailing Adler-32 checksum is never read or verified.
//!
//! # Caller Expectations
//! - `input` must begin at the 2-byte zlib header.
//! - Output caps must be chosen by the caller; exceeding one is an error,
//!   not a truncation.

use std::cell::RefCell;
use std::fmt;

use flate2::{Decompress, FlushDecompress, Status};

/// Zlib stream header bytes discarded before raw inflation.
const ZLIB_HEADER_LEN: usize = 2;

/// Internal inflate buffer size.
const INFLATE_BUF_SIZE: usize = 64 * 1024;

thread_local! {
    static INFLATE_DECOMPRESS: RefCell<Decompress> = RefCell::new(Decompress::new(false));
    static INFLATE_BUF: RefCell<[u8; INFLATE_BUF_SIZE]> =
        const { RefCell::new([0u8; INFLATE_BUF_SIZE]) };
}

/// Runs an inflate operation using per-thread scratch buffers.
///
/// Reuses a thread-local `Decompress` and output buffer to avoid per-call
/// allocations. Not re-entrant on the same thread.
fn with_inflate_scratch<F, R>(f: F) -> R
where
    F: FnOnce(&mut Decompress, &mut [u8]) -> R,
{
    INFLATE_DECOMPRESS.with(|de| {
        INFLATE_BUF.with(|buf| {
            let mut de = de.borrow_mut();
            de.reset(false);
            let mut buf = buf.borrow_mut();
            f(&mut de, &mut *buf)
        })
    })
}

/// Inflate error taxonomy.
#[derive(Debug, PartialEq, Eq)]
pub enum InflateError {
    /// Input shorter than the 2-byte stream header.
    MissingHeader,
    /// Output would exceed the caller's cap.
    LimitExceeded,
    /// Stream ended before producing the expected output.
    TruncatedInput,
    /// Decoder made no progress on non-empty input.
    Stalled,
    /// Backend decompression failure (corrupt stream).
    Backend,
}

impl fmt::Display for InflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "compressed stream shorter than its header"),
            Self::LimitExceeded => write!(f, "inflate limit exceeded"),
            Self::TruncatedInput => write!(f, "truncated compressed input"),
            Self::Stalled => write!(f, "inflate stalled"),
            Self::Backend => write!(f, "inflate backend error"),
        }
    }
}

impl std::error::Error for InflateError {}

/// Inflate a stream with a hard output cap.
///
/// Returns the number of input bytes consumed, including the skipped
/// 2-byte header. The output buffer is cleared before writing; on error it
/// may hold a partial prefix that callers should discard.
pub fn inflate_limited(
    input: &[u8],
    out: &mut Vec<u8>,
    max_out: usize,
) -> Result<usize, InflateError> {
    out.clear();
    let body = strip_header(input)?;

    with_inflate_scratch(|de, buf| {
        let mut in_pos: usize = 0;

        loop {
            let before_in = de.total_in() as usize;
            let before_out = de.total_out() as usize;

            let status = de
                .decompress(&body[in_pos..], buf, FlushDecompress::None)
                .map_err(|_| InflateError::Backend)?;

            let consumed = de.total_in() as usize - before_in;
            let produced = de.total_out() as usize - before_out;
            in_pos += consumed;

            if produced != 0 {
                if out.len() + produced > max_out {
                    return Err(InflateError::LimitExceeded);
                }
                out.extend_from_slice(&buf[..produced]);
            }

            match status {
                Status::StreamEnd => return Ok(ZLIB_HEADER_LEN + in_pos),
                Status::Ok => {
                    if consumed == 0 && produced == 0 {
                        if in_pos >= body.len() {
                            return Err(InflateError::TruncatedInput);
                        }
                        return Err(InflateError::Stalled);
                    }
                }
                Status::BufError => {
                    if in_pos >= body.len() {
                        return Err(InflateError::TruncatedInput);
                    }
                }
            }
        }
    })
}

/// Inflate a stream expecting exactly `expected` output bytes.
///
/// Returns the number of input bytes consumed. Short streams are
/// `TruncatedInput`; long ones are `LimitExceeded`.
pub fn inflate_exact(
    input: &[u8],
    out: &mut Vec<u8>,
    expected: usize,
) -> Result<usize, InflateError> {
    let consumed = inflate_limited(input, out, expected)?;
    if out.len() != expected {
        return Err(InflateError::TruncatedInput);
    }
    Ok(consumed)
}

/// Inflate only until at least `want` bytes are available or the stream
/// ends, whichever comes first.
///
/// Used to read small fixed-position fields (loose headers, delta size
/// varints) without materializing the full object. The output may exceed
/// `want` by up to one internal chunk.
pub fn inflate_prefix(
    input: &[u8],
    out: &mut Vec<u8>,
    want: usize,
) -> Result<(), InflateError> {
    out.clear();
    let body = strip_header(input)?;

    with_inflate_scratch(|de, buf| {
        let mut in_pos: usize = 0;

        loop {
            if out.len() >= want {
                return Ok(());
            }

            let before_in = de.total_in() as usize;
            let before_out = de.total_out() as usize;

            let status = de
                .decompress(&body[in_pos..], buf, FlushDecompress::None)
                .map_err(|_| InflateError::Backend)?;

            let consumed = de.total_in() as usize - before_in;
            let produced = de.total_out() as usize - before_out;
            in_pos += consumed;

            if produced != 0 {
                out.extend_from_slice(&buf[..produced]);
            }

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok => {
                    if consumed == 0 && produced == 0 {
                        if in_pos >= body.len() {
                            return Err(InflateError::TruncatedInput);
                        }
                        return Err(InflateError::Stalled);
                    }
                }
                Status::BufError => {
                    if in_pos >= body.len() {
                        return Err(InflateError::TruncatedInput);
                    }
                }
            }
        }
    })
}

#[inline]
fn strip_header(input: &[u8]) -> Result<&[u8], InflateError> {
    input
        .get(ZLIB_HEADER_LEN..)
        .ok_or(InflateError::MissingHeader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn inflates_after_header_skip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let compressed = compress(data);

        let mut out = Vec::with_capacity(data.len());
        inflate_limited(&compressed, &mut out, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn consumed_covers_header_and_deflate_body() {
        let data = b"abc";
        let compressed = compress(data);

        let mut out = Vec::with_capacity(8);
        let consumed = inflate_limited(&compressed, &mut out, 8).unwrap();
        // Everything except the 4-byte Adler-32 trailer, which raw
        // inflation never reads.
        assert_eq!(consumed, compressed.len() - 4);
    }

    #[test]
    fn limit_exceeded_is_fatal() {
        let data = vec![0x41u8; 256];
        let compressed = compress(&data);

        let mut out = Vec::with_capacity(16);
        assert_eq!(
            inflate_limited(&compressed, &mut out, 16),
            Err(InflateError::LimitExceeded)
        );
    }

    #[test]
    fn exact_rejects_short_output() {
        let data = b"short";
        let compressed = compress(data);

        let mut out = Vec::with_capacity(64);
        assert_eq!(
            inflate_exact(&compressed, &mut out, 64),
            Err(InflateError::TruncatedInput)
        );
        out.clear();
        inflate_exact(&compressed, &mut out, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn truncated_stream_detected() {
        let data = b"some payload that compresses into more than a few bytes";
        let mut compressed = compress(data);
        compressed.truncate(compressed.len() / 2);

        let mut out = Vec::with_capacity(data.len());
        assert_eq!(
            inflate_limited(&compressed, &mut out, data.len()),
            Err(InflateError::TruncatedInput)
        );
    }

    #[test]
    fn missing_header_rejected() {
        let mut out = Vec::new();
        assert_eq!(
            inflate_limited(&[0x78], &mut out, 16),
            Err(InflateError::MissingHeader)
        );
    }

    #[test]
    fn prefix_stops_early_without_error() {
        let data = vec![0x42u8; 200_000];
        let compressed = compress(&data);

        let mut out = Vec::new();
        inflate_prefix(&compressed, &mut out, 32).unwrap();
        assert!(out.len() >= 32);
        assert!(out.iter().all(|&b| b == 0x42));
    }

    #[test]
    fn prefix_tolerates_short_streams() {
        let data = b"tiny";
        let compressed = compress(data);

        let mut out = Vec::new();
        inflate_prefix(&compressed, &mut out, 64).unwrap();
        assert_eq!(out, data);
    }
}
