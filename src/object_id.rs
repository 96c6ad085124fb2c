//! Object ID and object kind types.
//!
//! `ObjectId` is fixed-size, zero-heap storage for a 20-byte SHA-1 object
//! identifier with stable layout. Hex parsing is case-insensitive; the
//! canonical rendering is lowercase.
//!
//! # Ordering Semantics
//! `ObjectId` compares lexicographically on the raw bytes, which matches
//! the sorted order of the pack index SHA table.

use std::fmt;
use std::str::FromStr;

/// SHA-1 object ID length in bytes.
pub const OID_LEN: usize = 20;
/// SHA-1 object ID length in hex characters.
pub const OID_HEX_LEN: usize = 40;

/// Fixed-size 20-byte object identifier.
///
/// # Invariants
/// - Always exactly 20 bytes; there is no null/absent state.
/// - `Display` renders lowercase hex; parsing accepts mixed case.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OID_LEN]);

/// Error from parsing a hex object ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseIdError {
    /// Input was not exactly 40 characters.
    BadLength { len: usize },
    /// Input contained a non-hex character.
    BadHexDigit { byte: u8 },
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength { len } => {
                write!(f, "object id must be {OID_HEX_LEN} hex chars, got {len}")
            }
            Self::BadHexDigit { byte } => {
                write!(f, "invalid hex digit {:?} in object id", *byte as char)
            }
        }
    }
}

impl std::error::Error for ParseIdError {}

impl ObjectId {
    /// Creates an `ObjectId` from raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OID_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an `ObjectId` from a slice, returning `None` if the length
    /// is not exactly 20 bytes.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; OID_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Parses a 40-character hex string, accepting upper or lower case.
    ///
    /// # Errors
    /// Returns `ParseIdError` on wrong length or non-hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIdError> {
        let hex = hex.as_bytes();
        if hex.len() != OID_HEX_LEN {
            return Err(ParseIdError::BadLength { len: hex.len() });
        }

        let mut bytes = [0u8; OID_LEN];
        for (i, out) in bytes.iter_mut().enumerate() {
            let hi = hex_val(hex[i * 2])?;
            let lo = hex_val(hex[i * 2 + 1])?;
            *out = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Returns the raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    /// Returns the lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(OID_HEX_LEN);
        for &b in &self.0 {
            out.push(hex_digit(b >> 4));
            out.push(hex_digit(b & 0x0f));
        }
        out
    }

    /// Splits the hex form into the loose-object directory and file name
    /// components (`id[0..2]`, `id[2..40]`).
    #[must_use]
    pub fn loose_parts(&self) -> (String, String) {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        (dir.to_owned(), file.to_owned())
    }

    /// Returns the first byte of the digest (the fanout bucket).
    #[inline]
    #[must_use]
    pub const fn first_byte(&self) -> u8 {
        self.0[0]
    }
}

impl FromStr for ObjectId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

#[inline]
fn hex_val(b: u8) -> Result<u8, ParseIdError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(ParseIdError::BadHexDigit { byte: b }),
    }
}

#[inline]
fn hex_digit(val: u8) -> char {
    debug_assert!(val < 16);
    char::from_digit(val as u32, 16).unwrap_or('?')
}

/// Resolved object kind.
///
/// Delta entries never surface this type to callers; a delta's kind is the
/// kind of the terminal base object in its chain. The pack-internal delta
/// and reserved type codes live in `pack::EntryKind`, decoded once at
/// header-parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Returns the header token for this kind (`"blob"` etc.).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Parses a loose-object header token.
    #[must_use]
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"commit" => Some(Self::Commit),
            b"tree" => Some(Self::Tree),
            b"blob" => Some(Self::Blob),
            b"tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
