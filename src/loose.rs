//! Loose object storage.
//!
//! Each loose object is one compressed file at
//! `<objects>/<id[0..2]>/<id[2..40]>`, holding the ASCII header
//! `"<type> <size>\0"` followed by the raw payload. Nothing is cached:
//! the filesystem is the source of truth and every lookup re-checks
//! existence, matching the reference behavior of no watch-based
//! invalidation.
//!
//! Opening is two-phase: `open` inflates only enough to parse the header
//! (type and size), and `LooseReader::content` re-reads and inflates the
//! full payload on demand.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::inflate::{inflate_exact, inflate_prefix, InflateError};
use crate::object_id::{ObjectId, ObjectKind};

/// Safety allowance for the `"<type> <size>\0"` header.
const HEADER_MAX_BYTES: usize = 64;

/// Errors from loose object access.
#[derive(Debug)]
pub enum LooseError {
    /// File read failed (not including absence, which is a `None` result).
    Io(io::Error),
    /// Decompression failed.
    Inflate(InflateError),
    /// Malformed object header or payload.
    Corrupt { path: PathBuf, detail: &'static str },
}

impl fmt::Display for LooseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "loose object I/O error: {err}"),
            Self::Inflate(err) => write!(f, "loose object inflate error: {err}"),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupt loose object {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for LooseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Inflate(err) => Some(err),
            Self::Corrupt { .. } => None,
        }
    }
}

impl From<io::Error> for LooseError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Loose object store rooted at an objects directory.
#[derive(Clone, Debug)]
pub struct LooseStore {
    objects_dir: PathBuf,
}

impl LooseStore {
    /// Creates a store over `<objects_dir>`.
    #[must_use]
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    /// Returns the path a loose object with this id would occupy.
    #[must_use]
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.loose_parts();
        self.objects_dir.join(dir).join(file)
    }

    /// Returns true if a loose file exists for this id.
    ///
    /// Existence is re-checked per call; there is no cache to invalidate.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.path_for(id).is_file()
    }

    /// Opens a loose object, parsing only its header.
    ///
    /// Returns `Ok(None)` if no file exists for the id.
    ///
    /// # Errors
    /// Malformed headers (missing NUL, unknown type token, non-numeric
    /// size) are corruption; I/O and inflate failures propagate.
    pub fn open(&self, id: &ObjectId) -> Result<Option<LooseReader>, LooseError> {
        let path = self.path_for(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(LooseError::Io(err)),
        };

        let mut prefix = Vec::with_capacity(HEADER_MAX_BYTES * 2);
        inflate_prefix(&compressed, &mut prefix, HEADER_MAX_BYTES)
            .map_err(LooseError::Inflate)?;

        let (kind, size, header_len) = parse_header(&prefix, &path)?;

        Ok(Some(LooseReader {
            path,
            kind,
            size,
            header_len,
        }))
    }
}

/// Handle to an opened loose object.
///
/// Header fields are available without materialization; `content`
/// re-reads and inflates the file.
#[derive(Clone, Debug)]
pub struct LooseReader {
    path: PathBuf,
    kind: ObjectKind,
    size: u64,
    header_len: usize,
}

impl LooseReader {
    /// Returns the object kind from the header.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns the declared payload size from the header.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file this reader draws from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inflates and returns the raw payload (header stripped).
    ///
    /// # Errors
    /// A payload shorter or longer than the declared size is corruption.
    pub fn content(&self) -> Result<Vec<u8>, LooseError> {
        let compressed = fs::read(&self.path)?;

        let total = self.header_len + self.size as usize;
        let mut out = Vec::with_capacity(total);
        inflate_exact(&compressed, &mut out, total).map_err(|err| match err {
            InflateError::TruncatedInput | InflateError::LimitExceeded => LooseError::Corrupt {
                path: self.path.clone(),
                detail: "payload length differs from declared size",
            },
            other => LooseError::Inflate(other),
        })?;

        out.drain(..self.header_len);
        Ok(out)
    }
}

/// Parses `"<type> <size>\0"` from the inflated prefix.
///
/// Returns the kind, declared size, and header length including the NUL.
fn parse_header(
    prefix: &[u8],
    path: &Path,
) -> Result<(ObjectKind, u64, usize), LooseError> {
    let corrupt = |detail: &'static str| LooseError::Corrupt {
        path: path.to_path_buf(),
        detail,
    };

    let nul = memchr::memchr(0, prefix).ok_or_else(|| corrupt("missing header terminator"))?;
    let header = &prefix[..nul];

    let space = memchr::memchr(b' ', header).ok_or_else(|| corrupt("missing header separator"))?;
    let (token, rest) = header.split_at(space);

    let kind = ObjectKind::from_token(token).ok_or_else(|| corrupt("unknown object type"))?;
    let size = parse_decimal(&rest[1..]).ok_or_else(|| corrupt("invalid object size"))?;

    Ok((kind, size, nul + 1))
}

fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(value)
}
