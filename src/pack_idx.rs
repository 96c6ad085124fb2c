//! Pack index (`.idx`) v2 parsing and lookup.
//!
//! # Layout (v2)
//! ```text
//! +----------------+
//! | Magic (4B)     |  0xff 't' 'O' 'c'
//! | Version (4B)   |  big-endian 2
//! +----------------+
//! | Fanout (1024B) |  256 * u32 BE cumulative counts
//! +----------------+
//! | SHA Table      |  N * 20 bytes, sorted ascending
//! +----------------+
//! | CRC Table      |  N * 4 bytes
//! +----------------+
//! | Offset Table   |  N * 4 bytes (MSB set = 64-bit indirection)
//! +----------------+
//! | Pack Checksum  |  20 bytes
//! | Idx Checksum   |  20 bytes
//! +----------------+
//! ```
//!
//! The SHA table is streamed into an id-to-ordinal map on first lookup
//! (once-guarded, shared read-only afterwards); CRC and offset values are
//! read per lookup at `table_start + ordinal * 4`. The fanout table is
//! validated for monotonicity but not used to guide search: the hash map
//! returns identical results without the binary-search narrowing.
//!
//! 64-bit offsets (packs over 4 GB) are detected and rejected as
//! unsupported rather than misread.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;

use crate::object_id::{ObjectId, OID_LEN};

/// Pack index v2 magic bytes.
const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
/// Only supported index version.
const IDX_VERSION: u32 = 2;
/// Header size: magic + version.
const IDX_HEADER_SIZE: usize = 8;
/// Fanout table size in bytes.
const FANOUT_SIZE: usize = 256 * 4;
/// Trailing pack and index checksums.
const TRAILER_SIZE: usize = 2 * OID_LEN;
/// MSB flag marking a 64-bit offset indirection.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Errors from pack index parsing and lookup.
#[derive(Debug)]
pub enum IdxError {
    /// Index file read failed.
    Io(io::Error),
    /// Index file is corrupt or malformed.
    Corrupt { path: PathBuf, detail: &'static str },
    /// File lacks the v2 magic; legacy v1 indexes are not supported.
    LegacyLayout { path: PathBuf },
    /// Index version is not supported.
    UnsupportedVersion { path: PathBuf, version: u32 },
    /// Entry uses the 64-bit offset extension, which is not supported.
    LargeOffsetUnsupported { path: PathBuf, ordinal: u32 },
    /// Fanout total disagrees with the pack's declared entry count.
    EntryCountMismatch { declared: u32, fanout: u32 },
}

impl fmt::Display for IdxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "pack index I/O error: {err}"),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupt pack index {}: {detail}", path.display())
            }
            Self::LegacyLayout { path } => write!(
                f,
                "pack index {} has no v2 magic (legacy v1 layout is unsupported)",
                path.display()
            ),
            Self::UnsupportedVersion { path, version } => write!(
                f,
                "unsupported pack index version {version} in {} (expected 2)",
                path.display()
            ),
            Self::LargeOffsetUnsupported { path, ordinal } => write!(
                f,
                "pack index {} entry {ordinal} uses a 64-bit offset (packs over 4 GB unsupported)",
                path.display()
            ),
            Self::EntryCountMismatch { declared, fanout } => write!(
                f,
                "pack declares {declared} entries but index fanout counts {fanout}"
            ),
        }
    }
}

impl std::error::Error for IdxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for IdxError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// One resolved index entry.
///
/// `ordinal` is the position in the sorted SHA table and the join key
/// into the CRC and offset tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackIndexEntry {
    pub id: ObjectId,
    pub ordinal: u32,
    pub crc32: u32,
    pub offset: u32,
}

/// Memory-mapped pack index with lazy id-to-ordinal lookup.
#[derive(Debug)]
pub struct PackIndex {
    path: PathBuf,
    mmap: Mmap,
    entry_count: u32,
    sha_table: usize,
    crc_table: usize,
    offset_table: usize,
    by_id: OnceLock<HashMap<ObjectId, u32>>,
}

impl PackIndex {
    /// Opens and validates an index file against the pack's declared
    /// entry count.
    ///
    /// # Errors
    /// Fails on I/O errors, malformed layout, unsupported versions, or a
    /// fanout total that disagrees with `declared_count`.
    pub fn open(path: impl Into<PathBuf>, declared_count: u32) -> Result<Self, IdxError> {
        let path = path.into();
        let file = File::open(&path)?;
        // SAFETY: index files are treated as immutable for the life of
        // the mapping; concurrent rewrites are outside the supported
        // lifecycle.
        let mmap = unsafe { Mmap::map(&file)? };

        let corrupt = |detail: &'static str| IdxError::Corrupt {
            path: path.clone(),
            detail,
        };

        let data: &[u8] = &mmap;
        if data.len() < IDX_HEADER_SIZE + FANOUT_SIZE + TRAILER_SIZE {
            return Err(corrupt("file too small"));
        }
        if data[0..4] != IDX_MAGIC {
            return Err(IdxError::LegacyLayout { path: path.clone() });
        }
        let version = read_be_u32(data, 4);
        if version != IDX_VERSION {
            return Err(IdxError::UnsupportedVersion {
                path: path.clone(),
                version,
            });
        }

        let fanout = &data[IDX_HEADER_SIZE..IDX_HEADER_SIZE + FANOUT_SIZE];
        let entry_count = validate_fanout(fanout).map_err(|detail| IdxError::Corrupt {
            path: path.clone(),
            detail,
        })?;
        if entry_count != declared_count {
            return Err(IdxError::EntryCountMismatch {
                declared: declared_count,
                fanout: entry_count,
            });
        }

        let n = entry_count as usize;
        let sha_table = IDX_HEADER_SIZE + FANOUT_SIZE;
        let crc_table = sha_table + n * OID_LEN;
        let offset_table = crc_table + n * 4;
        let tables_end = offset_table + n * 4;

        // A 64-bit offset extension table may sit between the offset
        // table and the trailer; its presence alone is tolerated, but any
        // entry pointing into it fails at lookup.
        if data.len() < tables_end + TRAILER_SIZE {
            return Err(corrupt("tables extend past end of file"));
        }

        Ok(Self {
            path,
            mmap,
            entry_count,
            sha_table,
            crc_table,
            offset_table,
            by_id: OnceLock::new(),
        })
    }

    /// Returns the number of indexed entries.
    #[inline]
    #[must_use]
    pub const fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Returns the index file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the id is present in this index.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.by_id().contains_key(id)
    }

    /// Looks up an entry, reading its CRC and offset from the parallel
    /// tables.
    ///
    /// Returns `Ok(None)` for absent ids.
    ///
    /// # Errors
    /// `LargeOffsetUnsupported` if the offset entry carries the 64-bit
    /// indirection flag.
    pub fn lookup(&self, id: &ObjectId) -> Result<Option<PackIndexEntry>, IdxError> {
        let Some(&ordinal) = self.by_id().get(id) else {
            return Ok(None);
        };

        let crc32 = read_be_u32(&self.mmap, self.crc_table + ordinal as usize * 4);
        let offset_raw = read_be_u32(&self.mmap, self.offset_table + ordinal as usize * 4);

        if offset_raw & LARGE_OFFSET_FLAG != 0 {
            return Err(IdxError::LargeOffsetUnsupported {
                path: self.path.clone(),
                ordinal,
            });
        }

        Ok(Some(PackIndexEntry {
            id: *id,
            ordinal,
            crc32,
            offset: offset_raw,
        }))
    }

    /// Returns the id-to-ordinal map, building it from the SHA table on
    /// first use.
    ///
    /// `OnceLock` guarantees a single build even under concurrent first
    /// lookups; afterwards the map is shared read-only.
    fn by_id(&self) -> &HashMap<ObjectId, u32> {
        self.by_id.get_or_init(|| {
            let mut map = HashMap::with_capacity(self.entry_count as usize);
            for ordinal in 0..self.entry_count {
                let start = self.sha_table + ordinal as usize * OID_LEN;
                let id = ObjectId::try_from_slice(&self.mmap[start..start + OID_LEN])
                    .expect("SHA table slice is exactly 20 bytes");
                map.insert(id, ordinal);
            }
            map
        })
    }
}

/// Validates fanout monotonicity and returns the total count
/// (`fanout[255]`).
fn validate_fanout(fanout: &[u8]) -> Result<u32, &'static str> {
    debug_assert_eq!(fanout.len(), FANOUT_SIZE);

    let mut prev = 0u32;
    for i in 0..256 {
        let val = read_be_u32(fanout, i * 4);
        if val < prev {
            return Err("fanout not monotonic");
        }
        prev = val;
    }
    Ok(prev)
}

#[inline]
fn read_be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
