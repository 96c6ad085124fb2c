//! Pack file (`.pack`) parsing and entry access.
//!
//! A pack bundles many objects behind a 12-byte header: the ASCII magic
//! `"PACK"`, a big-endian format version, and a big-endian entry count.
//! Entries sit at byte offsets supplied by the companion index; each
//! starts with a type/size varint header, followed for delta entries by a
//! base reference (backward distance or 20-byte id), followed by the
//! compressed payload.
//!
//! The companion `.idx` path is derived from the `.pack` path by
//! extension substitution; that pairing is a structural invariant of the
//! on-disk layout, not configuration. The index's fanout total must match
//! the pack's declared entry count.
//!
//! Pack bytes are memory-mapped once per instance and treated as
//! immutable; the trailing pack checksum is excluded from the data region
//! and never verified.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::object_id::{ObjectId, ObjectKind, OID_LEN};
use crate::pack_idx::{IdxError, PackIndex, PackIndexEntry};
use crate::varint::{read_entry_header, read_ofs_distance, VarintError};

/// Pack header: magic + version + entry count.
const PACK_HEADER_SIZE: usize = 12;
/// Pack magic bytes.
const PACK_MAGIC: [u8; 4] = *b"PACK";

/// Errors from pack file parsing.
#[derive(Debug)]
pub enum PackError {
    /// Pack file read failed.
    Io(io::Error),
    /// Pack data is malformed at the given offset.
    Corrupt {
        path: PathBuf,
        offset: u64,
        detail: &'static str,
    },
    /// Pack format version is not supported.
    UnsupportedVersion { path: PathBuf, version: u32 },
    /// Path does not carry the `.pack` extension the index derivation
    /// relies on.
    BadPackPath { path: PathBuf },
    /// Companion index failed to open or validate.
    Idx(IdxError),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "pack I/O error: {err}"),
            Self::Corrupt {
                path,
                offset,
                detail,
            } => write!(
                f,
                "corrupt pack {} at offset {offset}: {detail}",
                path.display()
            ),
            Self::UnsupportedVersion { path, version } => write!(
                f,
                "unsupported pack version {version} in {}",
                path.display()
            ),
            Self::BadPackPath { path } => {
                write!(f, "not a .pack path: {}", path.display())
            }
            Self::Idx(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Idx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PackError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<IdxError> for PackError {
    fn from(err: IdxError) -> Self {
        Self::Idx(err)
    }
}

/// Entry kind decoded from a pack entry header.
///
/// The on-disk type codes 0 (undefined) and 5 (reserved) never construct
/// a value; both fail at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Non-delta object stored whole.
    Whole(ObjectKind),
    /// Delta whose base lives at a backward offset in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by id and may live anywhere.
    RefDelta { base_id: ObjectId },
}

/// Parsed pack entry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    /// Uncompressed payload size. For delta entries this is the size of
    /// the delta instruction stream, not the reconstructed object.
    pub size: u64,
    /// Offset where the compressed payload begins.
    pub data_start: usize,
    /// Entry kind with any base reference.
    pub kind: EntryKind,
}

/// Memory-mapped pack file with its companion index.
#[derive(Debug)]
pub struct PackFile {
    path: PathBuf,
    mmap: Mmap,
    data_end: usize,
    version: u32,
    entry_count: u32,
    index: PackIndex,
}

impl PackFile {
    /// Opens a pack and its derived `.idx`, validating both headers and
    /// the entry-count invariant between them.
    ///
    /// # Errors
    /// Fails on I/O errors, a bad magic, unsupported versions, a path
    /// without the `.pack` extension, or index validation failures.
    pub fn open(pack_path: impl Into<PathBuf>) -> Result<Self, PackError> {
        let path = pack_path.into();
        if path.extension().map_or(true, |ext| ext != "pack") {
            return Err(PackError::BadPackPath { path });
        }
        let idx_path = path.with_extension("idx");

        let file = File::open(&path)?;
        // SAFETY: pack files are treated as immutable for the life of the
        // mapping; repacking under a live store is outside the supported
        // lifecycle.
        let mmap = unsafe { Mmap::map(&file)? };
        advise_sequential(&file, &mmap);

        let corrupt = |offset: u64, detail: &'static str| PackError::Corrupt {
            path: path.clone(),
            offset,
            detail,
        };

        if mmap.len() < PACK_HEADER_SIZE + OID_LEN {
            return Err(corrupt(0, "file too small for header and trailer"));
        }
        if mmap[0..4] != PACK_MAGIC {
            return Err(corrupt(0, "bad pack signature"));
        }
        let version = u32::from_be_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
        if version != 2 && version != 3 {
            return Err(PackError::UnsupportedVersion { path, version });
        }
        let entry_count = u32::from_be_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);

        let index = PackIndex::open(idx_path, entry_count)?;
        let data_end = mmap.len() - OID_LEN;

        Ok(Self {
            path,
            mmap,
            data_end,
            version,
            entry_count,
            index,
        })
    }

    /// Returns the pack format version.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the declared entry count.
    #[inline]
    #[must_use]
    pub const fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Returns the pack file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the companion index.
    #[must_use]
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Returns true if the id is present in this pack's index.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Looks up an id in the companion index.
    pub fn lookup(&self, id: &ObjectId) -> Result<Option<PackIndexEntry>, PackError> {
        Ok(self.index.lookup(id)?)
    }

    /// Parses the entry header at a pack byte offset.
    ///
    /// For delta entries, `data_start` points past the base reference so
    /// the compressed delta payload can be read directly.
    ///
    /// # Errors
    /// Out-of-range offsets, truncated headers, undefined/reserved type
    /// codes, and OFS distances reaching before the pack header are all
    /// corruption.
    pub fn entry_header_at(&self, offset: u64) -> Result<EntryHeader, PackError> {
        let corrupt = |detail: &'static str| PackError::Corrupt {
            path: self.path.clone(),
            offset,
            detail,
        };

        let start = offset as usize;
        if start < PACK_HEADER_SIZE || start >= self.data_end {
            return Err(corrupt("entry offset out of range"));
        }

        let data = &self.mmap[..self.data_end];
        let mut pos = start;
        let (type_code, size) = read_entry_header(data, &mut pos).map_err(|err| match err {
            VarintError::Truncated => corrupt("truncated entry header"),
            VarintError::Overflow => corrupt("entry size varint overflow"),
        })?;

        let kind = match type_code {
            1 => EntryKind::Whole(ObjectKind::Commit),
            2 => EntryKind::Whole(ObjectKind::Tree),
            3 => EntryKind::Whole(ObjectKind::Blob),
            4 => EntryKind::Whole(ObjectKind::Tag),
            6 => {
                let distance =
                    read_ofs_distance(data, &mut pos).map_err(|err| match err {
                        VarintError::Truncated => corrupt("truncated OFS base distance"),
                        VarintError::Overflow => corrupt("OFS base distance overflow"),
                    })?;
                let base_offset = offset
                    .checked_sub(distance)
                    .ok_or_else(|| corrupt("OFS base before start of pack"))?;
                if (base_offset as usize) < PACK_HEADER_SIZE {
                    return Err(corrupt("OFS base before start of pack"));
                }
                EntryKind::OfsDelta { base_offset }
            }
            7 => {
                let end = pos + OID_LEN;
                if end > self.data_end {
                    return Err(corrupt("truncated REF base id"));
                }
                let base_id = ObjectId::try_from_slice(&self.mmap[pos..end])
                    .ok_or_else(|| corrupt("truncated REF base id"))?;
                pos = end;
                EntryKind::RefDelta { base_id }
            }
            0 => return Err(corrupt("undefined object type")),
            5 => return Err(corrupt("reserved object type")),
            _ => return Err(corrupt("invalid object type")),
        };

        Ok(EntryHeader {
            size,
            data_start: pos,
            kind,
        })
    }

    /// Returns the data region from `start` to the trailer, for payload
    /// inflation.
    #[inline]
    #[must_use]
    pub fn payload_from(&self, start: usize) -> &[u8] {
        debug_assert!(start <= self.data_end, "payload start out of range");
        &self.mmap[start..self.data_end]
    }
}

#[cfg(unix)]
fn advise_sequential(file: &File, mapped: &Mmap) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is valid for the duration of the call and
    // the mapping pointer/length come from a live Mmap. Both calls are
    // advisory; failures are ignored.
    unsafe {
        #[cfg(target_os = "linux")]
        let _ = libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
        #[cfg(not(target_os = "linux"))]
        let _ = file;
        let _ = libc::madvise(
            mapped.as_ptr() as *mut libc::c_void,
            mapped.len(),
            libc::MADV_SEQUENTIAL,
        );
    }
}

#[cfg(not(unix))]
fn advise_sequential(_file: &File, _mapped: &Mmap) {}
