//! Object store facade: loose storage, pack discovery, delta resolution.
//!
//! # Lookup Order
//! Loose storage has precedence over packs. Packs are probed in sorted
//! file-name order and the first index hit wins; an id duplicated across
//! packs always resolves from the same pack.
//!
//! # Delta Chains
//! Chains are collected iteratively from the outermost delta inward,
//! reading only entry headers, then applied from the terminal base
//! outward. Depth is bounded by [`ResolveLimits`]; a chain exceeding the
//! bound is treated as corrupt input, and resolution never recurses.
//!
//! An offset-delta base lives in the same pack at a backward offset. A
//! reference-delta base is named by id and re-enters the top-level lookup
//! order, so it may be loose or in another pack.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::delta;
use crate::errors::OdbError;
use crate::inflate::{inflate_exact, inflate_prefix};
use crate::loose::{LooseReader, LooseStore};
use crate::object_id::{ObjectId, ObjectKind};
use crate::pack::{EntryKind, PackFile};

/// Enough inflated prefix to hold the two leading delta size varints.
const DELTA_SIZE_PREFIX: usize = 32;

/// Bounds applied during resolution.
#[derive(Clone, Copy, Debug)]
pub struct ResolveLimits {
    /// Maximum number of delta links in one chain.
    pub max_delta_depth: usize,
}

impl Default for ResolveLimits {
    fn default() -> Self {
        Self {
            max_delta_depth: 4096,
        }
    }
}

/// Read-only object database over one objects directory.
#[derive(Debug)]
pub struct ObjectStore {
    loose: LooseStore,
    packs: Vec<PackFile>,
    limits: ResolveLimits,
}

impl ObjectStore {
    /// Opens a store rooted at an objects directory, discovering packs
    /// under `<objects>/pack/*.pack`.
    ///
    /// A missing pack directory means no packs, not an error. Pack files
    /// are opened eagerly so malformed packs fail here rather than on
    /// first lookup.
    pub fn open(objects_dir: impl Into<PathBuf>) -> Result<Self, OdbError> {
        Self::open_with_limits(objects_dir, ResolveLimits::default())
    }

    /// Opens a store with explicit resolution limits.
    pub fn open_with_limits(
        objects_dir: impl Into<PathBuf>,
        limits: ResolveLimits,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.into();
        let pack_paths = discover_packs(&objects_dir.join("pack"))?;

        let mut packs = Vec::with_capacity(pack_paths.len());
        for path in pack_paths {
            let pack = PackFile::open(&path)?;
            debug!(
                path = %path.display(),
                entries = pack.entry_count(),
                version = pack.version(),
                "opened pack"
            );
            packs.push(pack);
        }
        debug!(
            objects_dir = %objects_dir.display(),
            packs = packs.len(),
            "opened object store"
        );

        Ok(Self {
            loose: LooseStore::new(objects_dir),
            packs,
            limits,
        })
    }

    /// Returns the number of discovered packs.
    #[must_use]
    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Returns the discovered packs in probe order.
    #[must_use]
    pub fn packs(&self) -> &[PackFile] {
        &self.packs
    }

    /// Returns true if the id exists loose or in any pack.
    ///
    /// Existence only; nothing is inflated or validated.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.loose.contains(id) || self.packs.iter().any(|p| p.contains(id))
    }

    /// Resolves an id to a two-phase reader.
    ///
    /// Returns `Ok(None)` for absent ids. The reader carries the kind and
    /// final size without materializing content; for delta entries the
    /// kind comes from the terminal base and the size from the outermost
    /// delta's result-size varint.
    pub fn resolve(&self, id: &ObjectId) -> Result<Option<ObjectReader<'_>>, OdbError> {
        if let Some(reader) = self.loose.open(id)? {
            trace!(id = %id, source = "loose", "resolved object");
            let kind = reader.kind();
            let size = reader.size();
            return Ok(Some(ObjectReader {
                store: self,
                id: *id,
                kind,
                size,
                source: Source::Loose(reader),
            }));
        }

        for (pack_ix, pack) in self.packs.iter().enumerate() {
            let Some(entry) = pack.lookup(id)? else {
                continue;
            };
            let chain = self.collect_chain(pack_ix, entry.offset as u64)?;
            let kind = chain.base_kind();
            let size = self.chain_result_size(&chain)?;
            trace!(
                id = %id,
                source = "pack",
                depth = chain.links.len(),
                "resolved object"
            );
            return Ok(Some(ObjectReader {
                store: self,
                id: *id,
                kind,
                size,
                source: Source::Packed(chain),
            }));
        }

        Ok(None)
    }

    /// Resolves and materializes in one step.
    pub fn read(&self, id: &ObjectId) -> Result<Option<(ObjectKind, Vec<u8>)>, OdbError> {
        match self.resolve(id)? {
            Some(reader) => {
                let kind = reader.kind();
                Ok(Some((kind, reader.content()?)))
            }
            None => Ok(None),
        }
    }

    /// Walks a delta chain from an entry header outward, collecting links
    /// until the terminal base.
    fn collect_chain(&self, pack_ix: usize, offset: u64) -> Result<Chain, OdbError> {
        let mut links = Vec::new();
        let mut pack_ix = pack_ix;
        let mut offset = offset;

        loop {
            let header = self.packs[pack_ix].entry_header_at(offset)?;
            match header.kind {
                EntryKind::Whole(kind) => {
                    return Ok(Chain {
                        links,
                        base: ChainBase::Packed {
                            pack: pack_ix,
                            data_start: header.data_start,
                            size: header.size,
                            kind,
                        },
                    });
                }
                EntryKind::OfsDelta { base_offset } => {
                    self.push_link(&mut links, pack_ix, &header)?;
                    offset = base_offset;
                }
                EntryKind::RefDelta { base_id } => {
                    self.push_link(&mut links, pack_ix, &header)?;

                    // Named bases re-enter the top-level lookup order.
                    if let Some(reader) = self.loose.open(&base_id)? {
                        return Ok(Chain {
                            links,
                            base: ChainBase::Loose(reader),
                        });
                    }
                    let mut found = None;
                    for (ix, pack) in self.packs.iter().enumerate() {
                        if let Some(entry) = pack.lookup(&base_id)? {
                            found = Some((ix, entry.offset as u64));
                            break;
                        }
                    }
                    let Some((ix, off)) = found else {
                        return Err(OdbError::MissingDeltaBase { base: base_id });
                    };
                    pack_ix = ix;
                    offset = off;
                }
            }
        }
    }

    fn push_link(
        &self,
        links: &mut Vec<Link>,
        pack_ix: usize,
        header: &crate::pack::EntryHeader,
    ) -> Result<(), OdbError> {
        if links.len() >= self.limits.max_delta_depth {
            return Err(OdbError::DeltaChainTooDeep {
                depth: links.len() + 1,
                limit: self.limits.max_delta_depth,
            });
        }
        links.push(Link {
            pack: pack_ix,
            data_start: header.data_start,
            size: header.size,
        });
        Ok(())
    }

    /// Computes the final object size for a chain without materializing.
    ///
    /// A plain chain reports the base's declared size. A delta chain
    /// reads the outermost delta's result-size varint from a bounded
    /// prefix inflate.
    fn chain_result_size(&self, chain: &Chain) -> Result<u64, OdbError> {
        let Some(outer) = chain.links.first() else {
            return Ok(match &chain.base {
                ChainBase::Packed { size, .. } => *size,
                ChainBase::Loose(reader) => reader.size(),
            });
        };

        let compressed = self.packs[outer.pack].payload_from(outer.data_start);
        let mut prefix = Vec::with_capacity(DELTA_SIZE_PREFIX * 2);
        inflate_prefix(compressed, &mut prefix, DELTA_SIZE_PREFIX)?;
        let (_, result_size) = delta::delta_sizes(&prefix)?;
        Ok(result_size as u64)
    }

    /// Inflates a packed entry payload of a known uncompressed size.
    fn inflate_entry(
        &self,
        pack_ix: usize,
        data_start: usize,
        size: u64,
    ) -> Result<Vec<u8>, OdbError> {
        let compressed = self.packs[pack_ix].payload_from(data_start);
        let mut out = Vec::with_capacity(size as usize);
        inflate_exact(compressed, &mut out, size as usize)?;
        Ok(out)
    }
}

/// Scans a pack directory for `.pack` files, sorted by file name.
fn discover_packs(pack_dir: &Path) -> Result<Vec<PathBuf>, OdbError> {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(OdbError::Io(err)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(OdbError::Io)?.path();
        if path.extension().map_or(false, |ext| ext == "pack") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// One delta link: the compressed instruction stream location and its
/// uncompressed length.
#[derive(Clone, Copy, Debug)]
struct Link {
    pack: usize,
    data_start: usize,
    size: u64,
}

/// Terminal base of a delta chain.
#[derive(Debug)]
enum ChainBase {
    Packed {
        pack: usize,
        data_start: usize,
        size: u64,
        kind: ObjectKind,
    },
    Loose(LooseReader),
}

/// Collected delta chain, links ordered outermost first.
#[derive(Debug)]
struct Chain {
    links: Vec<Link>,
    base: ChainBase,
}

impl Chain {
    fn base_kind(&self) -> ObjectKind {
        match &self.base {
            ChainBase::Packed { kind, .. } => *kind,
            ChainBase::Loose(reader) => reader.kind(),
        }
    }
}

/// Where a resolved reader draws its bytes from.
#[derive(Debug)]
enum Source {
    Loose(LooseReader),
    Packed(Chain),
}

/// Two-phase handle to a resolved object.
///
/// Kind and size are available immediately; `content` materializes the
/// full payload, applying any delta chain.
#[derive(Debug)]
pub struct ObjectReader<'a> {
    store: &'a ObjectStore,
    id: ObjectId,
    kind: ObjectKind,
    size: u64,
    source: Source,
}

impl ObjectReader<'_> {
    /// Returns the resolved id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the object kind. For deltas this is the terminal base's
    /// kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns the final payload size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Materializes the payload, applying delta links from the terminal
    /// base outward.
    ///
    /// # Errors
    /// The materialized length is re-verified against [`size`]; any
    /// disagreement is corruption.
    ///
    /// [`size`]: Self::size
    pub fn content(&self) -> Result<Vec<u8>, OdbError> {
        let out = match &self.source {
            Source::Loose(reader) => reader.content()?,
            Source::Packed(chain) => {
                let mut out = match &chain.base {
                    ChainBase::Packed {
                        pack,
                        data_start,
                        size,
                        ..
                    } => self.store.inflate_entry(*pack, *data_start, *size)?,
                    ChainBase::Loose(reader) => reader.content()?,
                };
                for link in chain.links.iter().rev() {
                    let delta_bytes =
                        self.store.inflate_entry(link.pack, link.data_start, link.size)?;
                    out = delta::apply(&out, &delta_bytes)?;
                }
                out
            }
        };

        if out.len() as u64 != self.size {
            return Err(OdbError::SizeMismatch {
                declared: self.size,
                actual: out.len() as u64,
            });
        }
        Ok(out)
    }
}
