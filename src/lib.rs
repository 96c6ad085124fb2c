//! Read-only Git object database: loose objects, packs, and delta chains.
//!
//! ## Scope
//! This crate resolves content-addressed objects from an on-disk objects
//! directory: loose zlib-compressed files, pack files with their v2
//! indexes, and offset/reference delta chains, all behind one facade.
//! Nothing here writes; repacking, transport, and higher-level object
//! parsing live elsewhere.
//!
//! ## Key invariants
//! - Absence is `Ok(None)` everywhere; only malformed or unreadable data
//!   produces an error.
//! - Loose storage wins over packs; packs are probed in sorted file-name
//!   order and the first hit wins.
//! - Delta chains are collected iteratively with a configurable depth
//!   bound and applied from the terminal base outward.
//! - Materialized content is re-verified against the declared size.
//! - Unsupported layouts (index v1, 64-bit pack offsets) are rejected
//!   with errors distinct from corruption.
//!
//! ## Resolution flow
//! `ObjectId -> loose probe -> pack index lookup -> entry header decode
//! -> delta chain collection -> inflate + apply -> verified bytes`
//!
//! ## Notable entry points
//! - [`ObjectStore`] / [`ObjectReader`]: open a store, resolve ids,
//!   materialize content.
//! - [`compute_id`]: SHA-1 object identity over the canonical
//!   `"<type> <size>\0"` serialization.
//! - [`PackFile`] / [`PackIndex`]: direct access to a single pack and
//!   its index.

pub mod delta;
pub mod digest;
pub mod errors;
pub mod inflate;
pub mod loose;
pub mod object_id;
pub mod pack;
pub mod pack_idx;
pub mod store;
pub mod varint;

pub use digest::{compute_id, ContentDigest};
pub use errors::OdbError;
pub use loose::{LooseReader, LooseStore};
pub use object_id::{ObjectId, ObjectKind, ParseIdError, OID_HEX_LEN, OID_LEN};
pub use pack::{EntryHeader, EntryKind, PackFile};
pub use pack_idx::{PackIndex, PackIndexEntry};
pub use store::{ObjectReader, ObjectStore, ResolveLimits};
