//! Streaming SHA-1 content digest.
//!
//! Object identity on disk is SHA-1 over the canonical serialization
//! `"<type> <size>\0<payload>"`. SHA-1 is required for format
//! compatibility, not a free choice; switching algorithms changes every
//! object id.

use sha1::{Digest, Sha1};

use crate::object_id::{ObjectId, OID_LEN};

/// Incremental SHA-1 digest producing 20-byte object ids.
///
/// `finish()` finalizes and resets the internal state so the instance can
/// be reused for the next object.
#[derive(Clone, Debug, Default)]
pub struct ContentDigest {
    inner: Sha1,
}

impl ContentDigest {
    /// Creates a fresh digest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Finalizes the digest and resets state for reuse.
    #[must_use]
    pub fn finish(&mut self) -> ObjectId {
        let digest = self.inner.finalize_reset();
        let mut bytes = [0u8; OID_LEN];
        bytes.copy_from_slice(&digest);
        ObjectId::from_bytes(bytes)
    }
}

/// Computes the object id for in-memory content of the given kind.
///
/// Hashes `"<type> <size>\0"` followed by the raw payload, matching the
/// loose-object header serialization byte for byte.
#[must_use]
pub fn compute_id(kind: crate::object_id::ObjectKind, payload: &[u8]) -> ObjectId {
    let mut digest = ContentDigest::new();
    digest.update(kind.as_str().as_bytes());
    digest.update(b" ");
    digest.update(payload.len().to_string().as_bytes());
    digest.update(b"\0");
    digest.update(payload);
    digest.finish()
}
