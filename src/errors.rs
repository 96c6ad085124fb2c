//! Store-level error type.
//!
//! Each storage layer reports failures through its own enum; `OdbError`
//! folds them into one surface for the resolution facade. Absence is
//! never an error anywhere in the crate: lookups that find nothing return
//! `Ok(None)` and only malformed or unreadable data reaches this type.

use std::fmt;
use std::io;

use crate::delta::DeltaError;
use crate::inflate::InflateError;
use crate::loose::LooseError;
use crate::object_id::ParseIdError;
use crate::pack::PackError;
use crate::pack_idx::IdxError;

/// Unified error for object resolution.
#[derive(Debug)]
pub enum OdbError {
    /// Filesystem access failed.
    Io(io::Error),
    /// A loose object was unreadable or malformed.
    Loose(LooseError),
    /// A pack file was unreadable or malformed.
    Pack(PackError),
    /// A pack index was unreadable or malformed.
    Idx(IdxError),
    /// A compressed payload failed to inflate.
    Inflate(InflateError),
    /// A delta stream was malformed or inconsistent with its base.
    Delta(DeltaError),
    /// An object id string failed to parse.
    ParseId(ParseIdError),
    /// A delta chain exceeded the configured depth bound.
    DeltaChainTooDeep { depth: usize, limit: usize },
    /// A delta base was named but could not be found anywhere.
    MissingDeltaBase { base: crate::object_id::ObjectId },
    /// A materialized payload's length disagreed with the declared size.
    SizeMismatch { declared: u64, actual: u64 },
}

impl fmt::Display for OdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "object store I/O error: {err}"),
            Self::Loose(err) => write!(f, "{err}"),
            Self::Pack(err) => write!(f, "{err}"),
            Self::Idx(err) => write!(f, "{err}"),
            Self::Inflate(err) => write!(f, "{err}"),
            Self::Delta(err) => write!(f, "{err}"),
            Self::ParseId(err) => write!(f, "{err}"),
            Self::DeltaChainTooDeep { depth, limit } => {
                write!(f, "delta chain depth {depth} exceeds limit {limit}")
            }
            Self::MissingDeltaBase { base } => {
                write!(f, "delta base {base} not found in any storage")
            }
            Self::SizeMismatch { declared, actual } => write!(
                f,
                "object declares {declared} bytes but materialized {actual}"
            ),
        }
    }
}

impl std::error::Error for OdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Loose(err) => Some(err),
            Self::Pack(err) => Some(err),
            Self::Idx(err) => Some(err),
            Self::Inflate(err) => Some(err),
            Self::Delta(err) => Some(err),
            Self::ParseId(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for OdbError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<LooseError> for OdbError {
    fn from(err: LooseError) -> Self {
        Self::Loose(err)
    }
}

impl From<PackError> for OdbError {
    fn from(err: PackError) -> Self {
        Self::Pack(err)
    }
}

impl From<IdxError> for OdbError {
    fn from(err: IdxError) -> Self {
        Self::Idx(err)
    }
}

impl From<InflateError> for OdbError {
    fn from(err: InflateError) -> Self {
        Self::Inflate(err)
    }
}

impl From<DeltaError> for OdbError {
    fn from(err: DeltaError) -> Self {
        Self::Delta(err)
    }
}

impl From<ParseIdError> for OdbError {
    fn from(err: ParseIdError) -> Self {
        Self::ParseId(err)
    }
}
