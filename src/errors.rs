//! Error types for the Git object reader.
//!
//! A single taxonomy covers discovery, lookup, and decode failures. The
//! enum is `#[non_exhaustive]` to allow adding variants without breaking
//! callers; consumers should include a fallback match arm.
//!
//! # Design Notes
//! - Corruption variants carry a static `detail` string naming the
//!   structural violation; they are not stable for machine parsing.
//! - I/O errors preserve their source to keep diagnostics actionable.
//! - A missing loose object file is not an error (lookup falls through to
//!   the pack set); only an id absent from every source surfaces as
//!   `ObjectNotFound`.

use std::fmt;
use std::io;

use crate::object_id::ObjectId;
use crate::object_type::ObjectType;

/// Errors from repository discovery, object lookup, and object decoding.
#[derive(Debug)]
#[non_exhaustive]
pub enum GitError {
    /// Discovery failed: no `.git` directory or file on the walk up, and
    /// the starting path is not a bare repository.
    NotARepository,
    /// I/O error during file operations.
    Io(io::Error),
    /// Malformed hex object id (wrong length or non-hex byte).
    InvalidObjectId,
    /// No pack or loose file contains the object.
    ObjectNotFound(ObjectId),
    /// Object exists but has a different type than requested.
    ObjectTypeMismatch {
        expected: ObjectType,
        actual: ObjectType,
    },
    /// Pack index file violates the v2 layout.
    CorruptIndex { detail: &'static str },
    /// Pack file entry or frame violates the pack format.
    CorruptPack { detail: &'static str },
    /// Loose object frame or header is malformed.
    CorruptLooseObject { detail: &'static str },
    /// Commit, tree, or reference payload violates its byte layout.
    CorruptObject { detail: &'static str },
    /// Index version is not 2, or pack version is not 2 or 3.
    UnsupportedFormat { detail: &'static str },
    /// Delta script contains the reserved zero command byte.
    InvalidDeltaInstruction,
}

impl GitError {
    /// Constructs an index corruption error with a static detail string.
    #[inline]
    pub const fn corrupt_index(detail: &'static str) -> Self {
        Self::CorruptIndex { detail }
    }

    /// Constructs a pack corruption error with a static detail string.
    #[inline]
    pub const fn corrupt_pack(detail: &'static str) -> Self {
        Self::CorruptPack { detail }
    }

    /// Constructs a loose object corruption error with a static detail string.
    #[inline]
    pub const fn corrupt_loose(detail: &'static str) -> Self {
        Self::CorruptLooseObject { detail }
    }

    /// Constructs an object payload corruption error with a static detail string.
    #[inline]
    pub const fn corrupt_object(detail: &'static str) -> Self {
        Self::CorruptObject { detail }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotARepository => write!(f, "not a Git repository"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::InvalidObjectId => write!(f, "malformed object id"),
            Self::ObjectNotFound(id) => write!(f, "object not found: {id}"),
            Self::ObjectTypeMismatch { expected, actual } => {
                write!(f, "object type mismatch: expected {expected}, got {actual}")
            }
            Self::CorruptIndex { detail } => write!(f, "corrupt pack index: {detail}"),
            Self::CorruptPack { detail } => write!(f, "corrupt pack: {detail}"),
            Self::CorruptLooseObject { detail } => {
                write!(f, "corrupt loose object: {detail}")
            }
            Self::CorruptObject { detail } => write!(f, "corrupt object: {detail}"),
            Self::UnsupportedFormat { detail } => {
                write!(f, "unsupported format: {detail}")
            }
            Self::InvalidDeltaInstruction => {
                write!(f, "delta script contains reserved zero command")
            }
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GitError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
