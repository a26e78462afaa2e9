//! Reference resolution: HEAD, loose refs, packed-refs.
//!
//! HEAD lives in the per-worktree git directory; named refs live under
//! the shared common directory, either as loose files or as lines in
//! `packed-refs`. Resolution order for a name is loose first, then a
//! packed-refs scan for an exact match.
//!
//! A symbolic HEAD whose target does not exist anywhere resolves to the
//! empty id: that is an unborn branch, not an error.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::errors::GitError;
use crate::object_id::{ObjectId, OID_HEX_LEN};

/// Upper bound for HEAD and loose ref files.
const MAX_REF_FILE_BYTES: u64 = 4096;
/// Upper bound for packed-refs.
const MAX_PACKED_REFS_BYTES: u64 = 16 * 1024 * 1024;

/// A resolved or symbolic reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    /// A direct object id (detached HEAD, loose ref content).
    Direct(ObjectId),
    /// A name pointing at another reference, e.g. `refs/heads/master`.
    Symbolic(String),
}

impl Reference {
    /// The target name of a symbolic reference.
    #[must_use]
    pub fn symbolic_name(&self) -> Option<&str> {
        match self {
            Self::Symbolic(name) => Some(name),
            Self::Direct(_) => None,
        }
    }

    /// The id of a direct reference.
    #[must_use]
    pub fn direct_id(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }
}

/// Resolver over one repository's reference files.
#[derive(Debug)]
pub struct RefResolver {
    git_dir: PathBuf,
    common_dir: PathBuf,
}

impl RefResolver {
    pub(crate) fn new(git_dir: PathBuf, common_dir: PathBuf) -> Self {
        Self {
            git_dir,
            common_dir,
        }
    }

    /// Reads HEAD: symbolic when a branch is checked out, direct when
    /// detached.
    pub fn head(&self) -> Result<Reference, GitError> {
        let bytes = read_bounded(&self.git_dir.join("HEAD"), MAX_REF_FILE_BYTES)?;

        if let Some(target) = bytes.strip_prefix(b"ref: ") {
            let target = trim_line(target);
            let name = std::str::from_utf8(target)
                .map_err(|_| GitError::corrupt_object("symbolic HEAD target is not UTF-8"))?;
            if name.is_empty() {
                return Err(GitError::corrupt_object("symbolic HEAD target is empty"));
            }
            return Ok(Reference::Symbolic(name.to_owned()));
        }

        let id = parse_hex_line(&bytes)
            .ok_or(GitError::corrupt_object("HEAD is neither symbolic nor hex"))?;
        Ok(Reference::Direct(id))
    }

    /// Resolves a reference to an id.
    ///
    /// A symbolic reference with no existing target yields `EMPTY`
    /// (unborn branch).
    pub fn resolve(&self, reference: &Reference) -> Result<ObjectId, GitError> {
        match reference {
            Reference::Direct(id) => Ok(*id),
            Reference::Symbolic(name) => {
                Ok(self.resolve_name(name)?.unwrap_or(ObjectId::EMPTY))
            }
        }
    }

    /// Resolves HEAD all the way to an id (`EMPTY` for unborn branches).
    pub fn head_id(&self) -> Result<ObjectId, GitError> {
        let head = self.head()?;
        self.resolve(&head)
    }

    /// Looks up a named reference: loose file first, then packed-refs.
    pub fn resolve_name(&self, name: &str) -> Result<Option<ObjectId>, GitError> {
        let loose_path = self.common_dir.join(name);
        match read_bounded(&loose_path, MAX_REF_FILE_BYTES) {
            Ok(bytes) => {
                let id = parse_hex_line(&bytes)
                    .ok_or(GitError::corrupt_object("loose ref is not a hex id"))?;
                return Ok(Some(id));
            }
            Err(GitError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        self.scan_packed_refs(name)
    }

    /// Scans packed-refs for an exact name match.
    ///
    /// Comment lines and `^` peel lines are skipped; each remaining line
    /// is `"<40 hex> <name>"`.
    fn scan_packed_refs(&self, name: &str) -> Result<Option<ObjectId>, GitError> {
        let path = self.common_dir.join("packed-refs");
        let bytes = match read_bounded(&path, MAX_PACKED_REFS_BYTES) {
            Ok(bytes) => bytes,
            Err(GitError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(err) => return Err(err),
        };

        for line in bytes.split(|&b| b == b'\n') {
            let line = trim_line(line);
            if line.is_empty() || line[0] == b'#' || line[0] == b'^' {
                continue;
            }
            if line.len() <= OID_HEX_LEN + 1 || line[OID_HEX_LEN] != b' ' {
                return Err(GitError::corrupt_object("malformed packed-refs line"));
            }
            if &line[OID_HEX_LEN + 1..] == name.as_bytes() {
                let id = ObjectId::parse_hex_bytes(&line[..OID_HEX_LEN])
                    .map_err(|_| GitError::corrupt_object("malformed packed-refs id"))?;
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

/// Parses a full file as one trimmed 40-hex id line.
fn parse_hex_line(bytes: &[u8]) -> Option<ObjectId> {
    ObjectId::parse_hex_bytes(trim_line(bytes)).ok()
}

/// Trims trailing CR/LF and surrounding spaces from a line.
fn trim_line(mut bytes: &[u8]) -> &[u8] {
    while bytes
        .last()
        .is_some_and(|&b| matches!(b, b'\n' | b'\r' | b' ' | b'\t'))
    {
        bytes = &bytes[..bytes.len() - 1];
    }
    while bytes
        .first()
        .is_some_and(|&b| matches!(b, b' ' | b'\t'))
    {
        bytes = &bytes[1..];
    }
    bytes
}

/// Reads a file with a size cap checked against metadata first.
fn read_bounded(path: &Path, max_bytes: u64) -> Result<Vec<u8>, GitError> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if metadata.len() > max_bytes {
        return Err(GitError::corrupt_object("reference file too large"));
    }

    let mut buffer = Vec::with_capacity(metadata.len() as usize);
    file.take(max_bytes).read_to_end(&mut buffer)?;
    Ok(buffer)
}
