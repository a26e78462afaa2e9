//! Tree entry parsing and path resolution.
//!
//! # Tree Object Format
//!
//! A tree payload is a concatenation of entries:
//! ```text
//! <mode> SP <name> NUL <20 raw id bytes>
//! ```
//! where `<mode>` is ASCII octal (e.g. "100644", "40000") and `<name>` is
//! non-empty, slash-free, and NUL-free.
//!
//! # Entry Modes
//!
//! The high 4 bits of the mode encode the entry type. Historical Git
//! versions created non-canonical blob modes (100664, 100600); the
//! classifier checks the type mask and the executable bit rather than
//! exact values.
//!
//! # Iterator Behavior
//!
//! The iterator is fused: after an error, subsequent calls return `None`
//! so partially parsed state never leaks.

use memchr::memchr;

use crate::errors::GitError;
use crate::object_id::{ObjectId, OID_RAW_LEN};

/// Classification of a tree entry's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeEntryKind {
    /// Subdirectory (mode 040000).
    Tree,
    /// Regular file (no execute bit).
    RegularFile,
    /// Executable file.
    ExecutableFile,
    /// Symbolic link (mode 120000).
    Symlink,
    /// Submodule pointer (mode 160000).
    Gitlink,
    /// Type bits match nothing known.
    Unknown,
}

impl TreeEntryKind {
    /// Returns true if this entry is a subtree.
    #[inline]
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }
}

/// A parsed tree entry (zero-copy reference into the tree payload).
#[derive(Clone, Copy, Debug)]
pub struct TreeEntry<'a> {
    /// Entry name, non-empty and slash-free.
    pub name: &'a [u8],
    /// Entry object id.
    pub id: ObjectId,
    /// Classified kind.
    pub kind: TreeEntryKind,
    /// Raw octal mode value.
    pub mode: u32,
}

/// Iterator over entries of a raw tree payload.
///
/// Yields entries in stored order (already sorted by Git). Fused after
/// the first error.
#[derive(Clone, Debug)]
pub struct TreeEntryIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TreeEntryIter<'a> {
    /// Creates an iterator over decompressed tree bytes (no object header).
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Fuses the iterator so partial state is never exposed after error.
    #[inline]
    fn fuse(&mut self) {
        self.pos = self.data.len();
    }

    /// Parses the next entry, advancing the position.
    ///
    /// Returns `Ok(None)` at end of data.
    pub fn next_entry(&mut self) -> Result<Option<TreeEntry<'a>>, GitError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let remaining = &self.data[self.pos..];

        let space = match memchr(b' ', remaining) {
            Some(idx) => idx,
            None => {
                self.fuse();
                return Err(GitError::corrupt_object("tree entry missing mode space"));
            }
        };
        let mode = match parse_octal_mode(&remaining[..space]) {
            Some(mode) => mode,
            None => {
                self.fuse();
                return Err(GitError::corrupt_object("tree entry mode is not octal"));
            }
        };

        let after_space = &remaining[space + 1..];
        let nul = match memchr(0, after_space) {
            Some(idx) => idx,
            None => {
                self.fuse();
                return Err(GitError::corrupt_object("tree entry missing name NUL"));
            }
        };
        let name = &after_space[..nul];
        if name.is_empty() {
            self.fuse();
            return Err(GitError::corrupt_object("tree entry name is empty"));
        }
        if memchr(b'/', name).is_some() {
            self.fuse();
            return Err(GitError::corrupt_object("tree entry name contains slash"));
        }

        let id_start = nul + 1;
        let Some(raw_id) = after_space.get(id_start..id_start + OID_RAW_LEN) else {
            self.fuse();
            return Err(GitError::corrupt_object("tree entry id truncated"));
        };
        let id = ObjectId::try_from_slice(raw_id).expect("20-byte slice");

        self.pos += space + 1 + id_start + OID_RAW_LEN;

        Ok(Some(TreeEntry {
            name,
            id,
            kind: classify_mode(mode),
            mode,
        }))
    }
}

impl<'a> Iterator for TreeEntryIter<'a> {
    type Item = Result<TreeEntry<'a>, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Finds the entry named `name` with a linear scan.
pub fn find_entry<'a>(data: &'a [u8], name: &[u8]) -> Result<Option<TreeEntry<'a>>, GitError> {
    let mut iter = TreeEntryIter::new(data);
    while let Some(entry) = iter.next_entry()? {
        if entry.name == name {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Parses ASCII octal mode bytes.
///
/// At most 7 digits: the largest canonical mode is 0o160000 (6 digits),
/// and 7 keeps shift-add far from u32 overflow.
#[inline]
fn parse_octal_mode(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 7 {
        return None;
    }
    let mut mode: u32 = 0;
    for &b in bytes {
        let digit = b.wrapping_sub(b'0');
        if digit > 7 {
            return None;
        }
        mode = (mode << 3) | u32::from(digit);
    }
    Some(mode)
}

/// Classifies a mode by its type bits, tolerant of non-canonical blobs.
#[inline]
fn classify_mode(mode: u32) -> TreeEntryKind {
    const S_IFMT: u32 = 0o170000;

    match mode & S_IFMT {
        0o040000 => TreeEntryKind::Tree,
        0o120000 => TreeEntryKind::Symlink,
        0o160000 => TreeEntryKind::Gitlink,
        0o100000 => {
            if mode & 0o100 != 0 {
                TreeEntryKind::ExecutableFile
            } else {
                TreeEntryKind::RegularFile
            }
        }
        _ => TreeEntryKind::Unknown,
    }
}
