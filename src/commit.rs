//! Commit object decoding.
//!
//! Parses just enough of a commit payload for version computation: the
//! tree id and the ordered parent ids. The author, committer, and message
//! are carried as raw byte ranges; nothing inside them is interpreted.
//!
//! # Commit Object Format
//! ```text
//! tree <40 hex>\n
//! parent <40 hex>\n   (zero or more)
//! author <signature>\n
//! committer <signature>\n
//! [further headers, possibly multi-line]\n
//! \n
//! <message>
//! ```
//!
//! Extra headers (`gpgsig`, `encoding`, ...) are skipped, including their
//! space-indented continuation lines.

use crate::errors::GitError;
use crate::object_id::{ObjectId, OID_HEX_LEN};

/// A decoded commit.
#[derive(Clone, Debug)]
pub struct Commit {
    /// The commit's own id, as it was looked up.
    pub sha: ObjectId,
    /// The tree this commit points at.
    pub tree: ObjectId,
    /// Parent ids in stored order (empty for root commits).
    pub parents: Vec<ObjectId>,
    /// Raw author signature bytes (name, email, timestamp, zone).
    pub author: Vec<u8>,
    /// Raw committer signature bytes.
    pub committer: Vec<u8>,
    /// Raw message bytes (everything after the blank line).
    pub message: Vec<u8>,
}

impl Commit {
    /// The first parent, or `None` for a root commit.
    #[must_use]
    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }
}

/// Decodes a commit payload.
///
/// # Errors
/// Returns `CorruptObject` when the byte layout deviates from the format
/// above, and `InvalidObjectId` never: malformed hex inside a commit is
/// reported as corruption of the commit.
pub fn parse_commit(sha: ObjectId, data: &[u8]) -> Result<Commit, GitError> {
    let mut pos = 0usize;

    let tree = parse_id_line(data, &mut pos, b"tree ")?
        .ok_or(GitError::corrupt_object("commit missing tree line"))?;

    let mut parents = Vec::new();
    while let Some(parent) = parse_id_line(data, &mut pos, b"parent ")? {
        parents.push(parent);
    }

    let mut author = None;
    let mut committer = None;
    loop {
        let line = peek_line(data, pos)
            .ok_or(GitError::corrupt_object("commit ended before message"))?;
        if line.is_empty() {
            pos += 1; // the blank separator line
            break;
        }
        if let Some(rest) = line.strip_prefix(b"author ") {
            author = Some(rest.to_vec());
        } else if let Some(rest) = line.strip_prefix(b"committer ") {
            committer = Some(rest.to_vec());
        }
        // Other headers and continuation lines are skipped.
        pos += line.len() + 1;
    }

    let author = author.ok_or(GitError::corrupt_object("commit missing author line"))?;
    let committer =
        committer.ok_or(GitError::corrupt_object("commit missing committer line"))?;

    Ok(Commit {
        sha,
        tree,
        parents,
        author,
        committer,
        message: data[pos..].to_vec(),
    })
}

/// Parses one `"<prefix><40 hex>\n"` line if present at the cursor.
fn parse_id_line(
    data: &[u8],
    pos: &mut usize,
    prefix: &[u8],
) -> Result<Option<ObjectId>, GitError> {
    if !data[*pos..].starts_with(prefix) {
        return Ok(None);
    }
    let hex_start = *pos + prefix.len();
    let hex_end = hex_start + OID_HEX_LEN;
    let hex = data
        .get(hex_start..hex_end)
        .ok_or(GitError::corrupt_object("commit id line too short"))?;
    let id = ObjectId::parse_hex_bytes(hex)
        .map_err(|_| GitError::corrupt_object("commit id line is not hex"))?;
    if data.get(hex_end) != Some(&b'\n') {
        return Err(GitError::corrupt_object("commit id line missing newline"));
    }
    *pos = hex_end + 1;
    Ok(Some(id))
}

/// Returns the line starting at `pos` without its newline, or `None` when
/// the data ends without one.
fn peek_line(data: &[u8], pos: usize) -> Option<&[u8]> {
    let remaining = data.get(pos..)?;
    let newline = memchr::memchr(b'\n', remaining)?;
    Some(&remaining[..newline])
}
