//! Repository discovery and the object-reading facade.
//!
//! Discovery walks upward from a starting path looking for `.git`:
//! - a `.git` directory is the git dir itself;
//! - a `.git` file carries a `gitdir: <path>` pointer (linked worktree);
//! - failing both, a starting path that itself looks like a git dir
//!   (`HEAD` plus `objects/`) opens as a bare repository.
//!
//! The common directory equals the git dir unless a `commondir` file
//! redirects it (linked worktrees share the main repository's object
//! store this way). Both pointers may be relative.
//!
//! # Ownership
//! The repository owns its pack set, loose reader, object cache, and ref
//! resolver. Dropping it releases every pooled handle, mapped index view,
//! and cached buffer. A repository is intentionally single-threaded
//! (`Rc`/`RefCell` internals); callers wanting parallelism open one
//! repository per thread over the same on-disk files.
//!
//! # Trust Model
//! Repository contents (`.git` files, `commondir`) are trusted; paths are
//! followed wherever they point, including symlinks, matching Git.

use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::commit::{parse_commit, Commit};
use crate::errors::GitError;
use crate::loose::LooseObjectReader;
use crate::object_cache::ObjectCache;
use crate::object_id::ObjectId;
use crate::object_stream::ObjectStream;
use crate::object_type::ObjectType;
use crate::pack::BaseResolver;
use crate::pack_set::PackSet;
use crate::refs::{RefResolver, Reference};
use crate::tree::find_entry;

/// Upper bound for `.git` and `commondir` pointer files.
const MAX_POINTER_FILE_BYTES: u64 = 4096;

/// Structured open options.
#[derive(Clone, Copy, Debug)]
pub struct RepoOptions {
    /// Use the memory-mapped pack index implementation.
    pub use_mapped_index: bool,
    /// Upper bound on cached object bytes; `None` is unbounded.
    pub cache_limit_bytes: Option<u64>,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            use_mapped_index: true,
            cache_limit_bytes: None,
        }
    }
}

/// A read-only handle over one on-disk Git repository.
#[derive(Debug)]
pub struct Repository {
    git_dir: PathBuf,
    common_dir: PathBuf,
    objects_dir: PathBuf,
    work_dir: Option<PathBuf>,
    refs: RefResolver,
    loose: LooseObjectReader,
    packs: PackSet,
}

impl Repository {
    /// Opens the repository containing `path`, with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GitError> {
        Self::open_with(path, RepoOptions::default())
    }

    /// Opens the repository containing `path`.
    ///
    /// `path` may be anywhere inside the worktree; discovery walks upward.
    ///
    /// # Errors
    /// Returns `NotARepository` when no `.git` is found on the walk and
    /// the starting path is not a bare repository.
    pub fn open_with(path: impl AsRef<Path>, options: RepoOptions) -> Result<Self, GitError> {
        let layout = discover(path.as_ref())?;

        let objects_dir = layout.common_dir.join("objects");
        if !is_dir(&objects_dir) {
            return Err(GitError::NotARepository);
        }

        let cache = Rc::new(RefCell::new(ObjectCache::new(options.cache_limit_bytes)));
        let refs = RefResolver::new(layout.git_dir.clone(), layout.common_dir.clone());
        let loose = LooseObjectReader::new(objects_dir.clone());
        let packs = PackSet::new(&objects_dir, options.use_mapped_index, cache);

        Ok(Self {
            git_dir: layout.git_dir,
            common_dir: layout.common_dir,
            objects_dir,
            work_dir: layout.work_dir,
            refs,
            loose,
            packs,
        })
    }

    /// The per-worktree metadata directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The shared metadata directory (equals `git_dir` outside linked
    /// worktrees).
    #[must_use]
    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// The object store, `<common_dir>/objects`.
    #[must_use]
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// The checkout root; `None` for bare repositories.
    #[must_use]
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Reads HEAD as a symbolic or direct reference.
    pub fn head(&self) -> Result<Reference, GitError> {
        self.refs.head()
    }

    /// Resolves HEAD to its commit, or `None` for an unborn branch.
    pub fn head_commit(&self) -> Result<Option<Commit>, GitError> {
        let id = self.refs.head_id()?;
        if id.is_empty() {
            return Ok(None);
        }
        self.get_commit(id).map(Some)
    }

    /// Resolves a fully-qualified reference name (e.g. `refs/heads/master`).
    pub fn resolve_reference(&self, name: &str) -> Result<Option<ObjectId>, GitError> {
        self.refs.resolve_name(name)
    }

    /// Reads an object as a byte stream of known length.
    ///
    /// The `EMPTY` id is "not requested" and yields `Ok(None)` without
    /// touching storage. An id absent from every source is
    /// `ObjectNotFound`; a present object of the wrong type is
    /// `ObjectTypeMismatch`.
    pub fn get_object(
        &self,
        id: ObjectId,
        expected: ObjectType,
    ) -> Result<Option<ObjectStream>, GitError> {
        self.get_object_filtered(id, Some(expected))
    }

    /// Reads a commit object and decodes its headers.
    pub fn get_commit(&self, id: ObjectId) -> Result<Commit, GitError> {
        let stream = self
            .get_object(id, ObjectType::Commit)?
            .ok_or(GitError::ObjectNotFound(id))?;
        let data = stream.read_to_vec()?;
        parse_commit(id, &data)
    }

    /// Resolves a slash-separated path within a tree to an entry id.
    ///
    /// Returns `EMPTY` when any component is absent. An empty path
    /// resolves to the tree itself.
    pub fn get_tree_entry(&self, tree: ObjectId, path: &str) -> Result<ObjectId, GitError> {
        let mut current = tree;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();

        while let Some(component) = components.next() {
            if current.is_empty() {
                return Ok(ObjectId::EMPTY);
            }
            let stream = self
                .get_object(current, ObjectType::Tree)?
                .ok_or(GitError::ObjectNotFound(current))?;
            let data = stream.read_to_vec()?;

            let Some(entry) = find_entry(&data, component.as_bytes())? else {
                return Ok(ObjectId::EMPTY);
            };
            if components.peek().is_some() && !entry.kind.is_tree() {
                return Err(GitError::ObjectTypeMismatch {
                    expected: ObjectType::Tree,
                    actual: ObjectType::Blob,
                });
            }
            current = entry.id;
        }

        Ok(current)
    }

    /// Object lookup across loose storage and the pack set.
    fn get_object_filtered(
        &self,
        id: ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<ObjectStream>, GitError> {
        if id.is_empty() {
            return Ok(None);
        }
        if let Some(stream) = self.loose.open_object(&id, expected)? {
            return Ok(Some(stream));
        }
        if let Some(stream) = self.packs.read_object(self, &id, expected)? {
            return Ok(Some(stream));
        }
        Err(GitError::ObjectNotFound(id))
    }
}

impl BaseResolver for Repository {
    /// Ref-delta bases resolve through the whole repository, so a base
    /// may live in another pack or in loose storage.
    fn base_object(&self, id: &ObjectId) -> Result<Option<ObjectStream>, GitError> {
        match self.get_object_filtered(*id, None) {
            Ok(stream) => Ok(stream),
            Err(GitError::ObjectNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Resolved directory layout from discovery.
#[derive(Debug)]
struct Layout {
    git_dir: PathBuf,
    common_dir: PathBuf,
    work_dir: Option<PathBuf>,
}

/// Walks upward from `start` looking for a repository.
///
/// At each level the `.git` entry wins; failing that, a directory that is
/// itself shaped like a git dir (`HEAD` plus `objects/`) opens bare. This
/// makes paths inside bare repositories (and `.git` itself) discoverable.
fn discover(start: &Path) -> Result<Layout, GitError> {
    let start = fs::canonicalize(start).map_err(|_| GitError::NotARepository)?;

    for dir in start.ancestors() {
        let dot_git = dir.join(".git");
        match fs::symlink_metadata(&dot_git) {
            Ok(meta) if meta.is_dir() => {
                let git_dir = canonicalize(&dot_git)?;
                let common_dir = resolve_common_dir(&git_dir)?;
                return Ok(Layout {
                    git_dir,
                    common_dir,
                    work_dir: Some(dir.to_path_buf()),
                });
            }
            Ok(meta) if meta.is_file() => {
                let git_dir = parse_gitdir_file(&dot_git, dir)?;
                let common_dir = resolve_common_dir(&git_dir)?;
                return Ok(Layout {
                    git_dir,
                    common_dir,
                    work_dir: Some(dir.to_path_buf()),
                });
            }
            _ => {}
        }

        if looks_like_git_dir(dir) {
            let git_dir = dir.to_path_buf();
            let common_dir = resolve_common_dir(&git_dir)?;
            return Ok(Layout {
                git_dir,
                common_dir,
                work_dir: None,
            });
        }
    }

    Err(GitError::NotARepository)
}

/// Bare-repository heuristic: `HEAD` file, `objects/` dir, and either
/// `refs/` or `config`.
fn looks_like_git_dir(dir: &Path) -> bool {
    is_file(&dir.join("HEAD"))
        && is_dir(&dir.join("objects"))
        && (is_dir(&dir.join("refs")) || is_file(&dir.join("config")))
}

/// Parses a `.git` file: `gitdir: <path>`, possibly relative to the
/// directory holding the file.
fn parse_gitdir_file(dot_git: &Path, base_dir: &Path) -> Result<PathBuf, GitError> {
    let bytes = read_pointer_file(dot_git)?;
    let target = parse_gitdir_bytes(&bytes).ok_or(GitError::NotARepository)?;

    let resolved = resolve_path(base_dir, &target);
    let canonical = canonicalize(&resolved)?;
    if !is_dir(&canonical) {
        return Err(GitError::NotARepository);
    }
    Ok(canonical)
}

/// Extracts the path from `gitdir: <path>` content.
///
/// Whitespace after the colon is skipped; trailing newlines are trimmed;
/// empty targets are rejected.
fn parse_gitdir_bytes(bytes: &[u8]) -> Option<PathBuf> {
    const PREFIX: &[u8] = b"gitdir:";

    let mut path = bytes.strip_prefix(PREFIX)?;
    while path.first().is_some_and(|&b| b == b' ' || b == b'\t') {
        path = &path[1..];
    }
    while path.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
        path = &path[..path.len() - 1];
    }
    if path.is_empty() {
        return None;
    }
    Some(bytes_to_path(path))
}

/// Reads `<git_dir>/commondir` if present; the content is a path
/// relative to the git dir (or absolute).
fn resolve_common_dir(git_dir: &Path) -> Result<PathBuf, GitError> {
    let pointer = git_dir.join("commondir");
    if !is_file(&pointer) {
        return Ok(git_dir.to_path_buf());
    }

    let bytes = read_pointer_file(&pointer)?;
    let mut path = bytes.as_slice();
    while path.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
        path = &path[..path.len() - 1];
    }
    if path.is_empty() {
        return Err(GitError::NotARepository);
    }

    let resolved = resolve_path(git_dir, &bytes_to_path(path));
    let canonical = canonicalize(&resolved)?;
    if !is_dir(&canonical) {
        return Err(GitError::NotARepository);
    }
    Ok(canonical)
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, GitError> {
    fs::canonicalize(path).map_err(|_| GitError::NotARepository)
}

/// Reads a pointer file (`.git`, `commondir`) with a hard size cap.
fn read_pointer_file(path: &Path) -> Result<Vec<u8>, GitError> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if metadata.len() > MAX_POINTER_FILE_BYTES {
        return Err(GitError::NotARepository);
    }
    let mut buffer = Vec::with_capacity(metadata.len() as usize);
    file.take(MAX_POINTER_FILE_BYTES)
        .read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).as_ref())
}

#[inline]
fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[inline]
fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}
