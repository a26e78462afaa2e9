//! # gitstamp
//!
//! A managed Git object reader: the storage subsystem behind a Git-based
//! version-stamping tool. It reads commits, trees, and blobs straight off
//! a repository's on-disk layout: loose objects, pack files with their
//! v2 indexes, delta chains, worktree pointers, and HEAD resolution, all
//! without a native Git library.
//!
//! The version-computation policy, `version.json` handling, and CLI live
//! elsewhere; they consume this crate's `Repository` facade.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gitstamp::{ObjectType, Repository};
//!
//! fn main() -> Result<(), gitstamp::GitError> {
//!     let repo = Repository::open(".")?;
//!
//!     if let Some(commit) = repo.head_commit()? {
//!         println!("HEAD is {}", commit.sha);
//!         let entry = repo.get_tree_entry(commit.tree, "version.json")?;
//!         if !entry.is_empty() {
//!             let blob = repo.get_object(entry, ObjectType::Blob)?;
//!             println!("version.json is {} bytes", blob.unwrap().len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`repo`] - discovery (`.git` dirs, `gitdir:` files, `commondir`,
//!   bare repos) and the `Repository` facade.
//! - [`object_id`] / [`object_type`] - value types.
//! - [`refs`] - HEAD, loose refs, packed-refs.
//! - [`pack_set`] / [`pack`] / [`pack_index`] - pack enumeration, entry
//!   decoding, delta reconstruction, id-to-offset lookup.
//! - [`loose`] - `objects/xx/yyyy...` frames.
//! - [`tree`] / [`commit`] - thin byte-layout decoders over object
//!   payloads.
//! - [`object_stream`] / [`object_cache`] / [`file_pool`] /
//!   [`zlib_stream`] - stream plumbing and resource pooling.
//!
//! ## Concurrency
//!
//! A `Repository` is synchronous and single-threaded; open one instance
//! per thread for parallelism (the on-disk data is read-only). Dropping a
//! repository releases every pooled handle, mapped view, and cached
//! buffer.

pub mod commit;
pub mod delta;
pub mod errors;
pub mod file_pool;
pub mod loose;
pub mod object_cache;
pub mod object_id;
pub mod object_stream;
pub mod object_type;
pub mod pack;
pub mod pack_index;
pub mod pack_set;
pub mod refs;
pub mod repo;
pub mod tree;
pub mod zlib_stream;

pub use commit::Commit;
pub use errors::GitError;
pub use object_id::ObjectId;
pub use object_stream::ObjectStream;
pub use object_type::ObjectType;
pub use refs::Reference;
pub use repo::{RepoOptions, Repository};
pub use tree::{TreeEntry, TreeEntryIter, TreeEntryKind};
